//! Durable queue records.
//!
//! A `SyncQueueItem` is one locally authored mutation waiting to be
//! applied remotely. Items survive restarts: they are persisted at
//! enqueue time and only removed on success, on conversion to a
//! conflict record, or on migration to the dead-letter namespace.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::SyncAction;

// Millisecond timestamps collide for mutations enqueued back to back;
// the sequence keeps FIFO order exact within the same millisecond.
static ENQUEUE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A queued mutation plus its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Globally unique, assigned at enqueue time:
    /// `<kind>_<deck_id>_<enqueued_at>_<random>`.
    pub id: String,

    pub action: SyncAction,

    /// Enqueue timestamp (epoch ms); drives FIFO ordering.
    pub enqueued_at: i64,

    /// Tie-break for items enqueued within the same millisecond.
    #[serde(default)]
    pub seq: u64,

    /// Attempt counter. An item at the retry budget is never attempted
    /// again; it moves to the dead-letter store instead.
    pub retry_count: u32,

    /// Last failure message, for diagnostics.
    pub last_error: Option<String>,

    /// User or session that authored the mutation.
    pub owner_id: String,
}

impl SyncQueueItem {
    pub fn new(action: SyncAction, owner_id: impl Into<String>) -> Self {
        let enqueued_at = mnemo_api::now_ms();
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}_{}_{}_{}",
            action.kind(),
            action.deck_id(),
            enqueued_at,
            &suffix[..8]
        );
        Self {
            id,
            action,
            enqueued_at,
            seq: ENQUEUE_SEQ.fetch_add(1, Ordering::Relaxed),
            retry_count: 0,
            last_error: None,
            owner_id: owner_id.into(),
        }
    }

    pub fn deck_id(&self) -> &str {
        self.action.deck_id()
    }

    /// Record one failed attempt. The counter counts attempts, not
    /// error kinds: failures of different types share it.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
    }
}

/// A queue item that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub item: SyncQueueItem,

    /// When the item was migrated out of the active queue (epoch ms).
    pub moved_at: i64,
}

impl DeadLetterItem {
    pub fn new(item: SyncQueueItem) -> Self {
        Self {
            item,
            moved_at: mnemo_api::now_ms(),
        }
    }
}
