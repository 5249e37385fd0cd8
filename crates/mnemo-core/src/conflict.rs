//! Conflict records.
//!
//! When the remote rejects a mutation with a version mismatch, the
//! queue item is converted into a `ConflictRecord`: a persisted
//! local/remote snapshot pair that waits for an explicit resolution.
//! The record is the system of record for that edit from then on.

use mnemo_api::Deck;
use serde::{Deserialize, Serialize};

/// How a conflict is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Keep the local snapshot; re-enqueue it as a forced update.
    Local,
    /// Accept the remote snapshot; the local edit is discarded.
    Remote,
    /// Reconcile both snapshots with the merge engine and re-enqueue
    /// the result.
    Merge,
}

/// A detected version mismatch awaiting resolution.
///
/// Immutable until resolved; resolving removes it from the pending
/// store and enqueues at most one new mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Derived from the deck id and detection time.
    pub id: String,

    pub deck_id: String,

    /// The aggregate as locally pending.
    pub local: Deck,

    /// The aggregate as the remote reported it on rejection.
    pub remote: Deck,

    pub detected_at: i64,

    /// Set once resolved; `None` while pending.
    pub resolution: Option<ConflictResolution>,
}

impl ConflictRecord {
    pub fn new(local: Deck, remote: Deck) -> Self {
        let detected_at = mnemo_api::now_ms();
        Self {
            id: format!("conflict_{}_{}", local.id, detected_at),
            deck_id: local.id.clone(),
            local,
            remote,
            detected_at,
            resolution: None,
        }
    }
}
