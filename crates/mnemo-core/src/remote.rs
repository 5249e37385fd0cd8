//! The seam to the authoritative remote store.
//!
//! The sync manager never talks to a transport directly; it pushes
//! actions through `DeckRemote` and classifies the result. A conflict
//! is a first-class outcome, not an error: the remote answered
//! definitively, it just disagreed about versions.

use async_trait::async_trait;
use mnemo_api::Deck;
use thiserror::Error;

use crate::action::SyncAction;

/// A definitive answer from the remote.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The mutation was applied. May carry the canonical server-side
    /// aggregate so the local cache can be refreshed.
    Applied(Option<Deck>),

    /// Version mismatch: the remote refused the mutation and returned
    /// its current snapshot of the aggregate.
    Conflict(Deck),
}

/// A failed attempt, classified for the retry machinery.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport failure, timeout, or 5xx. Retried with backoff up to
    /// the retry budget, then dead-lettered.
    #[error("retryable remote failure: {0}")]
    Retryable(String),

    /// Non-retryable rejection (other 4xx, permanently invalid
    /// payload). Surfaced immediately; the item is discarded.
    #[error("fatal remote failure: {0}")]
    Fatal(String),
}

/// Remote API for deck mutations, one operation per `SyncAction`.
#[async_trait]
pub trait DeckRemote: Send + Sync {
    async fn push(&self, action: &SyncAction) -> Result<PushOutcome, RemoteError>;
}
