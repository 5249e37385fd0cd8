//! Error types for the sync engine.

use thiserror::Error;

/// Failures of the local durable store.
///
/// The drain loop treats these as retryable for the affected item, but
/// they are logged distinctly from transport failures: a failing local
/// store usually means an environment problem (disk full, quota), not
/// a network one.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },
}

/// Engine-level failures surfaced to callers.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("local cache failure: {0}")]
    Cache(String),

    #[error("unknown conflict record: {0}")]
    UnknownConflict(String),

    #[error("unknown dead-letter item: {0}")]
    UnknownDeadLetter(String),
}
