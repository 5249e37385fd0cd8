//! Core sync primitives for mnemo
//!
//! This crate provides the deterministic building blocks of the sync
//! engine:
//! - `SyncAction`: the closed set of replayable deck mutations
//! - `SyncQueueItem` / `DeadLetterItem`: durable queue records
//! - `ConflictRecord`: a detected local/remote version mismatch
//! - `CircuitBreaker`: failure gating for the drain loop
//! - `RetryPolicy`: exponential backoff with a cap
//! - `merge_decks`: deterministic reconciliation of two deck snapshots
//! - `DeckRemote`: the seam to the authoritative remote store
//!
//! Nothing here performs I/O or reads a clock on its own; callers pass
//! `now` in epoch milliseconds so every state machine is testable.

pub mod action;
pub mod breaker;
pub mod conflict;
pub mod event;
pub mod merge;
pub mod queue;
pub mod remote;
pub mod retry;

pub use action::SyncAction;
pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerSnapshot};
pub use conflict::{ConflictRecord, ConflictResolution};
pub use event::{SyncEvent, SyncStatusSnapshot};
pub use merge::merge_decks;
pub use queue::{DeadLetterItem, SyncQueueItem};
pub use remote::{DeckRemote, PushOutcome, RemoteError};
pub use retry::RetryPolicy;
