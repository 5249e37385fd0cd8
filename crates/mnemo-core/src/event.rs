//! Event payloads emitted by the sync manager.
//!
//! Delivery is fire-and-forget over a broadcast channel; these types
//! are just the payloads crossing that boundary.

use serde::Serialize;

use crate::breaker::CircuitBreakerSnapshot;
use crate::conflict::ConflictRecord;

/// Point-in-time view of the engine, for status indicators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatusSnapshot {
    pub pending: u64,
    pub dead_letters: u64,
    pub conflicts: u64,
    pub breaker: CircuitBreakerSnapshot,
    pub online: bool,
    pub draining: bool,
    /// Completion time of the last drain pass (epoch ms), if any.
    pub last_synced_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A version mismatch was detected and recorded.
    Conflict(ConflictRecord),
    /// Queue depth, breaker state, or connectivity changed.
    StatusChanged(SyncStatusSnapshot),
}
