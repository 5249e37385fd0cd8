//! Offline-tolerant mutation sync engine
//!
//! Locally authored deck mutations are queued durably, then drained to
//! the authoritative remote in FIFO order by a single-flight loop that
//! survives intermittent connectivity:
//! - `store` - redb-backed queue, dead-letter, and conflict storage
//! - `scheduler` - cancellable per-item backoff timers
//! - `manager` - the drain loop, conflict resolution, and status surface
//! - `cache` - seam to the local read model refreshed on success
//!
//! Construction is plain dependency injection: the composition root
//! builds a `SyncStore`, a `DeckRemote` implementation, and a
//! `LocalCache`, and hands them to `SyncManager::new`.

pub mod cache;
pub mod error;
pub mod manager;
pub mod scheduler;
pub mod store;

pub use cache::{InMemoryDeckCache, LocalCache};
pub use error::{StoreError, SyncError};
pub use manager::{DrainOutcome, DrainReport, FatalItem, SyncConfig, SyncManager};
pub use scheduler::RetryScheduler;
pub use store::{StoreConfig, SyncStore};
