//! Sync manager: the single-flight drain loop.
//!
//! One `SyncManager` owns the drain loop that pushes queued mutations
//! to the remote in FIFO order. Retry timers and reconnect events feed
//! an unbounded channel consumed by a single background task, and the
//! pass itself runs under a `try_lock` guard, so at most one drain is
//! ever in flight; a second trigger while one runs is a no-op.
//!
//! Outcome handling per item:
//! - success: remove from queue, reset the breaker, refresh the cache
//! - conflict: persist a `ConflictRecord`, remove the item, emit an
//!   event; the breaker is untouched (a conflict is a definitive
//!   answer, not a transport failure)
//! - retryable failure: bump the retry count, record a breaker
//!   failure, schedule a backoff timer; if the breaker just opened the
//!   rest of the pass is abandoned
//! - fatal failure: discard the item and surface it in the report

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use mnemo_api::Deck;
use mnemo_core::{
    BreakerState, CircuitBreaker, ConflictRecord, ConflictResolution, DeadLetterItem, DeckRemote,
    PushOutcome, RemoteError, RetryPolicy, SyncAction, SyncEvent, SyncQueueItem,
    SyncStatusSnapshot, merge_decks,
};

use crate::cache::LocalCache;
use crate::error::{StoreError, SyncError};
use crate::scheduler::RetryScheduler;
use crate::store::SyncStore;

/// Timer key for the breaker's reset window; shares the scheduler with
/// per-item retry timers so teardown cancels it too.
const BREAKER_RESET_TIMER: &str = "circuit-breaker-reset";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attempts before an item is dead-lettered.
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Consecutive failures before the breaker opens.
    pub breaker_threshold: u32,
    /// How long an open breaker blocks attempts.
    pub breaker_reset: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            breaker_threshold: 5,
            breaker_reset: Duration::from_secs(30),
        }
    }
}

/// An item discarded as permanently unprocessable. The app layer
/// decides whether to re-submit; it is neither retried nor
/// dead-lettered.
#[derive(Debug, Clone, PartialEq)]
pub struct FatalItem {
    pub item: SyncQueueItem,
    pub error: String,
}

/// What one drain pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Items for which a network operation was attempted.
    pub attempted: usize,
    pub applied: usize,
    pub conflicts: usize,
    pub retries_scheduled: usize,
    pub dead_lettered: usize,
    pub fatal: Vec<FatalItem>,
    /// True when the pass stopped early because the breaker opened.
    pub halted_by_breaker: bool,
}

/// Result of a drain request.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Another drain holds the single-flight guard.
    AlreadyDraining,
    /// Offline; nothing is attempted until reconnect.
    Offline,
    /// Breaker open and the reset window has not elapsed.
    BreakerOpen,
}

pub struct SyncManager {
    store: Arc<SyncStore>,
    remote: Arc<dyn DeckRemote>,
    cache: Arc<dyn LocalCache>,
    config: SyncConfig,
    breaker: Mutex<CircuitBreaker>,
    /// Single-flight guard for the drain loop.
    drain_gate: Mutex<()>,
    scheduler: RetryScheduler,
    trigger: mpsc::UnboundedSender<()>,
    drain_task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SyncEvent>,
    online: AtomicBool,
    draining: AtomicBool,
    /// Completion time of the last pass (epoch ms); 0 = never.
    last_synced_at: AtomicI64,
}

impl SyncManager {
    pub async fn new(
        store: Arc<SyncStore>,
        remote: Arc<dyn DeckRemote>,
        cache: Arc<dyn LocalCache>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let (trigger, mut trigger_rx) = mpsc::unbounded_channel();
        let scheduler = RetryScheduler::new(
            RetryPolicy::new(config.base_delay, config.max_delay),
            trigger.clone(),
        );
        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_reset);
        let (events, _) = broadcast::channel(256);

        let manager = Arc::new(Self {
            store,
            remote,
            cache,
            config,
            breaker: Mutex::new(breaker),
            drain_gate: Mutex::new(()),
            scheduler,
            trigger,
            drain_task: Mutex::new(None),
            events,
            online: AtomicBool::new(true),
            draining: AtomicBool::new(false),
            last_synced_at: AtomicI64::new(0),
        });

        // Single consumer for retry timers, reconnects, and enqueues.
        // Holding only a weak reference lets the manager drop even if
        // shutdown() is never called.
        let weak = Arc::downgrade(&manager);
        let handle = tokio::spawn(async move {
            while trigger_rx.recv().await.is_some() {
                let Some(manager) = weak.upgrade() else { break };
                if let Err(e) = manager.sync_now().await {
                    warn!(error = %e, "scheduled drain failed");
                }
            }
        });
        *manager.drain_task.lock().await = Some(handle);

        manager
    }

    /// Queue a mutation durably and request a drain.
    pub async fn enqueue(
        &self,
        action: SyncAction,
        owner_id: &str,
    ) -> Result<SyncQueueItem, SyncError> {
        let item = SyncQueueItem::new(action, owner_id);
        self.store.enqueue(&item)?;
        debug!(item = %item.id, kind = item.action.kind(), "queued mutation");
        let _ = self.trigger.send(());
        Ok(item)
    }

    /// Drain the queue now, if allowed. Aborts without touching the
    /// queue when offline, when the breaker blocks attempts, or when
    /// another drain is already running.
    #[instrument(name = "sync.drain", skip(self))]
    pub async fn sync_now(&self) -> Result<DrainOutcome, SyncError> {
        if !self.online.load(Ordering::SeqCst) {
            debug!("offline, skipping drain");
            return Ok(DrainOutcome::Offline);
        }

        {
            let mut breaker = self.breaker.lock().await;
            if !breaker.can_attempt(mnemo_api::now_ms()) {
                debug!("circuit breaker open, skipping drain");
                return Ok(DrainOutcome::BreakerOpen);
            }
            if breaker.state() == BreakerState::Open {
                breaker.half_open();
                info!("circuit breaker half-open, probing remote");
            }
        }

        let Ok(_guard) = self.drain_gate.try_lock() else {
            debug!("drain already in progress");
            return Ok(DrainOutcome::AlreadyDraining);
        };

        self.draining.store(true, Ordering::SeqCst);
        let result = self.drain_pass().await;
        self.draining.store(false, Ordering::SeqCst);

        let report = result?;
        self.last_synced_at
            .store(mnemo_api::now_ms(), Ordering::SeqCst);
        self.emit_status().await;
        Ok(DrainOutcome::Completed(report))
    }

    /// Reset the breaker and drain. A user-triggered retry is never
    /// blocked by a stale open breaker; a fresh failure during the
    /// forced pass re-opens it normally.
    pub async fn force_sync(&self) -> Result<DrainOutcome, SyncError> {
        self.breaker.lock().await.reset();
        info!("force sync requested, circuit breaker reset");
        self.sync_now().await
    }

    /// Connectivity change. Going offline suspends all attempts
    /// independent of the breaker; coming back online requests a drain.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            info!("connectivity restored, scheduling drain");
            let _ = self.trigger.send(());
        } else if !online && was_online {
            info!("connectivity lost, suspending sync attempts");
        }
    }

    /// Settle a pending conflict. `Local` re-enqueues the local
    /// snapshot as a forced update, `Remote` refreshes the cache from
    /// the remote snapshot, `Merge` re-enqueues the merged result.
    /// Returns the record with its resolution set.
    #[instrument(skip(self))]
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<ConflictRecord, SyncError> {
        let Some(mut record) = self.store.get_conflict(conflict_id)? else {
            return Err(SyncError::UnknownConflict(conflict_id.to_string()));
        };

        match resolution {
            ConflictResolution::Local => {
                let item = SyncQueueItem::new(
                    SyncAction::Update {
                        deck: record.local.clone(),
                        force: true,
                    },
                    record.local.owner_id.clone(),
                );
                self.store.enqueue(&item)?;
                info!(conflict = %conflict_id, item = %item.id, "conflict resolved with local snapshot");
            }
            ConflictResolution::Remote => {
                self.cache
                    .apply_remote(record.remote.clone())
                    .await
                    .map_err(|e| SyncError::Cache(e.to_string()))?;
                info!(conflict = %conflict_id, "conflict resolved with remote snapshot");
            }
            ConflictResolution::Merge => {
                let merged = merge_decks(&record.local, &record.remote);
                let item = SyncQueueItem::new(
                    SyncAction::Update {
                        deck: merged,
                        force: false,
                    },
                    record.local.owner_id.clone(),
                );
                self.store.enqueue(&item)?;
                info!(conflict = %conflict_id, item = %item.id, "conflict resolved by merge");
            }
        }

        // Removal comes after the new state is durably applied, so a
        // crash mid-resolution leaves a resolvable conflict instead of
        // silently dropping the edit.
        self.store.remove_conflict(conflict_id)?;
        record.resolution = Some(resolution);

        if matches!(
            resolution,
            ConflictResolution::Local | ConflictResolution::Merge
        ) {
            let _ = self.trigger.send(());
        }
        self.emit_status().await;
        Ok(record)
    }

    /// Move a dead-lettered mutation back into the active queue with a
    /// fresh retry budget.
    pub async fn requeue_dead_letter(&self, id: &str) -> Result<SyncQueueItem, SyncError> {
        let Some(dead) = self.store.get_dead_letter(id)? else {
            return Err(SyncError::UnknownDeadLetter(id.to_string()));
        };

        let mut item = dead.item;
        item.retry_count = 0;
        item.last_error = None;
        // Enqueue before removing the dead letter; a crash in between
        // duplicates the item, which the idempotent remote absorbs.
        self.store.enqueue(&item)?;
        self.store.remove_dead_letter(id)?;
        info!(item = %item.id, "requeued dead-lettered mutation");
        let _ = self.trigger.send(());
        Ok(item)
    }

    /// Drop every pending mutation and cancel their retry timers.
    pub async fn clear_pending(&self) -> Result<u64, SyncError> {
        let cleared = self.store.clear_pending()?;
        self.scheduler.cancel_all().await;
        if cleared > 0 {
            info!(cleared, "cleared pending sync queue");
        }
        self.emit_status().await;
        Ok(cleared)
    }

    pub async fn status(&self) -> Result<SyncStatusSnapshot, SyncError> {
        Ok(SyncStatusSnapshot {
            pending: self.store.pending_count()?,
            dead_letters: self.store.dead_letter_count()?,
            conflicts: self.store.conflict_count()?,
            breaker: self.breaker.lock().await.snapshot(),
            online: self.online.load(Ordering::SeqCst),
            draining: self.draining.load(Ordering::SeqCst),
            last_synced_at: match self.last_synced_at.load(Ordering::SeqCst) {
                0 => None,
                at => Some(at),
            },
        })
    }

    /// Conflict and status events, fire-and-forget.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn pending(&self) -> Result<Vec<SyncQueueItem>, SyncError> {
        Ok(self.store.list_pending()?)
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetterItem>, SyncError> {
        Ok(self.store.dead_letters()?)
    }

    pub fn conflicts(&self) -> Result<Vec<ConflictRecord>, SyncError> {
        Ok(self.store.list_conflicts()?)
    }

    /// Backoff timers currently pending, for diagnostics.
    pub async fn pending_retry_timers(&self) -> usize {
        self.scheduler.pending_timers().await
    }

    /// Cancel all timers and stop the drain-trigger task. An active
    /// pass finishes on its own; the single-flight guard is released
    /// with it, never left held.
    pub async fn shutdown(&self) {
        self.scheduler.cancel_all().await;
        if let Some(handle) = self.drain_task.lock().await.take() {
            handle.abort();
        }
        info!("sync manager shut down");
    }

    async fn drain_pass(&self) -> Result<DrainReport, SyncError> {
        let pending = self.store.list_pending()?;
        let mut report = DrainReport::default();
        if pending.is_empty() {
            debug!("sync queue empty");
            return Ok(report);
        }
        info!(pending = pending.len(), "draining sync queue");

        for mut item in pending {
            if !self.online.load(Ordering::SeqCst) {
                debug!("went offline mid-drain, suspending pass");
                break;
            }

            if item.retry_count >= self.config.max_retries {
                warn!(item = %item.id, retries = item.retry_count, "retry budget exhausted, moving to dead letter");
                if let Err(e) = self.store.move_to_dead_letter(&item) {
                    error!(item = %item.id, error = %e, "local store failure while dead-lettering");
                    continue;
                }
                self.scheduler.cancel(&item.id).await;
                report.dead_lettered += 1;
                continue;
            }

            report.attempted += 1;
            match self.remote.push(&item.action).await {
                Ok(PushOutcome::Applied(canonical)) => {
                    if let Err(e) = self.store.remove(&item.id) {
                        // The remote applied the mutation but the local
                        // finalize failed; the item stays queued and the
                        // idempotent remote absorbs the replay.
                        error!(item = %item.id, error = %e, "local store failure while finalizing item");
                        let message = format!("local store failure: {e}");
                        if self.note_retryable(&mut item, message, &mut report).await {
                            break;
                        }
                        continue;
                    }
                    self.breaker.lock().await.record_success();
                    self.refresh_cache(&item, canonical).await;
                    report.applied += 1;
                }
                Ok(PushOutcome::Conflict(remote_deck)) => {
                    // A definitive answer from the remote: the breaker
                    // is left alone.
                    match self.record_conflict(&item, remote_deck).await {
                        Ok(record) => {
                            self.scheduler.cancel(&item.id).await;
                            let _ = self.events.send(SyncEvent::Conflict(record));
                            report.conflicts += 1;
                        }
                        Err(e) => {
                            error!(item = %item.id, error = %e, "local store failure while recording conflict");
                            let message = format!("local store failure: {e}");
                            if self.note_retryable(&mut item, message, &mut report).await {
                                break;
                            }
                        }
                    }
                }
                Err(RemoteError::Fatal(message)) => {
                    error!(item = %item.id, error = %message, "fatal sync failure, discarding item");
                    if let Err(e) = self.store.remove(&item.id) {
                        error!(item = %item.id, error = %e, "local store failure while discarding item");
                    }
                    report.fatal.push(FatalItem {
                        item,
                        error: message,
                    });
                }
                Err(RemoteError::Retryable(message)) => {
                    warn!(item = %item.id, error = %message, "retryable sync failure");
                    if self.note_retryable(&mut item, message, &mut report).await {
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Record a retryable failure on an item. Returns true when the
    /// failure opened the breaker, which halts the current pass; the
    /// remaining items are retried once the breaker half-opens.
    async fn note_retryable(
        &self,
        item: &mut SyncQueueItem,
        message: String,
        report: &mut DrainReport,
    ) -> bool {
        item.record_failure(message);
        if let Err(e) = self.store.enqueue(item) {
            error!(item = %item.id, error = %e, "local store failure while persisting retry state");
        }

        let just_opened = self
            .breaker
            .lock()
            .await
            .record_failure(mnemo_api::now_ms());
        if just_opened {
            warn!(
                threshold = self.config.breaker_threshold,
                "circuit breaker opened, halting drain pass"
            );
            report.halted_by_breaker = true;
            self.scheduler
                .schedule_after(BREAKER_RESET_TIMER, self.config.breaker_reset)
                .await;
            return true;
        }

        self.scheduler.schedule(&item.id, item.retry_count).await;
        report.retries_scheduled += 1;
        false
    }

    /// Build and persist the conflict record for a rejected item, then
    /// retire the item from the active queue. The local snapshot comes
    /// from the cache when available; otherwise it is reconstructed by
    /// replaying the pending mutation on the remote snapshot.
    async fn record_conflict(
        &self,
        item: &SyncQueueItem,
        remote_deck: Deck,
    ) -> Result<ConflictRecord, StoreError> {
        let cached = match self.cache.get(item.deck_id()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(deck = item.deck_id(), error = %e, "cache read failed, deriving local snapshot from payload");
                None
            }
        };
        let local = cached.unwrap_or_else(|| {
            let mut deck = remote_deck.clone();
            item.action.apply_to(&mut deck);
            deck
        });

        let record = ConflictRecord::new(local, remote_deck);
        self.store.put_conflict(&record)?;
        // The conflict record is now the system of record for this edit.
        self.store.remove(&item.id)?;
        Ok(record)
    }

    async fn refresh_cache(&self, item: &SyncQueueItem, canonical: Option<Deck>) {
        if let SyncAction::Delete { deck_id } = &item.action {
            if let Err(e) = self.cache.evict(deck_id).await {
                warn!(deck = %deck_id, error = %e, "failed to evict deleted deck from cache");
            }
            return;
        }
        if let Some(deck) = canonical {
            if let Err(e) = self.cache.apply_remote(deck).await {
                warn!(deck = item.deck_id(), error = %e, "failed to refresh cache from server response");
            }
        }
    }

    async fn emit_status(&self) {
        match self.status().await {
            Ok(snapshot) => {
                let _ = self.events.send(SyncEvent::StatusChanged(snapshot));
            }
            Err(e) => debug!(error = %e, "skipping status event"),
        }
    }
}
