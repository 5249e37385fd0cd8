//! Per-item retry timers.
//!
//! Each failed, still-retryable item gets its own backoff timer. When a
//! timer fires it does not retry that single item: it requests a full
//! re-drain, so the whole queue is re-evaluated in FIFO order and
//! earlier-enqueued items are not starved. Timers are cancellable so
//! teardown leaves no dangling callbacks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use mnemo_core::RetryPolicy;

pub struct RetryScheduler {
    policy: RetryPolicy,
    /// Drain trigger shared with the sync manager's consumer task.
    trigger: mpsc::UnboundedSender<()>,
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, trigger: mpsc::UnboundedSender<()>) -> Self {
        Self {
            policy,
            trigger,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule a re-drain after the backoff delay for `retry_count`.
    /// A timer already pending for the same item is replaced.
    pub async fn schedule(&self, item_id: &str, retry_count: u32) {
        self.schedule_after(item_id, self.policy.delay_for(retry_count))
            .await;
    }

    /// Schedule a re-drain after an explicit delay. Also used for the
    /// breaker's reset window so teardown cancels that timer with the
    /// rest.
    pub async fn schedule_after(&self, key: &str, delay: Duration) {
        let trigger = self.trigger.clone();
        let timers = Arc::clone(&self.timers);
        let id = key.to_string();

        debug!(item = %id, ?delay, "scheduling retry");

        let mut guard = self.timers.lock().await;
        if let Some(old) = guard.remove(&id) {
            old.abort();
        }
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(item = %task_id, "retry timer fired, requesting drain");
            timers.lock().await.remove(&task_id);
            let _ = trigger.send(());
        });
        guard.insert(id, handle);
    }

    /// Cancel the pending timer for one item, if any.
    pub async fn cancel(&self, item_id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(item_id) {
            handle.abort();
            debug!(item = %item_id, "cancelled retry timer");
        }
    }

    /// Cancel every pending timer. Called on queue clear and teardown.
    pub async fn cancel_all(&self) {
        let mut guard = self.timers.lock().await;
        let count = guard.len();
        for (_, handle) in guard.drain() {
            handle.abort();
        }
        if count > 0 {
            debug!(count, "cancelled all retry timers");
        }
    }

    /// Number of timers currently pending, for status displays.
    pub async fn pending_timers(&self) -> usize {
        self.timers.lock().await.len()
    }
}
