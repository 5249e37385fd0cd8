//! End-to-end tests for the drain loop against the fake remote.
//!
//! Two styles are used:
//! - "wired" harnesses leave the retry timers and the drain-trigger
//!   task running, to observe the engine's automatic behavior
//! - "manual" harnesses call `shutdown()` first so nothing drains in
//!   the background, then drive `sync_now()` directly and inspect the
//!   returned reports

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mnemo_api::{Card, Deck, DeckStats};
use mnemo_core::{BreakerState, ConflictResolution, DeckRemote, SyncAction, SyncEvent};
use mnemo_remote::{FakeRemote, ScriptedFailure};
use mnemo_sync::{
    DrainOutcome, InMemoryDeckCache, LocalCache, StoreConfig, SyncConfig, SyncError, SyncManager,
    SyncStore,
};

struct Harness {
    manager: Arc<SyncManager>,
    remote: Arc<FakeRemote>,
    cache: Arc<InMemoryDeckCache>,
    _temp: TempDir,
}

async fn harness(config: SyncConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let temp = TempDir::new().unwrap();
    let store = Arc::new(
        SyncStore::open(StoreConfig {
            db_path: temp.path().join("sync.redb"),
        })
        .unwrap(),
    );
    let remote = Arc::new(FakeRemote::new());
    let cache = Arc::new(InMemoryDeckCache::new());
    let remote_dyn: Arc<dyn DeckRemote> = remote.clone();
    let cache_dyn: Arc<dyn LocalCache> = cache.clone();
    let manager = SyncManager::new(store, remote_dyn, cache_dyn, config).await;
    Harness {
        manager,
        remote,
        cache,
        _temp: temp,
    }
}

/// Harness with background drains disabled; every pass is explicit.
async fn manual_harness(config: SyncConfig) -> Harness {
    let h = harness(config).await;
    h.manager.shutdown().await;
    h
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        max_retries: 5,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        breaker_threshold: 5,
        // Long enough that no probe happens unless a test waits for it.
        breaker_reset: Duration::from_secs(60),
    }
}

fn deck_at(id: &str, title: &str, updated_at: i64) -> Deck {
    let mut deck = Deck::new(id, title, "user-1");
    deck.created_at = 500;
    deck.updated_at = updated_at;
    deck
}

fn card_at(id: &str, deck_id: &str, back: &str, updated_at: i64) -> Card {
    let mut card = Card::new(id, deck_id, "front", back);
    card.updated_at = updated_at;
    card
}

fn update(deck: Deck) -> SyncAction {
    SyncAction::Update { deck, force: false }
}

async fn eventually<Fut>(mut check: impl FnMut() -> Fut, timeout: Duration) -> bool
where
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn unwrap_report(outcome: DrainOutcome) -> mnemo_sync::DrainReport {
    match outcome {
        DrainOutcome::Completed(report) => report,
        other => panic!("expected a completed drain, got {:?}", other),
    }
}

// --- FIFO ordering and success paths ---

#[tokio::test(flavor = "multi_thread")]
async fn second_write_wins_in_enqueue_order() {
    let h = manual_harness(fast_config()).await;

    h.manager
        .enqueue(update(deck_at("d1", "A", 1000)), "user-1")
        .await
        .unwrap();
    h.manager
        .enqueue(update(deck_at("d1", "B", 2000)), "user-1")
        .await
        .unwrap();

    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert_eq!(report.applied, 2);

    assert_eq!(h.remote.deck("d1").await.unwrap().title, "B");
    let calls = h.remote.calls().await;
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], SyncAction::Update { deck, .. } if deck.title == "A"));
    assert!(matches!(&calls[1], SyncAction::Update { deck, .. } if deck.title == "B"));
    assert_eq!(h.manager.status().await.unwrap().pending, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_then_card_mutations_apply_in_order() {
    let h = manual_harness(fast_config()).await;

    h.manager
        .enqueue(
            SyncAction::Create {
                deck: deck_at("d1", "Spanish", 1000),
            },
            "user-1",
        )
        .await
        .unwrap();
    h.manager
        .enqueue(
            SyncAction::AddCard {
                deck_id: "d1".to_string(),
                card: card_at("c1", "d1", "hello", 1100),
            },
            "user-1",
        )
        .await
        .unwrap();
    h.manager
        .enqueue(
            SyncAction::UpdateCard {
                deck_id: "d1".to_string(),
                card: card_at("c1", "d1", "hi there", 1200),
            },
            "user-1",
        )
        .await
        .unwrap();

    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert_eq!(report.applied, 3);

    let deck = h.remote.deck("d1").await.unwrap();
    assert_eq!(deck.cards.len(), 1);
    assert_eq!(deck.card("c1").unwrap().back, "hi there");
    // The canonical server response refreshed the local cache.
    assert_eq!(
        h.cache.get("d1").await.unwrap().unwrap().card("c1").unwrap().back,
        "hi there"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn draining_an_empty_queue_is_a_noop() {
    let h = manual_harness(fast_config()).await;

    let before = h.manager.status().await.unwrap().breaker;
    let first = unwrap_report(h.manager.sync_now().await.unwrap());
    let second = unwrap_report(h.manager.sync_now().await.unwrap());

    assert_eq!(first.attempted, 0);
    assert_eq!(second.attempted, 0);
    assert_eq!(h.manager.status().await.unwrap().pending, 0);
    assert_eq!(h.manager.status().await.unwrap().breaker, before);
    assert_eq!(h.remote.call_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn wired_enqueue_drains_without_explicit_sync() {
    let h = harness(fast_config()).await;

    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let drained = eventually(
        || { let remote = h.remote.clone(); async move { remote.deck("d1").await.is_some() } },
        Duration::from_secs(5),
    )
    .await;
    assert!(drained, "background task should drain the queue");
    assert_eq!(h.manager.status().await.unwrap().pending, 0);
}

// --- conflicts ---

#[tokio::test(flavor = "multi_thread")]
async fn conflict_creates_record_and_retires_item() {
    let h = manual_harness(fast_config()).await;

    h.remote.seed(deck_at("d1", "Remote title", 5000)).await;
    let local = deck_at("d1", "Local title", 1000);
    h.cache.insert(local.clone()).await;

    h.manager.enqueue(update(local), "user-1").await.unwrap();
    let report = unwrap_report(h.manager.sync_now().await.unwrap());

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.applied, 0);

    let conflicts = h.manager.conflicts().unwrap();
    assert_eq!(conflicts.len(), 1);
    let record = &conflicts[0];
    assert_eq!(record.deck_id, "d1");
    assert_eq!(record.local.title, "Local title");
    assert_eq!(record.remote.title, "Remote title");
    assert!(record.resolution.is_none());

    let status = h.manager.status().await.unwrap();
    assert_eq!(status.pending, 0, "conflicted item leaves the queue");
    // A conflict is not a transport failure; the breaker is untouched.
    assert_eq!(status.breaker.state, BreakerState::Closed);
    assert_eq!(status.breaker.failure_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn conflict_emits_event() {
    let h = harness(fast_config()).await;
    let mut events = h.manager.subscribe();

    h.remote.seed(deck_at("d1", "Remote title", 5000)).await;
    h.manager
        .enqueue(update(deck_at("d1", "Local title", 1000)), "user-1")
        .await
        .unwrap();

    let mut saw_conflict = false;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Ok(SyncEvent::Conflict(record))) => {
                assert_eq!(record.deck_id, "d1");
                saw_conflict = true;
                break;
            }
            Ok(Ok(SyncEvent::StatusChanged(_))) => continue,
            other => panic!("event stream ended unexpectedly: {:?}", other),
        }
    }
    assert!(saw_conflict);
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_local_wins_with_forced_update() {
    let h = manual_harness(fast_config()).await;

    h.remote.seed(deck_at("d1", "Remote title", 5000)).await;
    let local = deck_at("d1", "Local title", 1000);
    h.cache.insert(local.clone()).await;
    h.manager.enqueue(update(local), "user-1").await.unwrap();
    unwrap_report(h.manager.sync_now().await.unwrap());

    let conflict_id = h.manager.conflicts().unwrap()[0].id.clone();
    let resolved = h
        .manager
        .resolve_conflict(&conflict_id, ConflictResolution::Local)
        .await
        .unwrap();
    assert_eq!(resolved.resolution, Some(ConflictResolution::Local));
    assert!(h.manager.conflicts().unwrap().is_empty());

    let pending = h.manager.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        &pending[0].action,
        SyncAction::Update { force: true, .. }
    ));

    // The forced update lands even though the local snapshot is stale.
    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert_eq!(report.applied, 1);
    assert_eq!(h.remote.deck("d1").await.unwrap().title, "Local title");
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_remote_refreshes_cache_and_enqueues_nothing() {
    let h = manual_harness(fast_config()).await;

    h.remote.seed(deck_at("d1", "Remote title", 5000)).await;
    let local = deck_at("d1", "Local title", 1000);
    h.cache.insert(local.clone()).await;
    h.manager.enqueue(update(local), "user-1").await.unwrap();
    unwrap_report(h.manager.sync_now().await.unwrap());

    let conflict_id = h.manager.conflicts().unwrap()[0].id.clone();
    h.manager
        .resolve_conflict(&conflict_id, ConflictResolution::Remote)
        .await
        .unwrap();

    assert!(h.manager.conflicts().unwrap().is_empty());
    assert!(h.manager.pending().unwrap().is_empty());
    assert_eq!(h.cache.get("d1").await.unwrap().unwrap().title, "Remote title");
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_merge_keeps_both_sides_progress() {
    let h = manual_harness(fast_config()).await;

    let mut remote_deck = deck_at("d1", "Remote title", 5000);
    remote_deck.upsert_card(card_at("c-remote", "d1", "from remote", 4000));
    remote_deck.stats = DeckStats {
        cards_studied: 30,
        cards_correct: 28,
    };
    h.remote.seed(remote_deck).await;

    let mut local = deck_at("d1", "Local title", 1000);
    local.upsert_card(card_at("c-local", "d1", "from local", 900));
    local.stats = DeckStats {
        cards_studied: 40,
        cards_correct: 25,
    };
    h.cache.insert(local.clone()).await;

    h.manager.enqueue(update(local), "user-1").await.unwrap();
    unwrap_report(h.manager.sync_now().await.unwrap());

    let conflict_id = h.manager.conflicts().unwrap()[0].id.clone();
    h.manager
        .resolve_conflict(&conflict_id, ConflictResolution::Merge)
        .await
        .unwrap();

    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert_eq!(report.applied, 1);

    let merged = h.remote.deck("d1").await.unwrap();
    assert_eq!(merged.title, "Remote title", "newer remote scalars win");
    assert!(merged.card("c-remote").is_some());
    assert!(merged.card("c-local").is_some());
    assert_eq!(merged.stats.cards_studied, 40);
    assert_eq!(merged.stats.cards_correct, 28);
    assert!(h.manager.conflicts().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn resolving_an_unknown_conflict_fails() {
    let h = manual_harness(fast_config()).await;
    let result = h
        .manager
        .resolve_conflict("conflict_missing_1", ConflictResolution::Remote)
        .await;
    assert!(matches!(result, Err(SyncError::UnknownConflict(_))));
}

// --- retries, backoff, dead letters ---

#[tokio::test(flavor = "multi_thread")]
async fn retryable_failure_bumps_count_and_recovers() {
    // Slow enough backoff that the failed state is observable before
    // the retry fires.
    let mut config = fast_config();
    config.base_delay = Duration::from_millis(300);
    config.max_delay = Duration::from_secs(1);
    let h = harness(config).await;
    h.remote.fail_next(ScriptedFailure::Timeout).await;

    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    // First attempt fails and stays queued with its failure recorded.
    // Checked in one shot: the backoff timer may apply the item right
    // after it fires.
    let failed_once = eventually(
        || {
            let manager = h.manager.clone();
            async move {
                manager.pending().unwrap().first().is_some_and(|item| {
                    item.retry_count == 1 && item.last_error.as_deref() == Some("request timed out")
                })
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(failed_once);

    // The backoff timer re-drains and the push goes through.
    let recovered = eventually(
        || { let remote = h.remote.clone(); async move { remote.deck("d1").await.is_some() } },
        Duration::from_secs(5),
    )
    .await;
    assert!(recovered);
    assert_eq!(h.manager.status().await.unwrap().pending, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_item_moves_to_dead_letter_and_stays_there() {
    let mut config = fast_config();
    config.max_retries = 2;
    config.breaker_threshold = 100;
    let h = harness(config).await;

    h.remote.fail_times(ScriptedFailure::ServerError, 2).await;
    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let dead_lettered = eventually(
        || {
            let manager = h.manager.clone();
            async move {
                let status = manager.status().await.unwrap();
                status.dead_letters == 1 && status.pending == 0
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(dead_lettered);

    // Exactly max_retries attempts were made; the item is never
    // retried out of the dead-letter store on its own.
    assert_eq!(h.remote.call_count().await, 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.remote.call_count().await, 2);

    let dead = h.manager.dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].item.retry_count, 2);
    assert!(dead[0].moved_at >= dead[0].item.enqueued_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn requeued_dead_letter_gets_a_fresh_budget() {
    let mut config = fast_config();
    config.max_retries = 1;
    config.breaker_threshold = 100;
    let h = harness(config).await;

    h.remote.fail_next(ScriptedFailure::Timeout).await;
    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let dead_lettered = eventually(
        || { let manager = h.manager.clone(); async move { manager.status().await.unwrap().dead_letters == 1 } },
        Duration::from_secs(5),
    )
    .await;
    assert!(dead_lettered);

    let dead_id = h.manager.dead_letters().unwrap()[0].item.id.clone();
    let requeued = h.manager.requeue_dead_letter(&dead_id).await.unwrap();
    assert_eq!(requeued.retry_count, 0);
    assert!(requeued.last_error.is_none());

    let applied = eventually(
        || { let remote = h.remote.clone(); async move { remote.deck("d1").await.is_some() } },
        Duration::from_secs(5),
    )
    .await;
    assert!(applied);
    assert_eq!(h.manager.status().await.unwrap().dead_letters, 0);
}

// --- fatal failures ---

#[tokio::test(flavor = "multi_thread")]
async fn fatal_failure_discards_without_dead_lettering() {
    let h = manual_harness(fast_config()).await;

    h.remote
        .fail_next(ScriptedFailure::Fatal("invalid payload".to_string()))
        .await;
    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert_eq!(report.fatal.len(), 1);
    assert_eq!(report.fatal[0].error, "invalid payload");
    assert_eq!(report.applied, 0);

    let status = h.manager.status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.dead_letters, 0);
    // Fatal rejections say nothing about transport health.
    assert_eq!(status.breaker.failure_count, 0);
}

// --- circuit breaker ---

#[tokio::test(flavor = "multi_thread")]
async fn breaker_opens_after_threshold_and_blocks_the_queue() {
    let h = manual_harness(fast_config()).await;
    h.remote.fail_times(ScriptedFailure::Timeout, 5).await;

    for i in 0..5 {
        h.manager
            .enqueue(
                update(deck_at(&format!("d{}", i), "failing", 1000)),
                "user-1",
            )
            .await
            .unwrap();
    }
    // A sixth mutation against a different aggregate waits behind the
    // open breaker like everything else.
    h.manager
        .enqueue(update(deck_at("d-healthy", "fine", 1000)), "user-1")
        .await
        .unwrap();

    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert!(report.halted_by_breaker);
    assert_eq!(report.attempted, 5);
    assert_eq!(h.remote.call_count().await, 5);

    let status = h.manager.status().await.unwrap();
    assert_eq!(status.breaker.state, BreakerState::Open);
    assert_eq!(status.pending, 6);

    // While the window is open, drains are refused outright.
    assert_eq!(
        h.manager.sync_now().await.unwrap(),
        DrainOutcome::BreakerOpen
    );
    assert_eq!(h.remote.call_count().await, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn breaker_probes_and_closes_after_the_window() {
    let mut config = fast_config();
    config.breaker_reset = Duration::from_millis(150);
    let h = harness(config).await;

    h.remote.fail_times(ScriptedFailure::Timeout, 5).await;
    for i in 0..5 {
        h.manager
            .enqueue(
                update(deck_at(&format!("d{}", i), "failing", 1000)),
                "user-1",
            )
            .await
            .unwrap();
    }

    let opened = eventually(
        || { let manager = h.manager.clone(); async move { manager.status().await.unwrap().breaker.state == BreakerState::Open } },
        Duration::from_secs(5),
    )
    .await;
    assert!(opened);

    // The reset timer half-opens the breaker and the probe succeeds
    // (the failure script is exhausted), so the queue drains fully.
    let recovered = eventually(
        || {
            let manager = h.manager.clone();
            async move {
                let status = manager.status().await.unwrap();
                status.pending == 0 && status.breaker.state == BreakerState::Closed
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(recovered);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_probe_reopens_with_a_fresh_window() {
    let mut config = fast_config();
    config.breaker_threshold = 2;
    config.breaker_reset = Duration::from_millis(100);
    let h = manual_harness(config).await;

    h.remote.fail_times(ScriptedFailure::Timeout, 3).await;
    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    // Two failures open the breaker (one per pass; the retry timer is
    // not running in manual mode, so drive the passes directly).
    unwrap_report(h.manager.sync_now().await.unwrap());
    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert!(report.halted_by_breaker);
    assert_eq!(
        h.manager.status().await.unwrap().breaker.state,
        BreakerState::Open
    );

    // Wait out the window; the next drain half-opens the breaker, the
    // probe fails, and a single failure re-opens it with a fresh window.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let report = unwrap_report(h.manager.sync_now().await.unwrap());
    assert!(report.halted_by_breaker);
    let status = h.manager.status().await.unwrap();
    assert_eq!(status.breaker.state, BreakerState::Open);
    assert_eq!(h.remote.call_count().await, 3);

    // Fresh window: drains are refused again.
    assert_eq!(
        h.manager.sync_now().await.unwrap(),
        DrainOutcome::BreakerOpen
    );
    assert_eq!(h.remote.call_count().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn force_sync_overrides_a_stale_open_breaker() {
    let mut config = fast_config();
    config.breaker_threshold = 1;
    let h = manual_harness(config).await;

    h.remote.fail_next(ScriptedFailure::Timeout).await;
    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    unwrap_report(h.manager.sync_now().await.unwrap());
    assert_eq!(
        h.manager.sync_now().await.unwrap(),
        DrainOutcome::BreakerOpen
    );

    // The user-triggered retry is never blocked by the stale breaker.
    let report = unwrap_report(h.manager.force_sync().await.unwrap());
    assert_eq!(report.applied, 1);
    let status = h.manager.status().await.unwrap();
    assert_eq!(status.breaker.state, BreakerState::Closed);
    assert_eq!(status.pending, 0);
}

// --- connectivity and concurrency ---

#[tokio::test(flavor = "multi_thread")]
async fn offline_suspends_until_reconnect() {
    let h = harness(fast_config()).await;
    h.manager.set_online(false);

    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    assert_eq!(h.manager.sync_now().await.unwrap(), DrainOutcome::Offline);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.call_count().await, 0);

    h.manager.set_online(true);
    let drained = eventually(
        || { let remote = h.remote.clone(); async move { remote.deck("d1").await.is_some() } },
        Duration::from_secs(5),
    )
    .await;
    assert!(drained, "reconnect should trigger a drain");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_drain_is_a_noop() {
    let h = manual_harness(fast_config()).await;
    h.remote.set_latency(Duration::from_millis(200)).await;

    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let manager = h.manager.clone();
    let first = tokio::spawn(async move { manager.sync_now().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        h.manager.sync_now().await.unwrap(),
        DrainOutcome::AlreadyDraining
    );

    let report = unwrap_report(first.await.unwrap().unwrap());
    assert_eq!(report.applied, 1);
    assert_eq!(h.remote.call_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_cancels_pending_retry_timers() {
    // Long backoff keeps the timer pending until it is cancelled.
    let mut config = fast_config();
    config.base_delay = Duration::from_secs(10);
    config.max_delay = Duration::from_secs(60);
    let h = harness(config).await;
    h.remote.fail_next(ScriptedFailure::Timeout).await;

    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let scheduled = eventually(
        || { let manager = h.manager.clone(); async move { manager.pending_retry_timers().await > 0 } },
        Duration::from_secs(5),
    )
    .await;
    assert!(scheduled);

    h.manager.shutdown().await;
    assert_eq!(h.manager.pending_retry_timers().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn clearing_the_queue_cancels_timers() {
    // Long backoff keeps the timer pending until it is cancelled.
    let mut config = fast_config();
    config.base_delay = Duration::from_secs(10);
    config.max_delay = Duration::from_secs(60);
    let h = harness(config).await;
    h.remote.fail_next(ScriptedFailure::Timeout).await;

    h.manager
        .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
        .await
        .unwrap();

    let scheduled = eventually(
        || { let manager = h.manager.clone(); async move { manager.pending_retry_timers().await > 0 } },
        Duration::from_secs(5),
    )
    .await;
    assert!(scheduled);

    let cleared = h.manager.clear_pending().await.unwrap();
    assert_eq!(cleared, 1);
    assert_eq!(h.manager.pending_retry_timers().await, 0);
    assert_eq!(h.manager.status().await.unwrap().pending, 0);
}

// --- queue durability ---

#[tokio::test(flavor = "multi_thread")]
async fn pending_mutations_survive_a_restart() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("sync.redb");

    {
        let store = Arc::new(
            SyncStore::open(StoreConfig {
                db_path: db_path.clone(),
            })
            .unwrap(),
        );
        let remote = Arc::new(FakeRemote::new());
        let remote_dyn: Arc<dyn DeckRemote> = remote.clone();
        let cache: Arc<dyn LocalCache> = Arc::new(InMemoryDeckCache::new());
        let manager = SyncManager::new(store, remote_dyn, cache, fast_config()).await;
        manager.shutdown().await;
        manager.set_online(false);
        manager
            .enqueue(update(deck_at("d1", "Spanish", 1000)), "user-1")
            .await
            .unwrap();
    }

    // A fresh manager over the same store picks the mutation up.
    let store = Arc::new(SyncStore::open(StoreConfig { db_path }).unwrap());
    let remote = Arc::new(FakeRemote::new());
    let remote_dyn: Arc<dyn DeckRemote> = remote.clone();
    let cache: Arc<dyn LocalCache> = Arc::new(InMemoryDeckCache::new());
    let manager = SyncManager::new(store, remote_dyn, cache, fast_config()).await;
    manager.shutdown().await;

    assert_eq!(manager.status().await.unwrap().pending, 1);
    let report = unwrap_report(manager.sync_now().await.unwrap());
    assert_eq!(report.applied, 1);
    assert_eq!(remote.deck("d1").await.unwrap().title, "Spanish");
}
