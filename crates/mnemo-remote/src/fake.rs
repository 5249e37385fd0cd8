//! In-memory stand-in for the remote deck API.
//!
//! `FakeRemote` holds authoritative deck state in memory and applies
//! the same version check the real server does: an update whose
//! `updated_at` is older than the stored deck is rejected with the
//! current snapshot, unless the force flag is set. Failures can be
//! scripted ahead of time to simulate timeouts, outages, and
//! rejections, which is how the engine's tests drive the retry and
//! breaker paths.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mnemo_api::Deck;
use mnemo_core::{DeckRemote, PushOutcome, RemoteError, SyncAction};

/// Failure the fake returns instead of processing the next push.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// Classified like a request timeout.
    Timeout,
    /// Classified like a 5xx.
    ServerError,
    /// Non-retryable rejection.
    Fatal(String),
}

#[derive(Default)]
struct FakeState {
    decks: HashMap<String, Deck>,
    failures: VecDeque<ScriptedFailure>,
    calls: Vec<SyncAction>,
    latency: Option<Duration>,
}

#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install server-side state directly, bypassing the push path.
    pub async fn seed(&self, deck: Deck) {
        let mut state = self.state.lock().await;
        state.decks.insert(deck.id.clone(), deck);
    }

    /// Queue one failure for the next push.
    pub async fn fail_next(&self, failure: ScriptedFailure) {
        self.fail_times(failure, 1).await;
    }

    /// Queue the same failure for the next `count` pushes.
    pub async fn fail_times(&self, failure: ScriptedFailure, count: usize) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state.failures.push_back(failure.clone());
        }
    }

    /// Delay every push, to hold a drain open in tests.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = Some(latency);
    }

    pub async fn deck(&self, deck_id: &str) -> Option<Deck> {
        self.state.lock().await.decks.get(deck_id).cloned()
    }

    /// Every action pushed so far, in arrival order.
    pub async fn calls(&self) -> Vec<SyncAction> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }
}

#[async_trait]
impl DeckRemote for FakeRemote {
    async fn push(&self, action: &SyncAction) -> Result<PushOutcome, RemoteError> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.calls.push(action.clone());

        if let Some(failure) = state.failures.pop_front() {
            return Err(match failure {
                ScriptedFailure::Timeout => {
                    RemoteError::Retryable("request timed out".to_string())
                }
                ScriptedFailure::ServerError => {
                    RemoteError::Retryable("HTTP 503 from remote".to_string())
                }
                ScriptedFailure::Fatal(message) => RemoteError::Fatal(message),
            });
        }

        match action {
            SyncAction::Create { deck } => {
                state.decks.insert(deck.id.clone(), deck.clone());
                Ok(PushOutcome::Applied(Some(deck.clone())))
            }
            SyncAction::Update { deck, force } => {
                if let Some(current) = state.decks.get(&deck.id) {
                    if !force && current.updated_at > deck.updated_at {
                        return Ok(PushOutcome::Conflict(current.clone()));
                    }
                }
                state.decks.insert(deck.id.clone(), deck.clone());
                Ok(PushOutcome::Applied(Some(deck.clone())))
            }
            SyncAction::Delete { deck_id } => {
                // Idempotent: deleting a missing deck succeeds.
                state.decks.remove(deck_id);
                Ok(PushOutcome::Applied(None))
            }
            SyncAction::AddCard { deck_id, .. }
            | SyncAction::UpdateCard { deck_id, .. }
            | SyncAction::RemoveCard { deck_id, .. } => match state.decks.get_mut(deck_id) {
                None => Err(RemoteError::Fatal(format!("unknown deck: {}", deck_id))),
                Some(deck) => {
                    action.apply_to(deck);
                    Ok(PushOutcome::Applied(Some(deck.clone())))
                }
            },
        }
    }
}
