//! HTTP client for the deck sync API.
//!
//! One request per `SyncAction`, classified by status code:
//! 2xx is applied (the body may carry the canonical aggregate), 409 is
//! a conflict carrying the current remote snapshot, other 4xx is
//! fatal, and 5xx or a transport error is retryable.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use mnemo_core::{DeckRemote, PushOutcome, RemoteError, SyncAction};

use crate::models::{CardRequest, ConflictResponse, DeckRequest, DeckResponse};

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per-request timeout; a timeout classifies as retryable.
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mnemo.app/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    default_headers: HeaderMap,
}

impl HttpRemote {
    pub fn new(config: RemoteConfig) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            headers.insert(
                "Authorization",
                format!("Bearer {}", api_key)
                    .parse()
                    .expect("Invalid API key format"),
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_headers: headers,
        }
    }

    /// Method and URL for an action, per the deck API contract.
    fn route(&self, action: &SyncAction) -> (Method, String) {
        let base = &self.base_url;
        match action {
            SyncAction::Create { .. } => (Method::POST, format!("{}/decks", base)),
            SyncAction::Update { deck, .. } => {
                (Method::PUT, format!("{}/decks/{}", base, deck.id))
            }
            SyncAction::Delete { deck_id } => {
                (Method::DELETE, format!("{}/decks/{}", base, deck_id))
            }
            SyncAction::AddCard { deck_id, .. } => {
                (Method::POST, format!("{}/decks/{}/cards", base, deck_id))
            }
            SyncAction::UpdateCard { deck_id, card } => (
                Method::PUT,
                format!("{}/decks/{}/cards/{}", base, deck_id, card.id),
            ),
            SyncAction::RemoveCard { deck_id, card_id } => (
                Method::DELETE,
                format!("{}/decks/{}/cards/{}", base, deck_id, card_id),
            ),
        }
    }

    fn body(action: &SyncAction) -> Option<serde_json::Value> {
        match action {
            SyncAction::Create { deck } => serde_json::to_value(DeckRequest {
                deck,
                force_update: false,
            })
            .ok(),
            SyncAction::Update { deck, force } => serde_json::to_value(DeckRequest {
                deck,
                force_update: *force,
            })
            .ok(),
            SyncAction::AddCard { card, .. } | SyncAction::UpdateCard { card, .. } => {
                serde_json::to_value(CardRequest { card }).ok()
            }
            SyncAction::Delete { .. } | SyncAction::RemoveCard { .. } => None,
        }
    }
}

#[async_trait]
impl DeckRemote for HttpRemote {
    #[instrument(name = "remote.push", skip(self, action), fields(kind = action.kind(), deck = action.deck_id()))]
    async fn push(&self, action: &SyncAction) -> Result<PushOutcome, RemoteError> {
        let (method, url) = self.route(action);
        debug!(%method, %url, "pushing mutation");

        let mut request = self
            .client
            .request(method, &url)
            .headers(self.default_headers.clone());
        if let Some(body) = Self::body(action) {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &url))?;
        classify_response(response, &url).await
    }
}

fn classify_transport_error(error: &reqwest::Error, url: &str) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Retryable(format!("request to {} timed out", url))
    } else if error.is_builder() {
        // A request we can never build will never succeed either.
        RemoteError::Fatal(format!("malformed request for {}: {}", url, error))
    } else if error.is_connect() {
        RemoteError::Retryable(format!("connection to {} failed: {}", url, error))
    } else {
        RemoteError::Retryable(format!("transport error for {}: {}", url, error))
    }
}

async fn classify_response(
    response: reqwest::Response,
    url: &str,
) -> Result<PushOutcome, RemoteError> {
    let status = response.status();

    if status.is_success() {
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                // The mutation was applied; a lost body only costs the
                // cache refresh.
                warn!(%url, error = %e, "failed to read success body");
                String::new()
            }
        };
        let deck = serde_json::from_str::<DeckResponse>(&text)
            .ok()
            .and_then(|r| r.deck);
        return Ok(PushOutcome::Applied(deck));
    }

    let text = response
        .text()
        .await
        .map_err(|e| RemoteError::Retryable(format!("failed to read response body: {}", e)))?;

    if status == StatusCode::CONFLICT {
        let body: ConflictResponse = serde_json::from_str(&text).map_err(|e| {
            RemoteError::Fatal(format!("conflict response missing remote snapshot: {}", e))
        })?;
        return Ok(PushOutcome::Conflict(body.current));
    }

    let message = format!(
        "HTTP {} from {}: {}",
        status.as_u16(),
        url,
        truncate_body(&text)
    );
    if status.is_server_error() {
        Err(RemoteError::Retryable(message))
    } else {
        Err(RemoteError::Fatal(message))
    }
}

/// Keep error messages readable when the server returns a page of HTML.
fn truncate_body(text: &str) -> String {
    if text.len() > 500 {
        format!("{}... (truncated)", &text[..500])
    } else {
        text.to_string()
    }
}
