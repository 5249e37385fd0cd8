//! Wire types for the deck API.

use mnemo_api::{Card, Deck};
use serde::{Deserialize, Serialize};

/// Body of a deck create/update request.
#[derive(Debug, Serialize)]
pub struct DeckRequest<'a> {
    pub deck: &'a Deck,
    /// Bypass the server-side version check. Set only when a conflict
    /// was resolved in favor of the local snapshot.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_update: bool,
}

/// Body of a card create/update request.
#[derive(Debug, Serialize)]
pub struct CardRequest<'a> {
    pub card: &'a Card,
}

/// Successful responses may carry the canonical server-side aggregate.
#[derive(Debug, Deserialize)]
pub struct DeckResponse {
    #[serde(default)]
    pub deck: Option<Deck>,
}

/// A 409 body always carries the current remote snapshot.
#[derive(Debug, Deserialize)]
pub struct ConflictResponse {
    pub current: Deck,
}
