//! Replayable deck mutations.
//!
//! Every local edit is captured as a `SyncAction` so it can be queued
//! durably and replayed against the remote API later. The enum is a
//! closed set: the drain loop dispatches on it exhaustively instead of
//! branching on action-name strings.

use mnemo_api::{Card, Deck};
use serde::{Deserialize, Serialize};

/// A single mutation to a deck, carrying the payload needed to replay
/// it remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    /// Create a new deck (full aggregate payload).
    Create { deck: Deck },

    /// Replace a deck. `force` bypasses the server-side version check;
    /// it is set only when a conflict was resolved in favor of the
    /// local snapshot.
    Update {
        deck: Deck,
        #[serde(default)]
        force: bool,
    },

    /// Delete a deck.
    Delete { deck_id: String },

    /// Add a card to an existing deck.
    AddCard { deck_id: String, card: Card },

    /// Replace a card within a deck.
    UpdateCard { deck_id: String, card: Card },

    /// Remove a card from a deck.
    RemoveCard { deck_id: String, card_id: String },
}

impl SyncAction {
    /// Wire verb for this mutation, used in queue item ids and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncAction::Create { .. } => "create",
            SyncAction::Update { .. } => "update",
            SyncAction::Delete { .. } => "delete",
            SyncAction::AddCard { .. } => "add_card",
            SyncAction::UpdateCard { .. } => "update_card",
            SyncAction::RemoveCard { .. } => "remove_card",
        }
    }

    /// Id of the deck this mutation targets.
    pub fn deck_id(&self) -> &str {
        match self {
            SyncAction::Create { deck } | SyncAction::Update { deck, .. } => &deck.id,
            SyncAction::Delete { deck_id }
            | SyncAction::AddCard { deck_id, .. }
            | SyncAction::UpdateCard { deck_id, .. }
            | SyncAction::RemoveCard { deck_id, .. } => deck_id,
        }
    }

    /// Apply this mutation to a deck snapshot.
    ///
    /// Used to reconstruct the "local pending" view of an aggregate when
    /// only the mutation payload is at hand (conflict detection), and by
    /// the fake remote to simulate server-side application. `Delete` is
    /// a no-op here since deck removal happens at the store level.
    pub fn apply_to(&self, deck: &mut Deck) {
        match self {
            SyncAction::Create { deck: payload } | SyncAction::Update { deck: payload, .. } => {
                *deck = payload.clone();
            }
            SyncAction::Delete { .. } => {}
            SyncAction::AddCard { card, .. } | SyncAction::UpdateCard { card, .. } => {
                deck.updated_at = deck.updated_at.max(card.updated_at);
                deck.upsert_card(card.clone());
            }
            SyncAction::RemoveCard { card_id, .. } => {
                deck.remove_card(card_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_action_tag() {
        let action = SyncAction::Delete {
            deck_id: "d1".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "delete");
        assert_eq!(json["deck_id"], "d1");
    }

    #[test]
    fn update_force_defaults_to_false() {
        let deck = Deck::new("d1", "Spanish", "user-1");
        let json = format!(
            "{{\"action\":\"update\",\"deck\":{}}}",
            serde_json::to_string(&deck).unwrap()
        );
        let parsed: SyncAction = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, SyncAction::Update { force: false, .. }));
    }

    #[test]
    fn apply_to_upserts_and_removes_cards() {
        let mut deck = Deck::new("d1", "Spanish", "user-1");
        let card = Card::new("c1", "d1", "hola", "hello");

        SyncAction::AddCard {
            deck_id: "d1".to_string(),
            card: card.clone(),
        }
        .apply_to(&mut deck);
        assert_eq!(deck.cards.len(), 1);
        assert!(deck.updated_at >= card.updated_at);

        SyncAction::RemoveCard {
            deck_id: "d1".to_string(),
            card_id: "c1".to_string(),
        }
        .apply_to(&mut deck);
        assert!(deck.cards.is_empty());
    }
}
