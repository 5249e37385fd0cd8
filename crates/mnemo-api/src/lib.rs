//! Shared domain model for mnemo
//!
//! A `Deck` is the top-level syncable aggregate; it owns an ordered
//! collection of `Card` child records and a set of study counters.
//! All timestamps are epoch milliseconds, matching the wire format.

use serde::{Deserialize, Serialize};

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A single flashcard within a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,

    pub deck_id: String,

    pub front: String,

    pub back: String,

    /// Ordering of the card within its deck.
    pub position: i64,

    pub updated_at: i64,
}

impl Card {
    pub fn new(
        id: impl Into<String>,
        deck_id: impl Into<String>,
        front: impl Into<String>,
        back: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            deck_id: deck_id.into(),
            front: front.into(),
            back: back.into(),
            position: 0,
            updated_at: now,
        }
    }
}

/// Study counters for a deck.
///
/// Both fields are monotonic: they only ever grow on either side of a
/// sync, which is why merge takes the maximum rather than either value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckStats {
    #[serde(default)]
    pub cards_studied: i64,

    #[serde(default)]
    pub cards_correct: i64,
}

/// The syncable aggregate: a deck of flashcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,

    pub title: String,

    pub description: Option<String>,

    /// User or session that authored this deck.
    pub owner_id: String,

    #[serde(default)]
    pub cards: Vec<Card>,

    #[serde(default)]
    pub stats: DeckStats,

    pub created_at: i64,

    pub updated_at: i64,
}

impl Deck {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            owner_id: owner_id.into(),
            cards: Vec::new(),
            stats: DeckStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    /// Insert a card, or replace the existing card with the same id.
    pub fn upsert_card(&mut self, card: Card) {
        match self.cards.iter_mut().find(|c| c.id == card.id) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    /// Remove a card by id. Returns false if the card was not present.
    pub fn remove_card(&mut self, card_id: &str) -> bool {
        let before = self.cards.len();
        self.cards.retain(|c| c.id != card_id);
        self.cards.len() < before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_existing_card() {
        let mut deck = Deck::new("d1", "Spanish", "user-1");
        deck.upsert_card(Card::new("c1", "d1", "hola", "hello"));
        deck.upsert_card(Card::new("c2", "d1", "adios", "goodbye"));
        assert_eq!(deck.cards.len(), 2);

        let mut replacement = Card::new("c1", "d1", "hola", "hi");
        replacement.position = 5;
        deck.upsert_card(replacement);

        assert_eq!(deck.cards.len(), 2);
        assert_eq!(deck.card("c1").unwrap().back, "hi");
        assert_eq!(deck.card("c1").unwrap().position, 5);
    }

    #[test]
    fn remove_card_is_idempotent() {
        let mut deck = Deck::new("d1", "Spanish", "user-1");
        deck.upsert_card(Card::new("c1", "d1", "hola", "hello"));

        assert!(deck.remove_card("c1"));
        assert!(!deck.remove_card("c1"));
        assert!(deck.cards.is_empty());
    }
}
