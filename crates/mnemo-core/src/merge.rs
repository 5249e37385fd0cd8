//! Deterministic reconciliation of two deck snapshots.
//!
//! `merge_decks` is a pure function: identical inputs always produce an
//! identical output, independent of call order, so a merge can be
//! retried safely. The policies here ("newer `updated_at` wins", "max
//! of counters") are heuristics inherited from the product, not a
//! verified conflict-free merge.

use std::collections::{HashMap, HashSet};

use mnemo_api::{Card, Deck, DeckStats};

/// Reconcile a local and a remote snapshot of the same deck.
///
/// - Scalar fields: the side with the newer `updated_at` wins; on a tie
///   the remote value is taken (remote is overlaid last, a documented
///   tie-break rather than an accident).
/// - Cards are merged by id. A card present on only one side is kept.
///   A card present on both sides resolves by its own `updated_at`,
///   with the same remote tie-break.
/// - Study counters are monotonic on both sides, so the merge takes the
///   maximum of each: progress made offline and progress made remotely
///   are both real and must not be lost.
/// - `updated_at` of the result is the max of both sides.
pub fn merge_decks(local: &Deck, remote: &Deck) -> Deck {
    let scalars = if local.updated_at > remote.updated_at {
        local
    } else {
        remote
    };

    let mut merged = Deck {
        id: remote.id.clone(),
        title: scalars.title.clone(),
        description: scalars.description.clone(),
        owner_id: scalars.owner_id.clone(),
        cards: Vec::new(),
        stats: DeckStats {
            cards_studied: local.stats.cards_studied.max(remote.stats.cards_studied),
            cards_correct: local.stats.cards_correct.max(remote.stats.cards_correct),
        },
        created_at: local.created_at.min(remote.created_at),
        updated_at: local.updated_at.max(remote.updated_at),
    };

    // Remote card order first, then local-only cards in local order, so
    // the result is independent of map iteration order.
    let local_by_id: HashMap<&str, &Card> =
        local.cards.iter().map(|c| (c.id.as_str(), c)).collect();
    let remote_ids: HashSet<&str> = remote.cards.iter().map(|c| c.id.as_str()).collect();

    for remote_card in &remote.cards {
        let chosen = match local_by_id.get(remote_card.id.as_str()) {
            Some(local_card) if local_card.updated_at > remote_card.updated_at => {
                (*local_card).clone()
            }
            _ => remote_card.clone(),
        };
        merged.cards.push(chosen);
    }
    for local_card in &local.cards {
        if !remote_ids.contains(local_card.id.as_str()) {
            merged.cards.push(local_card.clone());
        }
    }

    merged
}
