//! Seam to the local read model.
//!
//! The engine refreshes the local cache with canonical server state
//! after successful pushes and remote-wins conflict resolutions, and
//! reads it to reconstruct the local snapshot when a conflict is
//! detected. Rendering and querying of the cache are out of scope
//! here; the UI owns those.

use std::collections::HashMap;

use async_trait::async_trait;
use mnemo_api::Deck;
use tokio::sync::RwLock;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Current local snapshot of a deck, if cached.
    async fn get(&self, deck_id: &str) -> Result<Option<Deck>>;

    /// Replace the cached deck with the canonical server-side version.
    async fn apply_remote(&self, deck: Deck) -> Result<()>;

    /// Drop a deck that no longer exists remotely.
    async fn evict(&self, deck_id: &str) -> Result<()>;
}

/// Map-backed cache, used by tests and as the default wiring for
/// callers that keep their read model in memory.
#[derive(Default)]
pub struct InMemoryDeckCache {
    decks: RwLock<HashMap<String, Deck>>,
}

impl InMemoryDeckCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a deck directly, bypassing the sync path.
    pub async fn insert(&self, deck: Deck) {
        self.decks.write().await.insert(deck.id.clone(), deck);
    }

    pub async fn len(&self) -> usize {
        self.decks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.decks.read().await.is_empty()
    }
}

#[async_trait]
impl LocalCache for InMemoryDeckCache {
    async fn get(&self, deck_id: &str) -> Result<Option<Deck>> {
        Ok(self.decks.read().await.get(deck_id).cloned())
    }

    async fn apply_remote(&self, deck: Deck) -> Result<()> {
        self.decks.write().await.insert(deck.id.clone(), deck);
        Ok(())
    }

    async fn evict(&self, deck_id: &str) -> Result<()> {
        self.decks.write().await.remove(deck_id);
        Ok(())
    }
}
