//! # Conversation Registry
//!
//! Owns every peer's `ConversationState`. States are created lazily on a peer's
//! first turn, never evicted, and written through to the `StateStore` after each
//! change. Hydrated from the store at startup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::traits::StateStore;
use crate::domain::types::{ConversationState, PeerId};

#[derive(Clone)]
pub struct ConversationRegistry {
    states: Arc<Mutex<HashMap<PeerId, ConversationState>>>,
    store: Arc<dyn StateStore>,
}

impl ConversationRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            store,
        }
    }

    /// Loads persisted states. A broken store starts the registry empty.
    pub async fn hydrate(&self) -> usize {
        match self.store.load_conversations().await {
            Ok(loaded) => {
                let mut states = self.states.lock().await;
                for state in loaded {
                    states.insert(state.peer.clone(), state);
                }
                states.len()
            }
            Err(e) => {
                tracing::error!("Failed to load conversation state: {:#}", e);
                0
            }
        }
    }

    /// Applies `f` to the peer's state (creating it if needed) and persists the result.
    /// The lock is held until the write lands, so saves reach the store in update order.
    pub async fn update<R>(&self, peer: &str, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let mut states = self.states.lock().await;
        let state = states
            .entry(peer.to_string())
            .or_insert_with(|| ConversationState::new(peer));
        let result = f(state);
        let snapshot = state.clone();
        self.persist(&snapshot).await;
        result
    }

    /// Current state, without creating one.
    pub async fn get(&self, peer: &str) -> Option<ConversationState> {
        self.states.lock().await.get(peer).cloned()
    }

    pub async fn all(&self) -> Vec<ConversationState> {
        let mut all: Vec<_> = self.states.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.peer.cmp(&b.peer));
        all
    }

    async fn persist(&self, state: &ConversationState) {
        if let Err(e) = self.store.save_conversation(state).await {
            tracing::error!("Failed to persist conversation {}: {:#}", state.peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::MemoryStore;
    use crate::domain::types::ConversationMode;
    use std::time::Duration;

    #[tokio::test]
    async fn update_creates_lazily_and_writes_through() {
        let store = MemoryStore::new();
        let registry = ConversationRegistry::new(store.clone());
        assert!(registry.get("!p:x").await.is_none());

        registry
            .update("!p:x", |s| s.mode = ConversationMode::HumanActive)
            .await;

        assert_eq!(registry.get("!p:x").await.map(|s| s.mode), Some(ConversationMode::HumanActive));
        assert_eq!(store.conversation("!p:x").map(|s| s.mode), Some(ConversationMode::HumanActive));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn slow_saves_land_in_update_order() {
        let store = MemoryStore::new();
        store.delay_conversation_saves([Duration::from_secs(2), Duration::from_secs(1)]);
        let registry = ConversationRegistry::new(store.clone());

        tokio::join!(
            registry.update("!p:x", |s| s.mode = ConversationMode::HumanActive),
            registry.update("!p:x", |s| s.mode = ConversationMode::Blocked),
        );

        assert_eq!(registry.get("!p:x").await.map(|s| s.mode), Some(ConversationMode::Blocked));
        assert_eq!(store.conversation("!p:x").map(|s| s.mode), Some(ConversationMode::Blocked));
    }

    #[tokio::test]
    async fn hydrate_restores_persisted_modes() {
        let store = MemoryStore::new();
        let mut blocked = ConversationState::new("!b:x");
        blocked.mode = ConversationMode::Blocked;
        store.seed_conversation(blocked);
        store.seed_conversation(ConversationState::new("!a:x"));

        let registry = ConversationRegistry::new(store);
        assert_eq!(registry.hydrate().await, 2);
        let peers: Vec<_> = registry.all().await.into_iter().map(|s| s.peer).collect();
        assert_eq!(peers, vec!["!a:x", "!b:x"]);
        assert_eq!(registry.get("!b:x").await.map(|s| s.mode), Some(ConversationMode::Blocked));
    }
}
