//! In-memory snapshot store.
//!
//! Snapshots are kept bincode-encoded, so every save and load goes through
//! the same encoding a durable backend would use.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::game::session::{GameId, GameSession};
use crate::store::{SessionStore, StoreError};

/// Store keeping encoded snapshots in a map.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshots: RwLock<BTreeMap<GameId, Vec<u8>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored games.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

/// Encode a snapshot.
pub fn encode_snapshot(session: &GameSession) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(session).map_err(|e| StoreError::Encode(e.to_string()))
}

/// Decode a snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> Result<GameSession, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn save(&self, session: &GameSession) -> Result<(), StoreError> {
        let bytes = encode_snapshot(session)?;
        self.snapshots.write().await.insert(session.id, bytes);
        Ok(())
    }

    async fn load(&self, id: &GameId) -> Result<Option<GameSession>, StoreError> {
        let snapshots = self.snapshots.read().await;
        snapshots.get(id).map(|bytes| decode_snapshot(bytes)).transpose()
    }

    async fn delete(&self, id: &GameId) -> Result<bool, StoreError> {
        Ok(self.snapshots.write().await.remove(id).is_some())
    }
}
