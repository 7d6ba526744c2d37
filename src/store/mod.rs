//! Persistence Boundary
//!
//! Games are saved as whole snapshots: a game owns its participants, so
//! saving a game saves its roster and deleting a game deletes its roster.

pub mod memory;

use async_trait::async_trait;

use crate::game::session::{GameId, GameSession};

pub use memory::InMemoryStore;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Snapshot could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Stored bytes could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Storage backend failed.
    #[error("backend failed: {0}")]
    Backend(String),
}

/// Durable storage of game snapshots.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a game snapshot.
    async fn save(&self, session: &GameSession) -> Result<(), StoreError>;

    /// Load a game snapshot.
    async fn load(&self, id: &GameId) -> Result<Option<GameSession>, StoreError>;

    /// Delete a game together with all of its participants.
    /// Returns whether a game was stored.
    async fn delete(&self, id: &GameId) -> Result<bool, StoreError>;
}
