//! Game Events
//!
//! Events emitted by the engine for observers (logging, statistics,
//! connected clients). The engine never depends on anyone consuming them.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::round::CityCategory;
use crate::game::roster::AccountId;
use crate::game::session::GameId;

/// Final score of one participant in a completed game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    /// Account of the participant
    pub account_id: AccountId,
    /// Final score
    pub score: i64,
    /// Final rank
    pub rank: u32,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEventData {
    /// Game was created
    GameCreated {
        category: CityCategory,
        total_rounds: u32,
    },

    /// Account joined the game
    PlayerJoined {
        account_id: AccountId,
        display_name: String,
    },

    /// Participant was removed
    PlayerLeft {
        account_id: AccountId,
    },

    /// A new round was opened
    RoundStarted {
        round: u32,
        total_rounds: u32,
    },

    /// An answer was scored
    AnswerScored {
        account_id: AccountId,
        round: u32,
        delta: u32,
        new_score: i64,
    },

    /// The last round was handed out
    GameEnded {
        final_scores: Vec<FinalScore>,
    },

    /// Game and its participants were deleted
    GameDeleted,
}

/// A game event with its origin and time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Game the event belongs to
    pub game_id: GameId,
    /// When the event occurred
    pub at: DateTime<Utc>,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(game_id: GameId, at: DateTime<Utc>, data: GameEventData) -> Self {
        Self { game_id, at, data }
    }

    /// Account the event concerns, if any.
    pub fn account_id(&self) -> Option<AccountId> {
        match &self.data {
            GameEventData::PlayerJoined { account_id, .. }
            | GameEventData::PlayerLeft { account_id }
            | GameEventData::AnswerScored { account_id, .. } => Some(*account_id),
            _ => None,
        }
    }

    /// Whether this event marks the end of a game.
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, GameEventData::GameEnded { .. } | GameEventData::GameDeleted)
    }
}
