//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames tagged by `type`. Requests may carry a
//! `request_id` which is echoed on the matching response.

use serde::{Serialize, Deserialize};

use crate::game::events::GameEvent;
use crate::game::ranking::RankingEntry;
use crate::game::round::{CityCategory, QuestionView, RoundPhase};
use crate::game::roster::AccountId;
use crate::game::session::{GameError, GameId, ProgressView};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a new game.
    CreateGame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        category: CityCategory,
        total_rounds: i32,
        countdown_secs: i32,
    },

    /// Open the next round.
    AdvanceRound {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
    },

    /// Fetch progress and scoreboard.
    GetGame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
    },

    /// Add an account to a game.
    AddPlayer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        account_id: AccountId,
    },

    /// Remove a participant from a game.
    RemovePlayer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        account_id: AccountId,
    },

    /// Answer the open round.
    SubmitAnswer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        account_id: AccountId,
        answer: String,
    },

    /// Fetch the participants in first place.
    GetWinners {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
    },

    /// Receive events of a game on this connection.
    Subscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
    },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

impl ClientMessage {
    /// Request id to echo back, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ClientMessage::CreateGame { request_id, .. }
            | ClientMessage::AdvanceRound { request_id, .. }
            | ClientMessage::GetGame { request_id, .. }
            | ClientMessage::AddPlayer { request_id, .. }
            | ClientMessage::RemovePlayer { request_id, .. }
            | ClientMessage::SubmitAnswer { request_id, .. }
            | ClientMessage::GetWinners { request_id, .. }
            | ClientMessage::Subscribe { request_id, .. } => request_id.as_deref(),
            ClientMessage::Ping { .. } => None,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Game was created.
    GameCreated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game: ProgressDto,
    },

    /// A round was opened.
    Question {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        question: QuestionDto,
    },

    /// Progress and scoreboard.
    Progress {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game: ProgressDto,
    },

    /// Result of adding a player. `added` is false if they were already in.
    PlayerAdded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        account_id: AccountId,
        added: bool,
    },

    /// Result of removing a player. `removed` is false if they were not in.
    PlayerRemoved {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        account_id: AccountId,
        removed: bool,
    },

    /// Points awarded for an answer.
    AnswerScored {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        account_id: AccountId,
        delta: u32,
    },

    /// Participants in first place.
    Winners {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
        winners: Vec<PlayerDto>,
    },

    /// Subscription confirmed.
    Subscribed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        game_id: GameId,
    },

    /// Game event for a subscribed game.
    Event { event: GameEvent },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error response.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: ErrorCode,
        message: String,
    },

    /// Server is shutting down.
    Shutdown { reason: String },
}

impl ServerMessage {
    /// Error response for a failed request.
    pub fn error(request_id: Option<String>, error: &GameError) -> Self {
        ServerMessage::Error {
            request_id,
            code: ErrorCode::from(error),
            message: error.to_string(),
        }
    }

    /// Error response for a frame that could not be parsed.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            request_id: None,
            code: ErrorCode::InvalidInput,
            message: message.into(),
        }
    }
}

// =============================================================================
// DATA TRANSFER OBJECTS
// =============================================================================

/// One scoreboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDto {
    /// Account identifier.
    pub account_id: AccountId,
    /// Display name.
    pub display_name: String,
    /// Current score.
    pub score: i64,
    /// Rank (1 = first, ties share a rank).
    pub rank: u32,
}

impl From<RankingEntry> for PlayerDto {
    fn from(entry: RankingEntry) -> Self {
        Self {
            account_id: entry.account_id,
            display_name: entry.display_name,
            score: entry.score,
            rank: entry.rank,
        }
    }
}

/// Game progress as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDto {
    /// Game identifier.
    pub game_id: GameId,
    /// Category.
    pub category: CityCategory,
    /// Rounds opened so far.
    pub current_round: u32,
    /// Rounds in the game.
    pub total_rounds: u32,
    /// Seconds per round.
    pub countdown_secs: u32,
    /// Current phase.
    pub phase: RoundPhase,
    /// Whether all rounds have been played.
    pub ended: bool,
    /// Scoreboard, best first.
    pub players: Vec<PlayerDto>,
}

impl From<ProgressView> for ProgressDto {
    fn from(view: ProgressView) -> Self {
        Self {
            game_id: view.game_id,
            category: view.category,
            current_round: view.current_round,
            total_rounds: view.total_rounds,
            countdown_secs: view.countdown_secs,
            phase: view.phase,
            ended: view.ended,
            players: view.ranking.into_iter().map(PlayerDto::from).collect(),
        }
    }
}

/// A round's question. Never carries the correct answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDto {
    /// Game identifier.
    pub game_id: GameId,
    /// Round number (1-based).
    pub round: u32,
    /// Rounds in the game.
    pub total_rounds: u32,
    /// Category.
    pub category: CityCategory,
    /// Picture URL shown as the prompt.
    pub picture_url: String,
    /// Answer options.
    pub options: Vec<String>,
    /// Seconds to answer.
    pub countdown_secs: u32,
}

impl QuestionDto {
    /// Build from the view of a freshly opened round.
    pub fn new(game_id: GameId, view: QuestionView) -> Self {
        Self {
            game_id,
            round: view.round,
            total_rounds: view.total_rounds,
            category: view.category,
            picture_url: view.prompt,
            options: view.options.into(),
            countdown_secs: view.countdown_secs,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Game, participant or account does not exist.
    NotFound,
    /// Request conflicts with the game's state.
    Conflict,
    /// Malformed request or invalid configuration.
    InvalidInput,
    /// Question provider failed, retry later.
    Unavailable,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&GameError> for ErrorCode {
    fn from(error: &GameError) -> Self {
        match error {
            GameError::NotFound(_) => ErrorCode::NotFound,
            GameError::SessionEnded | GameError::NoActiveRound | GameError::AlreadyAnswered => {
                ErrorCode::Conflict
            }
            GameError::InvalidConfiguration(_) => ErrorCode::InvalidInput,
            GameError::Provider(_) => ErrorCode::Unavailable,
            GameError::Storage(_) => ErrorCode::InternalError,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
