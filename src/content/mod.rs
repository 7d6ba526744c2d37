//! External Collaborators
//!
//! Interfaces the engine consumes but does not own: the question provider
//! and the account directory, plus the in-process implementations used by
//! the server binary and the tests.

pub mod accounts;
pub mod bank;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::game::round::{CityCategory, InvalidQuestion, Question};
use crate::game::roster::AccountId;
use crate::game::session::GameId;

pub use accounts::InMemoryAccounts;
pub use bank::{CityEntry, QuestionBank};

// =============================================================================
// QUESTION PROVIDER
// =============================================================================

/// Context of a question request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuestionRequest {
    /// Game asking for a question
    pub game_id: GameId,
    /// Round the question is for (1-based)
    pub round: u32,
}

/// Question provider failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Not enough content to build a question.
    #[error("no questions available for category {0}")]
    Exhausted(CityCategory),

    /// Provider did not answer in time.
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    /// Provider returned a question that cannot be scored.
    #[error("invalid question: {0}")]
    InvalidQuestion(#[from] InvalidQuestion),

    /// Provider backend failed.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of questions, one call per round.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Produce the question for the next round of a game.
    async fn next_question(
        &self,
        category: CityCategory,
        request: QuestionRequest,
    ) -> Result<Question, ProviderError>;
}

// =============================================================================
// ACCOUNT DIRECTORY
// =============================================================================

/// Account as seen by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,
    /// Name shown on scoreboards
    pub display_name: String,
}

/// Lookup of external accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Find an account by id.
    async fn find_account(&self, id: AccountId) -> Option<Account>;
}
