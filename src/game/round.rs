//! Round and Question State
//!
//! Tracks the active round index and the pending correct answer that gates
//! answer submission.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::roster::AccountId;

// =============================================================================
// CATEGORY
// =============================================================================

/// Content category a game draws its questions from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityCategory {
    /// Famous landmarks
    Landmarks,
    /// National capitals
    Capitals,
    /// European cities
    Europe,
    /// Asian cities
    Asia,
    /// North and South American cities
    Americas,
    /// African cities
    Africa,
    /// Oceanian cities
    Oceania,
}

impl CityCategory {
    /// Every category, in declaration order.
    pub const ALL: [CityCategory; 7] = [
        CityCategory::Landmarks,
        CityCategory::Capitals,
        CityCategory::Europe,
        CityCategory::Asia,
        CityCategory::Americas,
        CityCategory::Africa,
        CityCategory::Oceania,
    ];

    /// Wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            CityCategory::Landmarks => "landmarks",
            CityCategory::Capitals => "capitals",
            CityCategory::Europe => "europe",
            CityCategory::Asia => "asia",
            CityCategory::Americas => "americas",
            CityCategory::Africa => "africa",
            CityCategory::Oceania => "oceania",
        }
    }
}

impl fmt::Display for CityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for CityCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CityCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

// =============================================================================
// QUESTION
// =============================================================================

/// Number of options offered per question.
pub const OPTION_COUNT: usize = 4;

/// A question as produced by a question provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Prompt text or media URL
    pub prompt: String,
    /// Candidate answers
    pub options: [String; OPTION_COUNT],
    /// The correct answer, one of `options`
    pub correct_answer: String,
}

/// Reason a provider's question cannot be posed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidQuestion {
    /// Correct answer is not among the options.
    #[error("correct answer is not one of the options")]
    AnswerNotOffered,
    /// Two options are identical.
    #[error("duplicate option: {0}")]
    DuplicateOption(String),
}

impl Question {
    /// Check the question can be scored unambiguously.
    pub fn validate(&self) -> Result<(), InvalidQuestion> {
        if !self.options.contains(&self.correct_answer) {
            return Err(InvalidQuestion::AnswerNotOffered);
        }
        for (i, option) in self.options.iter().enumerate() {
            if self.options[..i].contains(option) {
                return Err(InvalidQuestion::DuplicateOption(option.clone()));
            }
        }
        Ok(())
    }
}

/// The part of a question shown to players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    /// Round number this question belongs to (1-based)
    pub round: u32,
    /// Total rounds of the game
    pub total_rounds: u32,
    /// Category of the game
    pub category: CityCategory,
    /// Prompt text or media URL
    pub prompt: String,
    /// Candidate answers
    pub options: [String; OPTION_COUNT],
    /// Seconds allowed per round, for client-side timing
    pub countdown_secs: u32,
}

// =============================================================================
// ROUND STATE
// =============================================================================

/// Observable phase of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No round has been opened yet
    Created,
    /// A round is open and accepts answers
    RoundOpen,
    /// Between rounds, no pending answer
    RoundClosed,
    /// All rounds have been played
    Ended,
}

/// Round progress and the pending-answer gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    /// Rounds opened so far (0 before the first round)
    pub current_round: u32,

    /// Rounds in the game
    pub total_rounds: u32,

    /// Correct answer of the open round
    pending_answer: Option<String>,

    /// When the current round was opened
    opened_at: Option<DateTime<Utc>>,

    /// Accounts that answered the open round
    answered: BTreeSet<AccountId>,
}

impl RoundState {
    /// Create round state before the first round.
    pub fn new(total_rounds: u32) -> Self {
        Self {
            current_round: 0,
            total_rounds,
            pending_answer: None,
            opened_at: None,
            answered: BTreeSet::new(),
        }
    }

    /// Whether every round has been handed out.
    pub fn is_ended(&self) -> bool {
        self.current_round >= self.total_rounds
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        if self.is_ended() {
            RoundPhase::Ended
        } else if self.pending_answer.is_some() {
            RoundPhase::RoundOpen
        } else if self.current_round == 0 {
            RoundPhase::Created
        } else {
            RoundPhase::RoundClosed
        }
    }

    /// Correct answer of the open round, if any.
    ///
    /// Always `None` once the game has ended.
    pub fn pending_answer(&self) -> Option<&str> {
        if self.is_ended() {
            return None;
        }
        self.pending_answer.as_deref()
    }

    /// When the open round started.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Advance to the next round with a new pending answer.
    ///
    /// Returns the new 1-based round number, or `None` if already ended
    /// (state is left untouched in that case).
    pub fn open_next(&mut self, correct_answer: String, now: DateTime<Utc>) -> Option<u32> {
        if self.is_ended() {
            return None;
        }
        self.answered.clear();
        self.current_round += 1;
        self.pending_answer = Some(correct_answer);
        self.opened_at = Some(now);
        Some(self.current_round)
    }

    /// Close the open round without advancing. Returns whether a round was open.
    pub fn close(&mut self) -> bool {
        self.answered.clear();
        self.opened_at = None;
        self.pending_answer.take().is_some()
    }

    /// Record a submission. Returns false if the account already answered this round.
    pub fn record_answer(&mut self, account_id: AccountId) -> bool {
        self.answered.insert(account_id)
    }

    /// Whether the account already answered this round.
    pub fn has_answered(&self, account_id: &AccountId) -> bool {
        self.answered.contains(account_id)
    }
}
