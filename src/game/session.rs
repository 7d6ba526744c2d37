//! Game Session
//!
//! One run of the quiz from creation to round exhaustion. Composes the
//! round state, the roster and the ranking calculator. All methods are
//! synchronous and side-effect free apart from mutating `self`; locking,
//! question fetching and event emission live in the engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::content::ProviderError;
use crate::game::events::FinalScore;
use crate::game::ranking::{compute_ranking, winners, RankingEntry};
use crate::game::round::{CityCategory, Question, QuestionView, RoundPhase, RoundState};
use crate::game::roster::{AccountId, Participant, Roster};
use crate::game::scoring::{AnswerScorer, ScoringContext};
use crate::store::StoreError;

// =============================================================================
// GAME ID
// =============================================================================

/// Unique game identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub uuid::Uuid);

impl GameId {
    /// Generate a random id.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for GameId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration a game is created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Category questions are drawn from.
    pub category: CityCategory,
    /// Number of rounds, must be positive.
    pub total_rounds: i32,
    /// Seconds allowed per round, must be positive.
    pub countdown_secs: i32,
}

impl GameConfig {
    /// Check the configuration, returning `(total_rounds, countdown_secs)`.
    pub fn validate(&self) -> Result<(u32, u32), GameError> {
        if self.total_rounds <= 0 {
            return Err(GameError::InvalidConfiguration(format!(
                "total rounds must be positive, got {}",
                self.total_rounds
            )));
        }
        if self.countdown_secs <= 0 {
            return Err(GameError::InvalidConfiguration(format!(
                "countdown must be positive, got {}",
                self.countdown_secs
            )));
        }
        Ok((self.total_rounds as u32, self.countdown_secs as u32))
    }
}

/// How repeated answers within one round are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPolicy {
    /// Every submission is scored and added.
    #[default]
    Additive,
    /// Only the first submission per round counts; later ones are rejected.
    FirstOnly,
}

impl FromStr for SubmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "additive" => Ok(SubmissionPolicy::Additive),
            "first_only" => Ok(SubmissionPolicy::FirstOnly),
            other => Err(format!("unknown submission policy: {other}")),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// What could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// No game with this id.
    Game(GameId),
    /// Account is not a participant of the game.
    Participant(AccountId),
    /// Account does not exist.
    Account(AccountId),
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Game(id) => write!(f, "game {id}"),
            NotFoundKind::Participant(id) => write!(f, "participant {id}"),
            NotFoundKind::Account(id) => write!(f, "account {id}"),
        }
    }
}

/// Game engine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Game, participant or account does not exist.
    #[error("{0} not found")]
    NotFound(NotFoundKind),

    /// Non-positive round count or countdown.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Mutation attempted after the last round.
    #[error("game has ended")]
    SessionEnded,

    /// Answer submitted while no round is open.
    #[error("no round is open")]
    NoActiveRound,

    /// Second answer in a round under the first-only policy.
    #[error("already answered this round")]
    AlreadyAnswered,

    /// Question provider failed; the round was not advanced.
    #[error("question provider failed: {0}")]
    Provider(#[from] ProviderError),

    /// Snapshot could not be saved or loaded.
    #[error("storage failed: {0}")]
    Storage(#[from] StoreError),
}

// =============================================================================
// VIEWS
// =============================================================================

/// Read-only snapshot of a game's progress and scoreboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    /// Game identifier
    pub game_id: GameId,
    /// Category of the game
    pub category: CityCategory,
    /// Rounds opened so far
    pub current_round: u32,
    /// Rounds in the game
    pub total_rounds: u32,
    /// Seconds per round
    pub countdown_secs: u32,
    /// Current phase
    pub phase: RoundPhase,
    /// Whether all rounds have been played
    pub ended: bool,
    /// Scoreboard
    pub ranking: Vec<RankingEntry>,
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// A game session. Serializable as the persisted shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Game identifier
    pub id: GameId,

    /// Category questions are drawn from
    pub category: CityCategory,

    /// Seconds allowed per round
    pub countdown_secs: u32,

    /// When the game was created
    pub created_at: DateTime<Utc>,

    /// How repeated answers are treated
    #[serde(default)]
    pub policy: SubmissionPolicy,

    /// Round progress and pending answer
    round: RoundState,

    /// Participants in join order
    roster: Roster,
}

impl GameSession {
    /// Create a game at round 0 with an empty roster.
    pub fn new(
        id: GameId,
        config: &GameConfig,
        policy: SubmissionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, GameError> {
        let (total_rounds, countdown_secs) = config.validate()?;
        Ok(Self {
            id,
            category: config.category,
            countdown_secs,
            created_at: now,
            policy,
            round: RoundState::new(total_rounds),
            roster: Roster::new(),
        })
    }

    /// Round state.
    pub fn round(&self) -> &RoundState {
        &self.round
    }

    /// Participants.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Rounds opened so far.
    pub fn current_round(&self) -> u32 {
        self.round.current_round
    }

    /// Rounds in the game.
    pub fn total_rounds(&self) -> u32 {
        self.round.total_rounds
    }

    /// Whether all rounds have been handed out.
    pub fn is_ended(&self) -> bool {
        self.round.is_ended()
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.round.phase()
    }

    /// Countdown as a duration.
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(u64::from(self.countdown_secs))
    }

    /// Add an account to the roster.
    ///
    /// Returns `true` if added, `false` if the account was already a
    /// participant (its score is left untouched).
    pub fn join(
        &mut self,
        account_id: AccountId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GameError> {
        if self.is_ended() {
            return Err(GameError::SessionEnded);
        }
        if self.roster.contains(&account_id) {
            return Ok(false);
        }
        Ok(self.roster.add(Participant::new(account_id, display_name, now)))
    }

    /// Remove a participant. Absent participants are ignored.
    pub fn remove_player(&mut self, account_id: &AccountId) -> bool {
        self.roster.remove(account_id)
    }

    /// Open the next round with a question from the provider.
    ///
    /// State is only touched once the question has been validated.
    pub fn open_round(&mut self, question: Question, now: DateTime<Utc>) -> Result<QuestionView, GameError> {
        if self.is_ended() {
            return Err(GameError::SessionEnded);
        }
        question.validate().map_err(ProviderError::from)?;

        let Question { prompt, options, correct_answer } = question;
        let round = self
            .round
            .open_next(correct_answer, now)
            .ok_or(GameError::SessionEnded)?;

        Ok(QuestionView {
            round,
            total_rounds: self.total_rounds(),
            category: self.category,
            prompt,
            options,
            countdown_secs: self.countdown_secs,
        })
    }

    /// Close the open round without advancing. Returns whether one was open.
    pub fn close_round(&mut self) -> bool {
        if self.is_ended() {
            return false;
        }
        self.round.close()
    }

    /// When the open round's countdown runs out.
    pub fn round_deadline(&self) -> Option<DateTime<Utc>> {
        self.round.pending_answer()?;
        let opened = self.round.opened_at()?;
        Some(opened + chrono::Duration::seconds(i64::from(self.countdown_secs)))
    }

    /// Score a submission and add the delta to the participant.
    pub fn submit_answer(
        &mut self,
        account_id: AccountId,
        answer: &str,
        scorer: &dyn AnswerScorer,
        now: DateTime<Utc>,
    ) -> Result<u32, GameError> {
        if !self.roster.contains(&account_id) {
            return Err(GameError::NotFound(NotFoundKind::Participant(account_id)));
        }
        let countdown = self.countdown();
        let elapsed = self.round.opened_at().and_then(|t| (now - t).to_std().ok());
        let correct = self
            .round
            .pending_answer()
            .ok_or(GameError::NoActiveRound)?
            .to_string();

        if self.policy == SubmissionPolicy::FirstOnly && self.round.has_answered(&account_id) {
            return Err(GameError::AlreadyAnswered);
        }
        self.round.record_answer(account_id);

        let delta = scorer.score(&ScoringContext {
            correct: &correct,
            submitted: answer,
            elapsed,
            countdown,
        });

        let participant = self
            .roster
            .get_mut(&account_id)
            .ok_or(GameError::NotFound(NotFoundKind::Participant(account_id)))?;
        participant.add_score(i64::from(delta));
        Ok(delta)
    }

    /// Current scoreboard.
    pub fn ranking(&self) -> Vec<RankingEntry> {
        compute_ranking(&self.roster)
    }

    /// Participants currently in first place.
    pub fn winners(&self) -> Vec<RankingEntry> {
        winners(&self.ranking())
    }

    /// Progress snapshot.
    pub fn progress(&self) -> ProgressView {
        ProgressView {
            game_id: self.id,
            category: self.category,
            current_round: self.current_round(),
            total_rounds: self.total_rounds(),
            countdown_secs: self.countdown_secs,
            phase: self.phase(),
            ended: self.is_ended(),
            ranking: self.ranking(),
        }
    }

    /// Final score per participant, in ranking order.
    pub fn final_scores(&self) -> Vec<FinalScore> {
        self.ranking()
            .into_iter()
            .map(|e| FinalScore { account_id: e.account_id, score: e.score, rank: e.rank })
            .collect()
    }
}
