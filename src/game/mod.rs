//! Game Logic Module
//!
//! The session engine's state machine. Pure and synchronous: no locking,
//! no I/O, no logging.
//!
//! ## Module Structure
//!
//! - `roster`: Participants and their scores
//! - `ranking`: Standard competition ranking and winners
//! - `round`: Round index, questions and the pending-answer gate
//! - `scoring`: Pluggable answer scoring policies
//! - `session`: Game session orchestrating the above
//! - `events`: Events emitted on every transition

pub mod roster;
pub mod ranking;
pub mod round;
pub mod scoring;
pub mod session;
pub mod events;

// Re-export key types
pub use roster::{AccountId, Participant, Roster};
pub use ranking::{compute_ranking, RankingEntry};
pub use round::{CityCategory, Question, QuestionView, RoundPhase, RoundState};
pub use scoring::{AnswerScorer, ExactMatch, NormalizedMatch, ScoringMode, TimeWeighted};
pub use session::{GameConfig, GameError, GameId, GameSession, NotFoundKind, ProgressView, SubmissionPolicy};
pub use events::{FinalScore, GameEvent, GameEventData};
