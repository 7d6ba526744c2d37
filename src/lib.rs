//! # Quiz Arena Server
//!
//! Round-based multiplayer city quiz: players join a game, the game hands out
//! one picture question per round, answers are scored and a ranked
//! scoreboard decides the winners.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    QUIZ ARENA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Seeded xoroshiro128+ and round seeds     │
//! │                                                              │
//! │  game/           - Game rules (pure, synchronous)            │
//! │  ├── roster.rs   - Participants and scores                   │
//! │  ├── ranking.rs  - Competition ranking and winners           │
//! │  ├── round.rs    - Round index and pending answer            │
//! │  ├── scoring.rs  - Answer scoring policies                   │
//! │  ├── session.rs  - Game session state machine                │
//! │  └── events.rs   - Events emitted on transitions             │
//! │                                                              │
//! │  content/        - Question provider and account directory   │
//! │  store/          - Snapshot persistence                      │
//! │                                                              │
//! │  network/        - Engine and transport                      │
//! │  ├── session.rs  - GameEngine (locking, timeouts, events)    │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every game sits behind its own lock. Two operations on the same game never
//! interleave; operations on different games run in parallel. A round only
//! advances once the provider has returned a valid question, so a failed or
//! timed out provider call leaves the game exactly as it was.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod content;
pub mod store;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::session::{GameConfig, GameError, GameId, GameSession, ProgressView};
pub use game::roster::AccountId;
pub use game::round::{CityCategory, Question, QuestionView};
pub use content::{AccountDirectory, QuestionProvider, QuestionBank, InMemoryAccounts};
pub use store::{SessionStore, InMemoryStore};
pub use network::{EngineConfig, GameEngine, GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of rounds per game
pub const DEFAULT_TOTAL_ROUNDS: i32 = 10;

/// Default seconds per round
pub const DEFAULT_COUNTDOWN_SECS: i32 = 15;
