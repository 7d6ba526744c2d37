//! Network Layer
//!
//! The game engine that owns all live games, and the WebSocket server that
//! exposes it. Game rules live in `game/`; this layer adds locking,
//! persistence, timeouts and transport.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ErrorCode, ProgressDto, QuestionDto, PlayerDto};
pub use session::{EngineConfig, GameEngine};
pub use server::{dispatch, GameServer, ServerConfig, GameServerError};
