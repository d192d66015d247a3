// Fog-of-war Chess960 Server Library - Core Module Organization
//
// Randomized back ranks, hidden opponent pieces revealed only by capture,
// and a websocket front end that pairs connections two at a time.

// Core game data structures and enums
pub mod actions;
pub mod enums;
pub mod errors;
pub mod square;

// Game logic implementation
pub mod matchmaker;
pub mod rules;
pub mod session;
pub mod setup;

// Server implementation
pub mod application;
pub mod broadcast;
pub mod config;
pub mod websocket;

// Re-export common types for convenient access
pub use crate::actions::{ConnectionId, MoveRequest, Pairing, PieceMap, SessionId};
pub use crate::application::{GameService, ServiceStats};
pub use crate::broadcast::{Broadcaster, ConnectionRegistry};
pub use crate::config::{Config, GameConfig};
pub use crate::enums::{ByColor, Color, Outcome, PieceKind, SessionStatus};
pub use crate::errors::{AppError, AppResult, GameError, GameResult, RejectionKind};
pub use crate::rules::{RuleEngine, ShakmatyEngine};
pub use crate::session::{GameSession, PlayerView, SessionSnapshot};
pub use crate::square::Square;
pub use crate::websocket::{WebSocketService, WsMessage};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
