use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{ConnectionId, SessionId};
use crate::enums::{Color, SessionStatus};
use crate::square::Square;

/// Top-level error type for the fog-of-war chess server
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Rule engine error: {0}")]
    Rules(#[from] RuleError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),
}

/// Session-level rejections. Every variant leaves session state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameError {
    #[error("Session not found: {session_id}")]
    UnknownSession { session_id: SessionId },

    #[error("Not {attempted}'s turn: {expected} to move")]
    TurnViolation { expected: Color, attempted: Color },

    #[error("Illegal move {from}{to}")]
    IllegalMove { from: Square, to: Square },

    #[error("No piece of the mover's own at {square}")]
    StaleOwnership { square: Square },

    #[error("Connection {connection_id} does not play {color} in this session")]
    NotAParticipant {
        connection_id: ConnectionId,
        color: Color,
    },

    #[error("Session is not active: {status}")]
    SessionNotActive { status: SessionStatus },

    #[error("Invalid square: {text:?}")]
    InvalidSquare { text: String },
}

/// Failures of the rule engine. The session layer reports these as `IllegalMove`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleError {
    #[error("Invalid position notation: {details}")]
    InvalidNotation { details: String },

    #[error("No legal move from {from} to {to}")]
    NoSuchMove { from: Square, to: Square },
}

/// Network/WebSocket errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum NetworkError {
    #[error("Message serialization failed: {details}")]
    SerializationFailed { details: String },

    #[error("Message deserialization failed: {details}")]
    DeserializationFailed { details: String },
}

/// Infrastructure errors (listener)
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum InfrastructureError {
    #[error("Failed to bind {address}: {details}")]
    Bind { address: String, details: String },

    #[error("Server error: {details}")]
    Serve { details: String },
}

/// Machine-readable rejection reason sent back to the submitter of a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    UnknownSession,
    TurnViolation,
    IllegalMove,
    StaleOwnership,
    NotAParticipant,
    SessionNotActive,
    InvalidSquare,
}

/// Result type aliases for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type GameResult<T> = Result<T, GameError>;
pub type RuleResult<T> = Result<T, RuleError>;

impl GameError {
    pub fn unknown_session(session_id: impl Into<SessionId>) -> Self {
        Self::UnknownSession {
            session_id: session_id.into(),
        }
    }

    pub fn kind(&self) -> RejectionKind {
        match self {
            GameError::UnknownSession { .. } => RejectionKind::UnknownSession,
            GameError::TurnViolation { .. } => RejectionKind::TurnViolation,
            GameError::IllegalMove { .. } => RejectionKind::IllegalMove,
            GameError::StaleOwnership { .. } => RejectionKind::StaleOwnership,
            GameError::NotAParticipant { .. } => RejectionKind::NotAParticipant,
            GameError::SessionNotActive { .. } => RejectionKind::SessionNotActive,
            GameError::InvalidSquare { .. } => RejectionKind::InvalidSquare,
        }
    }
}

impl RuleError {
    pub fn invalid_notation(details: impl ToString) -> Self {
        Self::InvalidNotation {
            details: details.to_string(),
        }
    }
}

impl NetworkError {
    pub fn serialization_failed(details: impl ToString) -> Self {
        Self::SerializationFailed {
            details: details.to_string(),
        }
    }

    pub fn deserialization_failed(details: impl ToString) -> Self {
        Self::DeserializationFailed {
            details: details.to_string(),
        }
    }
}
