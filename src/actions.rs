use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::enums::{Color, PieceKind};
use crate::square::Square;

/// Stable identity of a transport connection
pub type ConnectionId = String;

/// Unique identifier for game sessions
pub type SessionId = String;

/// One side's pieces (or reveal ledger), keyed by square
pub type PieceMap = BTreeMap<Square, PieceKind>;

/// A move submitted by a connection. Squares arrive as text and are parsed
/// by the service, so a bad square is rejected like any other move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub session_id: SessionId,
    pub from: String,
    pub to: String,
    pub color: Color,
}

/// Result of `Matchmaker::join`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pairing {
    Waiting,
    Paired {
        white: ConnectionId,
        black: ConnectionId,
    },
}
