//! Chess-rule legality, delegated to shakmaty.
//!
//! The canonical position is kept as a position-notation string so the
//! session never holds engine-specific types. Every call re-parses it.

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Role};

use crate::actions::PieceMap;
use crate::enums::{ByColor, Color, Outcome, PieceKind};
use crate::errors::{RuleError, RuleResult};
use crate::square::Square;

/// A loaded canonical position together with what it implies for each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionState {
    /// Canonical notation as re-serialized by the engine
    pub notation: String,
    pub placement: ByColor<PieceMap>,
    pub side_to_move: Color,
    pub outcome: Option<Outcome>,
}

/// An accepted move and its consequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: PositionState,
    /// Square the moving piece ended on (differs from the requested `to` when
    /// castling is requested as king-takes-rook)
    pub destination: Square,
    /// Kind now standing on `destination`
    pub moved: PieceKind,
    /// Square and kind of the captured piece, if any
    pub captured: Option<(Square, PieceKind)>,
}

/// Authority on chess legality. Implementations are pure and never block.
pub trait RuleEngine: Send + Sync {
    fn load(&self, notation: &str) -> RuleResult<PositionState>;

    /// Validates `from`→`to` in `notation`, using `promotion` when a pawn
    /// reaches the last rank, and returns the resulting position.
    fn validate(
        &self,
        notation: &str,
        from: Square,
        to: Square,
        promotion: PieceKind,
    ) -> RuleResult<Transition>;
}

/// Rule engine backed by shakmaty with Chess960 castling semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyEngine;

impl ShakmatyEngine {
    pub fn new() -> Self {
        Self
    }

    fn parse(&self, notation: &str) -> RuleResult<Chess> {
        let fen: Fen = notation.parse().map_err(RuleError::invalid_notation)?;
        fen.into_position(CastlingMode::Chess960)
            .map_err(RuleError::invalid_notation)
    }

    fn describe(&self, position: &Chess) -> RuleResult<PositionState> {
        let mut placement: ByColor<PieceMap> = ByColor::default();
        for square in Square::all() {
            if let Some(piece) = position.board().piece_at(engine_square(square)?) {
                placement[color_from(piece.color)].insert(square, kind_from(piece.role));
            }
        }

        let notation = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
        Ok(PositionState {
            notation,
            placement,
            side_to_move: color_from(position.turn()),
            outcome: outcome_of(position),
        })
    }

    fn find_move(&self, position: &Chess, from: Square, to: Square, promotion: PieceKind) -> RuleResult<Move> {
        let from_sq = engine_square(from)?;
        let to_sq = engine_square(to)?;
        let promotion = role_from(promotion);
        let legal = position.legal_moves();

        let plain = legal.iter().find(|m| {
            !m.is_castle()
                && m.from() == Some(from_sq)
                && m.to() == to_sq
                && m.promotion().map_or(true, |role| role == promotion)
        });
        // Castling may be requested as king-to-destination or king-takes-rook.
        let castle = || {
            legal.iter().find(|m| match m {
                Move::Castle { king, rook } => {
                    *king == from_sq
                        && (*rook == to_sq
                            || m.castling_side()
                                .map_or(false, |side| side.king_to(position.turn()) == to_sq))
                }
                _ => false,
            })
        };

        plain
            .or_else(castle)
            .cloned()
            .ok_or(RuleError::NoSuchMove { from, to })
    }
}

impl RuleEngine for ShakmatyEngine {
    fn load(&self, notation: &str) -> RuleResult<PositionState> {
        let position = self.parse(notation)?;
        self.describe(&position)
    }

    fn validate(
        &self,
        notation: &str,
        from: Square,
        to: Square,
        promotion: PieceKind,
    ) -> RuleResult<Transition> {
        let position = self.parse(notation)?;
        let mover = position.turn();
        let chosen = self.find_move(&position, from, to, promotion)?;

        let destination = match chosen.castling_side() {
            Some(side) => side.king_to(mover),
            None => chosen.to(),
        };
        let captured = match chosen.capture() {
            Some(role) => {
                // En passant removes the pawn beside the destination, not on it.
                let victim = if chosen.is_en_passant() {
                    shakmaty::Square::from_coords(chosen.to().file(), victim_rank(&chosen, mover))
                } else {
                    chosen.to()
                };
                Some((square_from(victim)?, kind_from(role)))
            }
            None => None,
        };
        let moved = kind_from(chosen.promotion().unwrap_or(chosen.role()));

        let mut next = position;
        next.play_unchecked(&chosen);

        Ok(Transition {
            next: self.describe(&next)?,
            destination: square_from(destination)?,
            moved,
            captured,
        })
    }
}

/// Rank the en-passant victim stands on: the mover's fifth rank.
fn victim_rank(m: &Move, mover: shakmaty::Color) -> shakmaty::Rank {
    match m.from() {
        Some(from) => from.rank(),
        None => match mover {
            shakmaty::Color::White => shakmaty::Rank::Fifth,
            shakmaty::Color::Black => shakmaty::Rank::Fourth,
        },
    }
}

fn outcome_of(position: &Chess) -> Option<Outcome> {
    if position.is_checkmate() {
        Some(Outcome::Checkmate {
            winner: color_from(position.turn()).opponent(),
        })
    } else if position.is_stalemate() {
        Some(Outcome::Stalemate)
    } else if position.is_insufficient_material() {
        Some(Outcome::InsufficientMaterial)
    } else {
        None
    }
}

fn engine_square(square: Square) -> RuleResult<shakmaty::Square> {
    square
        .to_string()
        .parse()
        .map_err(RuleError::invalid_notation)
}

fn square_from(square: shakmaty::Square) -> RuleResult<Square> {
    square
        .to_string()
        .parse()
        .map_err(RuleError::invalid_notation)
}

fn color_from(color: shakmaty::Color) -> Color {
    match color {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    }
}

fn kind_from(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

fn role_from(kind: PieceKind) -> Role {
    match kind {
        PieceKind::Pawn => Role::Pawn,
        PieceKind::Knight => Role::Knight,
        PieceKind::Bishop => Role::Bishop,
        PieceKind::Rook => Role::Rook,
        PieceKind::Queen => Role::Queen,
        PieceKind::King => Role::King,
    }
}
