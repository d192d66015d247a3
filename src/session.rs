//! Game session: hidden-information bookkeeping and turn arbitration.
//!
//! The rule engine's canonical position is the only board state. Per-side piece
//! maps are replaced wholesale from it after each accepted move; the reveal
//! ledgers are the only thing the session accumulates on its own.

use log;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::actions::{ConnectionId, PieceMap, SessionId};
use crate::enums::{ByColor, Color, Outcome, PieceKind, SessionStatus};
use crate::errors::{GameError, GameResult, RuleResult};
use crate::rules::{RuleEngine, Transition};
use crate::square::Square;

/// Promotion piece used for every pawn reaching the last rank
pub const PROMOTION: PieceKind = PieceKind::Queen;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    id: SessionId,
    players: ByColor<ConnectionId>,
    pieces: ByColor<PieceMap>,
    revealed: ByColor<PieceMap>,
    turn: Color,
    status: SessionStatus,
    position: String,
}

/// Full, unredacted session state. Never sent to a client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub players: ByColor<ConnectionId>,
    pub pieces: ByColor<PieceMap>,
    pub revealed: ByColor<PieceMap>,
    pub turn: Color,
    pub status: SessionStatus,
    pub position: String,
}

/// What one participant is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: SessionId,
    pub color: Color,
    pub players: ByColor<ConnectionId>,
    /// The viewer's own pieces, exact
    pub pieces: PieceMap,
    /// Squares holding an opponent piece whose identity is unknown
    pub hidden: BTreeSet<Square>,
    /// Both reveal ledgers (public to both sides)
    pub revealed: ByColor<PieceMap>,
    pub turn: Color,
    pub status: SessionStatus,
}

/// Summary of an accepted move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveSummary {
    pub color: Color,
    pub from: Square,
    pub to: Square,
    pub captured: Option<(Square, PieceKind)>,
    pub outcome: Option<Outcome>,
}

impl GameSession {
    /// Builds a session from both sides' starting pieces and the notation
    /// derived from them; the notation must load in `engine`.
    pub fn new(
        id: SessionId,
        players: ByColor<ConnectionId>,
        notation: &str,
        engine: &dyn RuleEngine,
    ) -> RuleResult<Self> {
        let state = engine.load(notation)?;
        Ok(Self {
            id,
            players,
            pieces: state.placement,
            revealed: ByColor::default(),
            turn: state.side_to_move,
            status: SessionStatus::Active,
            position: state.notation,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn players(&self) -> &ByColor<ConnectionId> {
        &self.players
    }

    pub fn pieces(&self, color: Color) -> &PieceMap {
        &self.pieces[color]
    }

    pub fn revealed(&self, color: Color) -> &PieceMap {
        &self.revealed[color]
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn position(&self) -> &str {
        &self.position
    }

    /// Color played by `connection_id`, if it is a participant.
    pub fn color_of(&self, connection_id: &str) -> Option<Color> {
        self.players.color_of(connection_id)
    }

    /// Validates and applies `from`→`to` for `color`. On any error the
    /// session is left exactly as it was.
    pub fn apply_move(
        &mut self,
        engine: &dyn RuleEngine,
        color: Color,
        from: Square,
        to: Square,
    ) -> GameResult<MoveSummary> {
        if !self.status.is_active() {
            return Err(GameError::SessionNotActive {
                status: self.status,
            });
        }
        if color != self.turn {
            return Err(GameError::TurnViolation {
                expected: self.turn,
                attempted: color,
            });
        }
        if !self.pieces[color].contains_key(&from) {
            return Err(GameError::StaleOwnership { square: from });
        }

        let transition = engine
            .validate(&self.position, from, to, PROMOTION)
            .map_err(|e| {
                log::debug!("Session {}: rejected {}{} ({})", self.id, from, to, e);
                GameError::IllegalMove { from, to }
            })?;

        Ok(self.commit(color, from, to, transition))
    }

    fn commit(&mut self, color: Color, from: Square, to: Square, transition: Transition) -> MoveSummary {
        let opponent = color.opponent();
        let Transition {
            next,
            destination,
            moved,
            captured,
        } = transition;

        // A capture reveals both the victim and the capturer.
        if let Some((square, kind)) = captured {
            self.revealed[opponent].insert(square, kind);
            self.revealed[color].insert(destination, moved);
        }

        self.pieces = next.placement;
        self.position = next.notation;
        self.turn = opponent;
        if let Some(outcome) = next.outcome {
            log::info!("Session {} finished: {:?}", self.id, outcome);
            self.status = SessionStatus::Finished { outcome };
        }

        MoveSummary {
            color,
            from,
            to,
            captured,
            outcome: next.outcome,
        }
    }

    /// Marks an active session abandoned by `color`. Returns false if the
    /// session was no longer active.
    pub fn abandon(&mut self, color: Color) -> bool {
        if !self.status.is_active() {
            return false;
        }
        self.status = SessionStatus::Abandoned { by: color };
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            players: self.players.clone(),
            pieces: self.pieces.clone(),
            revealed: self.revealed.clone(),
            turn: self.turn,
            status: self.status,
            position: self.position.clone(),
        }
    }

    /// Redacted view for `color`: own pieces, both ledgers, and the squares
    /// of opponent pieces that have not been revealed.
    ///
    /// A square in the opponent's ledger is never reported as hidden. Ledger
    /// entries outlive the piece that earned them, so if a different,
    /// unrevealed opponent piece later stands on that square, the viewer sees
    /// the old ledger kind there rather than a hidden piece.
    pub fn view_for(&self, color: Color) -> PlayerView {
        let opponent = color.opponent();
        let hidden = self.pieces[opponent]
            .keys()
            .filter(|square| !self.revealed[opponent].contains_key(*square))
            .copied()
            .collect();

        PlayerView {
            id: self.id.clone(),
            color,
            players: self.players.clone(),
            pieces: self.pieces[color].clone(),
            hidden,
            revealed: self.revealed.clone(),
            turn: self.turn,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ShakmatyEngine;
    use crate::setup::{derive_position_notation, SetupGenerator};
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn sq(text: &str) -> Square {
        text.parse().unwrap()
    }

    fn players() -> ByColor<ConnectionId> {
        ByColor::new("conn-white".to_string(), "conn-black".to_string())
    }

    fn random_session(seed: u64) -> GameSession {
        let mut setup = SetupGenerator::new(XorShiftRng::seed_from_u64(seed));
        let white = setup.setup_side(Color::White);
        let black = setup.setup_side(Color::Black);
        let notation = derive_position_notation(&white, &black);
        GameSession::new("s1".to_string(), players(), &notation, &ShakmatyEngine).unwrap()
    }

    fn session_from(notation: &str) -> GameSession {
        GameSession::new("s1".to_string(), players(), notation, &ShakmatyEngine).unwrap()
    }

    fn play(session: &mut GameSession, color: Color, from: &str, to: &str) -> GameResult<MoveSummary> {
        session.apply_move(&ShakmatyEngine, color, sq(from), sq(to))
    }

    #[test]
    fn test_new_session_starts_with_white_and_full_sides() {
        let session = random_session(1);
        assert_eq!(session.turn(), Color::White);
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.pieces(Color::White).len(), 16);
        assert_eq!(session.pieces(Color::Black).len(), 16);
        assert!(session.revealed(Color::White).is_empty());
        assert!(session.revealed(Color::Black).is_empty());
    }

    #[test]
    fn test_turn_alternates_with_each_accepted_move() {
        let mut session = random_session(2);
        let moves = [
            (Color::White, "a2", "a3"),
            (Color::Black, "a7", "a6"),
            (Color::White, "b2", "b3"),
            (Color::Black, "b7", "b6"),
            (Color::White, "h2", "h4"),
        ];
        for (k, (color, from, to)) in moves.iter().enumerate() {
            play(&mut session, *color, from, to).unwrap();
            let expected = if (k + 1) % 2 == 0 { Color::White } else { Color::Black };
            assert_eq!(session.turn(), expected);
        }
    }

    #[test]
    fn test_capture_reveals_both_sides() {
        let mut session = random_session(3);
        play(&mut session, Color::White, "e2", "e4").unwrap();
        play(&mut session, Color::Black, "d7", "d5").unwrap();
        let summary = play(&mut session, Color::White, "e4", "d5").unwrap();

        assert_eq!(summary.captured, Some((sq("d5"), PieceKind::Pawn)));
        assert_eq!(session.revealed(Color::Black).get(&sq("d5")), Some(&PieceKind::Pawn));
        assert_eq!(session.revealed(Color::White).get(&sq("d5")), Some(&PieceKind::Pawn));
        assert!(!session.pieces(Color::Black).contains_key(&sq("d5")));
        assert_eq!(session.pieces(Color::Black).len(), 15);
        assert_eq!(session.pieces(Color::White).get(&sq("d5")), Some(&PieceKind::Pawn));
    }

    #[test]
    fn test_reveal_ledger_keeps_entries_after_recapture() {
        let mut session = session_from("4k3/8/8/3p4/4P3/8/8/3QK3 w - - 0 1");
        play(&mut session, Color::White, "e4", "d5").unwrap();
        play(&mut session, Color::Black, "e8", "d7").unwrap();
        play(&mut session, Color::White, "d1", "a1").unwrap();
        play(&mut session, Color::Black, "d7", "d6").unwrap();
        play(&mut session, Color::White, "e1", "f1").unwrap();
        // The black king takes the capturing pawn; white's entry for it stays.
        play(&mut session, Color::Black, "d6", "d5").unwrap();

        assert_eq!(session.revealed(Color::White).get(&sq("d5")), Some(&PieceKind::Pawn));
        assert_eq!(session.revealed(Color::Black).get(&sq("d5")), Some(&PieceKind::King));
        assert!(!session.pieces(Color::White).contains_key(&sq("d5")));
    }

    #[test]
    fn test_rejections_leave_state_byte_identical() {
        let mut session = random_session(4);
        let before = serde_json::to_string(&session.snapshot()).unwrap();

        for _ in 0..2 {
            assert_eq!(
                play(&mut session, Color::White, "e2", "e5"),
                Err(GameError::IllegalMove { from: sq("e2"), to: sq("e5") })
            );
            assert_eq!(serde_json::to_string(&session.snapshot()).unwrap(), before);
        }

        assert!(matches!(
            play(&mut session, Color::Black, "e7", "e5"),
            Err(GameError::TurnViolation { expected: Color::White, attempted: Color::Black })
        ));
        assert_eq!(
            play(&mut session, Color::White, "e4", "e5"),
            Err(GameError::StaleOwnership { square: sq("e4") })
        );
        // Moving an opponent piece is a stale-ownership failure too.
        assert_eq!(
            play(&mut session, Color::White, "e7", "e5"),
            Err(GameError::StaleOwnership { square: sq("e7") })
        );
        assert_eq!(serde_json::to_string(&session.snapshot()).unwrap(), before);
    }

    #[test]
    fn test_piece_keys_stay_disjoint_and_never_grow() {
        let mut session = random_session(5);
        let line = [
            (Color::White, "e2", "e4"),
            (Color::Black, "d7", "d5"),
            (Color::White, "e4", "d5"),
            (Color::Black, "c7", "c6"),
            (Color::White, "d5", "c6"),
        ];
        let mut sizes = (16, 16);
        for (color, from, to) in line {
            play(&mut session, color, from, to).unwrap();
            let white = session.pieces(Color::White);
            let black = session.pieces(Color::Black);
            assert!(white.keys().all(|square| !black.contains_key(square)));
            assert!(white.len() <= sizes.0 && black.len() <= sizes.1);
            sizes = (white.len(), black.len());
        }
        assert_eq!(sizes, (16, 14));
    }

    #[test]
    fn test_castling_relocates_rook_in_piece_map() {
        let mut session = session_from("4k3/8/8/8/8/8/8/4K2R w K - 0 1");
        play(&mut session, Color::White, "e1", "g1").unwrap();
        let white = session.pieces(Color::White);
        assert_eq!(white.get(&sq("g1")), Some(&PieceKind::King));
        assert_eq!(white.get(&sq("f1")), Some(&PieceKind::Rook));
        assert!(!white.contains_key(&sq("h1")));
    }

    #[test]
    fn test_en_passant_reveals_victim_square() {
        let mut session = session_from("4k3/3p4/8/4P3/8/8/8/4K3 b - - 0 1");
        play(&mut session, Color::Black, "d7", "d5").unwrap();
        play(&mut session, Color::White, "e5", "d6").unwrap();
        assert_eq!(session.revealed(Color::Black).get(&sq("d5")), Some(&PieceKind::Pawn));
        assert_eq!(session.revealed(Color::White).get(&sq("d6")), Some(&PieceKind::Pawn));
        assert!(session.pieces(Color::Black).get(&sq("d5")).is_none());
    }

    #[test]
    fn test_promoting_capture_reveals_promoted_piece() {
        let mut session = session_from("1n2k3/P7/8/8/8/8/8/4K3 w - - 0 1");
        let summary = play(&mut session, Color::White, "a7", "b8").unwrap();
        assert_eq!(summary.outcome, None);

        assert_eq!(session.revealed(Color::White).get(&sq("b8")), Some(&PieceKind::Queen));
        assert_eq!(session.revealed(Color::Black).get(&sq("b8")), Some(&PieceKind::Knight));
        let white = session.pieces(Color::White);
        assert_eq!(white.get(&sq("b8")), Some(&PieceKind::Queen));
        assert!(!white.contains_key(&sq("a7")));
        assert!(white.len() <= 16);
        assert!(session.pieces(Color::Black).get(&sq("b8")).is_none());
        assert_eq!(session.turn(), Color::Black);
    }

    #[test]
    fn test_checkmate_finishes_session() {
        let mut session = session_from("rnbqkbnr/ppppp2p/5p2/6p1/4P3/8/PPPP1PPP/RNBQKBNR w - - 0 3");
        let summary = play(&mut session, Color::White, "d1", "h5").unwrap();
        let outcome = Outcome::Checkmate { winner: Color::White };
        assert_eq!(summary.outcome, Some(outcome));
        assert_eq!(session.status(), SessionStatus::Finished { outcome });
        assert!(matches!(
            play(&mut session, Color::Black, "a7", "a6"),
            Err(GameError::SessionNotActive { .. })
        ));
    }

    #[test]
    fn test_abandon_blocks_further_moves() {
        let mut session = random_session(6);
        assert!(session.abandon(Color::Black));
        assert!(!session.abandon(Color::White));
        assert_eq!(session.status(), SessionStatus::Abandoned { by: Color::Black });
        assert!(matches!(
            play(&mut session, Color::White, "e2", "e4"),
            Err(GameError::SessionNotActive { .. })
        ));
    }

    #[test]
    fn test_view_hides_unrevealed_opponent_pieces() {
        let mut session = random_session(7);
        play(&mut session, Color::White, "e2", "e4").unwrap();
        play(&mut session, Color::Black, "d7", "d5").unwrap();
        play(&mut session, Color::White, "e4", "d5").unwrap();

        let black_view = session.view_for(Color::Black);
        assert_eq!(black_view.color, Color::Black);
        assert_eq!(&black_view.pieces, session.pieces(Color::Black));
        // d5 now holds the revealed white pawn; the other 15 white pieces are unknown.
        assert_eq!(black_view.hidden.len(), 15);
        assert!(!black_view.hidden.contains(&sq("d5")));
        assert_eq!(black_view.revealed.white.get(&sq("d5")), Some(&PieceKind::Pawn));

        let white_view = session.view_for(Color::White);
        assert_eq!(white_view.hidden.len(), 15);
        let json = serde_json::to_string(&white_view).unwrap();
        assert!(!json.contains(session.position()));
    }

    #[test]
    fn test_color_of_participants() {
        let session = random_session(8);
        assert_eq!(session.color_of("conn-white"), Some(Color::White));
        assert_eq!(session.color_of("conn-black"), Some(Color::Black));
        assert_eq!(session.color_of("someone-else"), None);
    }
}
