//! Randomized starting setups.
//!
//! Each side gets an independently drawn Chess960 back rank (bishops on
//! opposite square colors, king between the rooks) and a standard pawn row.
//! The two sides are then serialized into the position notation the rule
//! engine loads.

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::actions::PieceMap;
use crate::enums::{Color, PieceKind};
use crate::square::Square;

pub type BackRank = [PieceKind; 8];

/// Draws back ranks and full sides from the supplied RNG.
pub struct SetupGenerator<R> {
    rng: R,
}

impl<R: Rng> SetupGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate_back_rank(&mut self) -> BackRank {
        let mut files: [Option<PieceKind>; 8] = [None; 8];

        // Bishops: one odd-index file, one even-index file.
        let odd = *[1usize, 3, 5, 7].choose(&mut self.rng).unwrap_or(&1);
        let even = *[0usize, 2, 4, 6].choose(&mut self.rng).unwrap_or(&0);
        files[odd] = Some(PieceKind::Bishop);
        files[even] = Some(PieceKind::Bishop);

        if let Some(&queen) = free_files(&files).choose(&mut self.rng) {
            files[queen] = Some(PieceKind::Queen);
        }

        for knight in free_files(&files).choose_multiple(&mut self.rng, 2) {
            files[*knight] = Some(PieceKind::Knight);
        }

        place_rooks_and_king(&mut files);
        files.map(|kind| kind.unwrap_or(PieceKind::Pawn))
    }

    /// Back rank on rank 1 (white) or 8 (black), pawns on rank 2 / 7.
    pub fn setup_side(&mut self, color: Color) -> PieceMap {
        let back_rank = self.generate_back_rank();
        side_from_back_rank(color, &back_rank)
    }
}

fn free_files(files: &[Option<PieceKind>; 8]) -> Vec<usize> {
    files
        .iter()
        .enumerate()
        .filter(|(_, kind)| kind.is_none())
        .map(|(index, _)| index)
        .collect()
}

/// Fills the three remaining empty files, in ascending order, with Rook, King, Rook.
pub fn place_rooks_and_king(files: &mut [Option<PieceKind>; 8]) {
    let order = [PieceKind::Rook, PieceKind::King, PieceKind::Rook];
    for (index, kind) in free_files(files).into_iter().zip(order) {
        files[index] = Some(kind);
    }
}

pub fn side_from_back_rank(color: Color, back_rank: &BackRank) -> PieceMap {
    let mut pieces = PieceMap::new();
    for (file, kind) in back_rank.iter().enumerate() {
        if let Some(square) = Square::new(file as u8, color.back_rank()) {
            pieces.insert(square, *kind);
        }
        if let Some(square) = Square::new(file as u8, color.pawn_rank()) {
            pieces.insert(square, PieceKind::Pawn);
        }
    }
    pieces
}

/// Board part of the notation: ranks 8 to 1, runs of empty squares as digits.
fn placement_field(white: &PieceMap, black: &PieceMap) -> String {
    (0..8u8)
        .rev()
        .map(|rank| {
            (0..8u8)
                .filter_map(|file| Square::new(file, rank))
                .map(|square| {
                    white
                        .get(&square)
                        .map(|kind| kind.notation_char(Color::White))
                        .or_else(|| black.get(&square).map(|kind| kind.notation_char(Color::Black)))
                })
                .dedup_with_count()
                .map(|(count, cell)| match cell {
                    Some(letter) => std::iter::repeat(letter).take(count).collect::<String>(),
                    None => count.to_string(),
                })
                .collect::<String>()
        })
        .join("/")
}

/// Full position notation with white to move, no castling rights, no
/// en-passant target, halfmove clock 0, fullmove 1.
pub fn derive_position_notation(white: &PieceMap, black: &PieceMap) -> String {
    format!("{} w - - 0 1", placement_field(white, black))
}

/// Like [`derive_position_notation`] but with Chess960 castling rights for
/// every rook still on its side's back rank alongside the king, written as
/// rook files (upper case for white).
pub fn derive_position_notation_960(white: &PieceMap, black: &PieceMap) -> String {
    let castling = format!(
        "{}{}",
        castling_files(Color::White, white),
        castling_files(Color::Black, black)
    );
    let castling = if castling.is_empty() { "-".to_string() } else { castling };
    format!("{} w {} - 0 1", placement_field(white, black), castling)
}

fn castling_files(color: Color, pieces: &PieceMap) -> String {
    let on_back_rank = |wanted: PieceKind| {
        pieces
            .iter()
            .filter(move |(square, kind)| square.rank() == color.back_rank() && **kind == wanted)
            .map(|(square, _)| *square)
    };
    let Some(king) = on_back_rank(PieceKind::King).next() else {
        return String::new();
    };
    let rooks: Vec<Square> = on_back_rank(PieceKind::Rook).collect();
    let outer = rooks
        .iter()
        .filter(|rook| rook.file() > king.file())
        .max_by_key(|rook| rook.file())
        .into_iter()
        .chain(
            rooks
                .iter()
                .filter(|rook| rook.file() < king.file())
                .min_by_key(|rook| rook.file()),
        );
    outer
        .map(|rook| match color {
            Color::White => rook.file_char().to_ascii_uppercase(),
            Color::Black => rook.file_char(),
        })
        .collect()
}
