use clap::Parser;
use fogchess::setup::{derive_position_notation, derive_position_notation_960, SetupGenerator};
use fogchess::{Color, PieceKind, RuleEngine, ShakmatyEngine, Square};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

/// Print randomized starting setups and their position notation
#[derive(Debug, Parser)]
#[command(name = "deal", version, about)]
struct Args {
    /// Number of setups to deal
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// RNG seed; random when omitted
    #[arg(short, long)]
    seed: Option<u64>,

    /// Include Chess960 castling rights
    #[arg(long)]
    encode_castling: bool,
}

fn back_rank_letters(pieces: &fogchess::PieceMap, color: Color) -> String {
    (0..8u8)
        .filter_map(|file| Square::new(file, color.back_rank()))
        .map(|square| pieces.get(&square).map_or('.', |kind: &PieceKind| kind.letter()))
        .collect()
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let rng = match args.seed {
        Some(seed) => XorShiftRng::seed_from_u64(seed),
        None => XorShiftRng::from_entropy(),
    };
    let mut setup = SetupGenerator::new(rng);
    let engine = ShakmatyEngine::new();

    for deal in 0..args.count {
        let white = setup.setup_side(Color::White);
        let black = setup.setup_side(Color::Black);
        let notation = if args.encode_castling {
            derive_position_notation_960(&white, &black)
        } else {
            derive_position_notation(&white, &black)
        };

        println!("Deal {}", deal + 1);
        println!("  white: {}", back_rank_letters(&white, Color::White));
        println!("  black: {}", back_rank_letters(&black, Color::Black));
        println!("  notation: {}", notation);
        if let Err(e) = engine.load(&notation) {
            log::error!("Deal {} does not load: {}", deal + 1, e);
        }
    }
}
