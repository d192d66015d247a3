use clap::Parser;

/// Fog-of-war Chess960 game server
#[derive(Debug, Clone, Parser)]
#[command(name = "fogchess", version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Seed for the setup generator; random when omitted
    #[arg(long, env = "FOGCHESS_SEED")]
    pub seed: Option<u64>,

    /// Give each side Chess960 castling rights in the initial position
    #[arg(long)]
    pub encode_castling: bool,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            seed: self.seed,
            encode_castling: self.encode_castling,
        }
    }
}

/// Settings consumed by the game service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameConfig {
    pub seed: Option<u64>,
    pub encode_castling: bool,
}
