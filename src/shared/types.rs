//! Common types used across the engine

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Token identity. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenMeta {
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,
}

/// Supported DEX venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    Raydium,
    Meteora,
    Phoenix,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Raydium => "Raydium",
            Venue::Meteora => "Meteora",
            Venue::Phoenix => "Phoenix",
        }
    }

    pub fn program_id(&self) -> &'static str {
        match self {
            Venue::Raydium => "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
            Venue::Meteora => "Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB",
            Venue::Phoenix => "PhoeNiXZ8ByJGLkxNfZRnkUfjvmuYqLR89jjFHGqdXY",
        }
    }

    pub fn program(&self) -> Pubkey {
        Pubkey::from_str(self.program_id()).expect("static venue program id")
    }

    pub fn from_program_id(program_id: &Pubkey) -> Option<Self> {
        [Venue::Raydium, Venue::Meteora, Venue::Phoenix]
            .into_iter()
            .find(|v| {
                Pubkey::from_str(v.program_id())
                    .map(|p| p == *program_id)
                    .unwrap_or(false)
            })
    }

    /// Wire tag used by the on-chain swap agent program.
    pub fn wire_tag(&self) -> u8 {
        match self {
            Venue::Raydium => 0,
            Venue::Meteora => 1,
            Venue::Phoenix => 2,
        }
    }
}

impl FromStr for Venue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raydium" | "raydium_v4" => Ok(Venue::Raydium),
            "meteora" => Ok(Venue::Meteora),
            "phoenix" => Ok(Venue::Phoenix),
            _ => Err(anyhow::anyhow!("Unknown venue: {}", s)),
        }
    }
}

/// Swap direction through a two-sided pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    AtoB,
    BtoA,
}

impl Direction {
    pub fn reverse(&self) -> Self {
        match self {
            Direction::AtoB => Direction::BtoA,
            Direction::BtoA => Direction::AtoB,
        }
    }
}

/// Monotonic version counter of the liquidity graph.
pub type GraphVersion = u64;

pub const BPS_DENOMINATOR: u64 = 10_000;
