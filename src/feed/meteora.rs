//! Meteora stable-swap pool account decoding

use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;

use super::{PoolUpdate, VenueAdapter};
use crate::quote::Curve;
use crate::shared::errors::FeedError;
use crate::shared::types::Venue;

/// Account discriminator preceding the borsh-encoded pool state.
pub const STABLE_POOL_DISCRIMINATOR: [u8; 8] = *b"stblpool";

#[derive(Debug, BorshDeserialize)]
struct StablePoolLayout {
    token_a_mint: [u8; 32],
    token_b_mint: [u8; 32],
    reserve_a: u64,
    reserve_b: u64,
    amp: u64,
    fee_bps: u16,
    enabled: u8,
}

pub struct MeteoraAdapter;

impl VenueAdapter for MeteoraAdapter {
    fn venue(&self) -> Venue {
        Venue::Meteora
    }

    fn decode(&self, address: &Pubkey, data: &[u8]) -> Result<PoolUpdate, FeedError> {
        if data.len() < 8 || data[..8] != STABLE_POOL_DISCRIMINATOR {
            return Err(decode_err(address, "bad discriminator".to_string()));
        }
        let mut body = &data[8..];
        let state = StablePoolLayout::deserialize(&mut body)
            .map_err(|e| decode_err(address, e.to_string()))?;

        if state.enabled != 1 {
            return Err(decode_err(address, "pool disabled".to_string()));
        }
        if state.amp == 0 {
            return Err(decode_err(address, "zero amplification".to_string()));
        }

        Ok(PoolUpdate {
            address: *address,
            venue: Venue::Meteora,
            token_a: Pubkey::new_from_array(state.token_a_mint),
            token_b: Pubkey::new_from_array(state.token_b_mint),
            fee_bps: state.fee_bps,
            curve: Curve::StableSwap {
                reserve_a: state.reserve_a,
                reserve_b: state.reserve_b,
                amp: state.amp,
            },
            slot: 0,
        })
    }
}

fn decode_err(address: &Pubkey, reason: String) -> FeedError {
    FeedError::Decode {
        venue: "Meteora",
        address: *address,
        reason,
    }
}
