//! Raydium constant-product AMM account decoding

use bytemuck::{Pod, Zeroable};
use solana_sdk::pubkey::Pubkey;

use super::{PoolUpdate, VenueAdapter};
use crate::quote::Curve;
use crate::shared::errors::FeedError;
use crate::shared::types::{Venue, BPS_DENOMINATOR};

/// Swap-enabled status in the AMM state account.
const STATUS_SWAP_ENABLED: u64 = 6;

/// On-chain AMM state layout, little-endian. Reserve fields reflect the
/// vault balances as of the account's last write, so one account read is
/// one consistent pool state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RaydiumPoolLayout {
    pub status: u64,
    pub nonce: u64,
    pub coin_decimals: u64,
    pub pc_decimals: u64,
    pub fee_numerator: u64,
    pub fee_denominator: u64,
    pub coin_reserve: u64,
    pub pc_reserve: u64,
    pub coin_mint: [u8; 32],
    pub pc_mint: [u8; 32],
}

pub const POOL_STATE_LEN: usize = std::mem::size_of::<RaydiumPoolLayout>();

pub struct RaydiumAdapter;

impl VenueAdapter for RaydiumAdapter {
    fn venue(&self) -> Venue {
        Venue::Raydium
    }

    fn decode(&self, address: &Pubkey, data: &[u8]) -> Result<PoolUpdate, FeedError> {
        if data.len() < POOL_STATE_LEN {
            return Err(decode_err(address, format!("account too short: {}", data.len())));
        }
        let state: RaydiumPoolLayout = bytemuck::pod_read_unaligned(&data[..POOL_STATE_LEN]);

        if state.status != STATUS_SWAP_ENABLED {
            return Err(decode_err(address, format!("pool disabled, status {}", state.status)));
        }
        if state.fee_denominator == 0 {
            return Err(decode_err(address, "zero fee denominator".to_string()));
        }
        let fee_bps = (state.fee_numerator as u128 * BPS_DENOMINATOR as u128
            / state.fee_denominator as u128) as u16;

        Ok(PoolUpdate {
            address: *address,
            venue: Venue::Raydium,
            token_a: Pubkey::new_from_array(state.coin_mint),
            token_b: Pubkey::new_from_array(state.pc_mint),
            fee_bps,
            curve: Curve::ConstantProduct {
                reserve_a: state.coin_reserve,
                reserve_b: state.pc_reserve,
            },
            slot: 0,
        })
    }
}

fn decode_err(address: &Pubkey, reason: String) -> FeedError {
    FeedError::Decode {
        venue: "Raydium",
        address: *address,
        reason,
    }
}

#[cfg(test)]
pub(crate) fn encode_pool_state(layout: &RaydiumPoolLayout) -> Vec<u8> {
    bytemuck::bytes_of(layout).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(status: u64) -> RaydiumPoolLayout {
        RaydiumPoolLayout {
            status,
            nonce: 255,
            coin_decimals: 9,
            pc_decimals: 6,
            fee_numerator: 25,
            fee_denominator: 10_000,
            coin_reserve: 1_000_000_000,
            pc_reserve: 150_000_000_000,
            coin_mint: Pubkey::new_unique().to_bytes(),
            pc_mint: Pubkey::new_unique().to_bytes(),
        }
    }

    #[test]
    fn decodes_enabled_pool() {
        let state = layout(STATUS_SWAP_ENABLED);
        let data = encode_pool_state(&state);
        let update = RaydiumAdapter
            .decode(&Pubkey::new_unique(), &data)
            .unwrap();
        assert_eq!(update.fee_bps, 25);
        assert_eq!(update.token_a, Pubkey::new_from_array(state.coin_mint));
        assert_eq!(
            update.curve,
            Curve::ConstantProduct {
                reserve_a: 1_000_000_000,
                reserve_b: 150_000_000_000,
            }
        );
    }

    #[test]
    fn disabled_pool_is_rejected() {
        let data = encode_pool_state(&layout(1));
        let err = RaydiumAdapter
            .decode(&Pubkey::new_unique(), &data)
            .unwrap_err();
        assert!(matches!(err, FeedError::Decode { venue: "Raydium", .. }));
    }

    #[test]
    fn short_account_is_rejected() {
        let err = RaydiumAdapter
            .decode(&Pubkey::new_unique(), &[0u8; 16])
            .unwrap_err();
        assert!(matches!(err, FeedError::Decode { .. }));
    }
}
