//! Venue feed: normalizes per-venue liquidity accounts into pool records

pub mod meteora;
pub mod phoenix;
pub mod poller;
pub mod raydium;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use solana_sdk::account::Account;
use solana_sdk::pubkey::Pubkey;

use crate::graph::Pool;
use crate::quote::Curve;
use crate::shared::errors::FeedError;
use crate::shared::types::Venue;

/// Normalized pool state from one consistent account read.
#[derive(Debug, Clone)]
pub struct PoolUpdate {
    pub address: Pubkey,
    pub venue: Venue,
    pub token_a: Pubkey,
    pub token_b: Pubkey,
    pub fee_bps: u16,
    pub curve: Curve,
    pub slot: u64,
}

impl PoolUpdate {
    pub fn into_pool(self) -> Pool {
        Pool {
            address: self.address,
            venue: self.venue,
            token_a: self.token_a,
            token_b: self.token_b,
            fee_bps: self.fee_bps,
            curve: self.curve,
            slot: self.slot,
            updated_at: Instant::now(),
        }
    }
}

/// Decodes one venue's raw pool account bytes into a `PoolUpdate`.
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;
    fn decode(&self, address: &Pubkey, data: &[u8]) -> Result<PoolUpdate, FeedError>;
}

/// Dispatches account data to the adapter owning that venue program.
pub struct AdapterRegistry {
    adapters: HashMap<Pubkey, Box<dyn VenueAdapter>>,
}

impl AdapterRegistry {
    /// Registry with every enabled venue.
    pub fn new(venues: &[Venue]) -> Self {
        let mut adapters: HashMap<Pubkey, Box<dyn VenueAdapter>> = HashMap::new();
        for venue in venues {
            let adapter: Box<dyn VenueAdapter> = match venue {
                Venue::Raydium => Box::new(raydium::RaydiumAdapter),
                Venue::Meteora => Box::new(meteora::MeteoraAdapter),
                Venue::Phoenix => Box::new(phoenix::PhoenixAdapter),
            };
            let program = Pubkey::from_str(venue.program_id())
                .expect("static venue program id");
            adapters.insert(program, adapter);
        }
        Self { adapters }
    }

    pub fn decode_account(
        &self,
        address: &Pubkey,
        account: &Account,
        slot: u64,
    ) -> Result<PoolUpdate, FeedError> {
        let adapter = self
            .adapters
            .get(&account.owner)
            .ok_or(FeedError::UnknownOwner(account.owner))?;
        let mut update = adapter.decode(address, &account.data)?;
        update.slot = slot;
        Ok(update)
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.adapters.values().map(|a| a.venue()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_owner_is_rejected() {
        let registry = AdapterRegistry::new(&[Venue::Raydium]);
        let account = Account {
            lamports: 1,
            data: vec![0u8; 64],
            owner: Pubkey::new_unique(),
            executable: false,
            rent_epoch: 0,
        };
        let err = registry
            .decode_account(&Pubkey::new_unique(), &account, 1)
            .unwrap_err();
        assert!(matches!(err, FeedError::UnknownOwner(_)));
    }
}
