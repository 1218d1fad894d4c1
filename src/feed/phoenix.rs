//! Phoenix order-book market account decoding

use borsh::BorshDeserialize;
use solana_sdk::pubkey::Pubkey;

use super::{PoolUpdate, VenueAdapter};
use crate::quote::{BookLevel, Curve};
use crate::shared::errors::FeedError;
use crate::shared::types::Venue;

pub const MARKET_DISCRIMINATOR: [u8; 8] = *b"phnxmkt1";

#[derive(Debug, BorshDeserialize)]
struct RawLevel {
    price_num: u64,
    price_den: u64,
    base_qty: u64,
}

#[derive(Debug, BorshDeserialize)]
struct MarketLayout {
    base_mint: [u8; 32],
    quote_mint: [u8; 32],
    taker_fee_bps: u16,
    bids: Vec<RawLevel>,
    asks: Vec<RawLevel>,
}

pub struct PhoenixAdapter;

impl VenueAdapter for PhoenixAdapter {
    fn venue(&self) -> Venue {
        Venue::Phoenix
    }

    fn decode(&self, address: &Pubkey, data: &[u8]) -> Result<PoolUpdate, FeedError> {
        if data.len() < 8 || data[..8] != MARKET_DISCRIMINATOR {
            return Err(decode_err(address, "bad discriminator".to_string()));
        }
        let mut body = &data[8..];
        let market = MarketLayout::deserialize(&mut body)
            .map_err(|e| decode_err(address, e.to_string()))?;

        let mut bids = normalize_levels(address, market.bids)?;
        let mut asks = normalize_levels(address, market.asks)?;
        // The quote walk expects bids best-first (descending) and asks
        // ascending; the raw book carries no ordering guarantee.
        bids.sort_by(|a, b| cmp_price(b, a));
        asks.sort_by(cmp_price);

        Ok(PoolUpdate {
            address: *address,
            venue: Venue::Phoenix,
            token_a: Pubkey::new_from_array(market.base_mint),
            token_b: Pubkey::new_from_array(market.quote_mint),
            fee_bps: market.taker_fee_bps,
            curve: Curve::OrderBook { bids, asks },
            slot: 0,
        })
    }
}

fn normalize_levels(
    address: &Pubkey,
    raw: Vec<RawLevel>,
) -> Result<Vec<BookLevel>, FeedError> {
    raw.into_iter()
        .map(|l| {
            if l.price_den == 0 {
                return Err(decode_err(address, "zero price denominator".to_string()));
            }
            Ok(BookLevel {
                price_num: l.price_num,
                price_den: l.price_den,
                base_qty: l.base_qty,
            })
        })
        .filter(|l| !matches!(l, Ok(level) if level.base_qty == 0))
        .collect()
}

fn cmp_price(a: &BookLevel, b: &BookLevel) -> std::cmp::Ordering {
    // a.num/a.den vs b.num/b.den without division.
    let lhs = a.price_num as u128 * b.price_den as u128;
    let rhs = b.price_num as u128 * a.price_den as u128;
    lhs.cmp(&rhs)
}

fn decode_err(address: &Pubkey, reason: String) -> FeedError {
    FeedError::Decode {
        venue: "Phoenix",
        address: *address,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsh::BorshSerialize;

    #[derive(BorshSerialize)]
    struct LevelFixture {
        price_num: u64,
        price_den: u64,
        base_qty: u64,
    }

    #[derive(BorshSerialize)]
    struct MarketFixture {
        base_mint: [u8; 32],
        quote_mint: [u8; 32],
        taker_fee_bps: u16,
        bids: Vec<LevelFixture>,
        asks: Vec<LevelFixture>,
    }

    fn market_bytes() -> Vec<u8> {
        let fixture = MarketFixture {
            base_mint: Pubkey::new_unique().to_bytes(),
            quote_mint: Pubkey::new_unique().to_bytes(),
            taker_fee_bps: 5,
            // Deliberately unsorted; the adapter must normalize.
            bids: vec![
                LevelFixture { price_num: 5, price_den: 4, base_qty: 100 },
                LevelFixture { price_num: 3, price_den: 2, base_qty: 200 },
            ],
            asks: vec![
                LevelFixture { price_num: 2, price_den: 1, base_qty: 50 },
                LevelFixture { price_num: 7, price_den: 4, base_qty: 30 },
            ],
        };
        let mut data = MARKET_DISCRIMINATOR.to_vec();
        data.extend(fixture.try_to_vec().unwrap());
        data
    }

    #[test]
    fn decodes_and_sorts_depth() {
        let update = PhoenixAdapter
            .decode(&Pubkey::new_unique(), &market_bytes())
            .unwrap();
        let Curve::OrderBook { bids, asks } = update.curve else {
            panic!("expected order book curve");
        };
        // Best bid first (1.50 before 1.25).
        assert_eq!((bids[0].price_num, bids[0].price_den), (3, 2));
        // Best ask first (1.75 before 2.00).
        assert_eq!((asks[0].price_num, asks[0].price_den), (7, 4));
        assert_eq!(update.fee_bps, 5);
    }

    #[test]
    fn zero_denominator_is_rejected() {
        let fixture = MarketFixture {
            base_mint: Pubkey::new_unique().to_bytes(),
            quote_mint: Pubkey::new_unique().to_bytes(),
            taker_fee_bps: 5,
            bids: vec![LevelFixture { price_num: 1, price_den: 0, base_qty: 10 }],
            asks: vec![],
        };
        let mut data = MARKET_DISCRIMINATOR.to_vec();
        data.extend(fixture.try_to_vec().unwrap());
        assert!(PhoenixAdapter.decode(&Pubkey::new_unique(), &data).is_err());
    }
}
