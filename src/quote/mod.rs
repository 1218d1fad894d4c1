//! Quote engine: exact integer pricing per curve type
//!
//! All amounts are integers in the token's native smallest unit and all
//! rounding matches the on-chain programs: fees round up against the taker,
//! outputs round down. Floating point never feeds a profit decision; the
//! path finder may use float rates for ranking only.

mod constant_product;
mod order_book;
mod stable_swap;

pub use order_book::BookLevel;

use serde::{Deserialize, Serialize};

use crate::shared::errors::QuoteError;
use crate::shared::types::{Direction, BPS_DENOMINATOR};

/// Pricing state of a pool, one variant per curve type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    ConstantProduct {
        reserve_a: u64,
        reserve_b: u64,
    },
    StableSwap {
        reserve_a: u64,
        reserve_b: u64,
        amp: u64,
    },
    /// Visible depth of an order-book venue. `bids` are sorted by price
    /// descending, `asks` ascending; prices quote token B per token A.
    OrderBook {
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    },
}

/// Exact swap quote for one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_in: u64,
    pub fee_amount: u64,
    pub amount_out: u64,
    pub price_impact_bps: u32,
}

/// Quote a swap of `amount_in` through `curve` in `dir`, with `fee_bps`
/// deducted from the input before the curve is applied.
pub fn quote(
    curve: &Curve,
    dir: Direction,
    fee_bps: u16,
    amount_in: u64,
) -> Result<Quote, QuoteError> {
    if amount_in == 0 {
        return Err(QuoteError::ZeroInput);
    }
    let (after_fee, fee_amount) = take_fee(amount_in, fee_bps);
    if after_fee == 0 {
        return Err(QuoteError::ZeroInput);
    }

    let (amount_out, spot_num, spot_den) = match curve {
        Curve::ConstantProduct {
            reserve_a,
            reserve_b,
        } => {
            let (r_in, r_out) = match dir {
                Direction::AtoB => (*reserve_a, *reserve_b),
                Direction::BtoA => (*reserve_b, *reserve_a),
            };
            let out = constant_product::swap_output(after_fee, r_in, r_out)?;
            (out, r_out as u128, r_in as u128)
        }
        Curve::StableSwap {
            reserve_a,
            reserve_b,
            amp,
        } => {
            let (r_in, r_out) = match dir {
                Direction::AtoB => (*reserve_a, *reserve_b),
                Direction::BtoA => (*reserve_b, *reserve_a),
            };
            let out = stable_swap::swap_output(after_fee, r_in, r_out, *amp)?;
            // Near-spot reference from a small probe trade; exact enough
            // for an impact figure, and still pure integer math.
            let probe = (after_fee / 1_000).max(1).min(after_fee);
            let probe_out = stable_swap::swap_output(probe, r_in, r_out, *amp)?;
            (out, probe_out as u128, probe as u128)
        }
        Curve::OrderBook { bids, asks } => {
            let (out, best) = match dir {
                Direction::AtoB => order_book::sell_base(after_fee, bids)?,
                Direction::BtoA => order_book::buy_base(after_fee, asks)?,
            };
            (out, best.0, best.1)
        }
    };

    Ok(Quote {
        amount_in,
        fee_amount,
        amount_out,
        price_impact_bps: impact_bps(after_fee, amount_out, spot_num, spot_den),
    })
}

/// Fee rounds up against the taker, matching the on-chain programs.
fn take_fee(amount_in: u64, fee_bps: u16) -> (u64, u64) {
    let fee = ((amount_in as u128 * fee_bps as u128 + (BPS_DENOMINATOR as u128 - 1))
        / BPS_DENOMINATOR as u128) as u64;
    (amount_in.saturating_sub(fee), fee)
}

/// Deviation of the execution price from the spot price, in basis points.
/// Spot price is `spot_num / spot_den` output units per input unit.
fn impact_bps(amount_in: u64, amount_out: u64, spot_num: u128, spot_den: u128) -> u32 {
    if amount_in == 0 || spot_num == 0 || spot_den == 0 {
        return 0;
    }
    // executed/spot ratio in bps, then distance from par.
    let executed = amount_out as u128 * spot_den * BPS_DENOMINATOR as u128;
    let spot = amount_in as u128 * spot_num;
    if spot == 0 {
        return 0;
    }
    let ratio = (executed / spot) as u64;
    BPS_DENOMINATOR.saturating_sub(ratio).min(BPS_DENOMINATOR) as u32
}

/// Coarse spot rate as a float, for path ranking only.
pub fn spot_rate(curve: &Curve, dir: Direction, fee_bps: u16) -> f64 {
    let fee_mult = 1.0 - fee_bps as f64 / BPS_DENOMINATOR as f64;
    let raw = match curve {
        Curve::ConstantProduct {
            reserve_a,
            reserve_b,
        }
        | Curve::StableSwap {
            reserve_a,
            reserve_b,
            ..
        } => {
            let (r_in, r_out) = match dir {
                Direction::AtoB => (*reserve_a, *reserve_b),
                Direction::BtoA => (*reserve_b, *reserve_a),
            };
            if r_in == 0 {
                return 0.0;
            }
            r_out as f64 / r_in as f64
        }
        Curve::OrderBook { bids, asks } => match dir {
            Direction::AtoB => bids
                .first()
                .map(|l| l.price_num as f64 / l.price_den as f64)
                .unwrap_or(0.0),
            Direction::BtoA => asks
                .first()
                .map(|l| l.price_den as f64 / l.price_num as f64)
                .unwrap_or(0.0),
        },
    };
    raw * fee_mult
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rounds_up_against_taker() {
        // 0.3% of 1000 is exactly 3
        assert_eq!(take_fee(1_000, 30), (997, 3));
        // 0.3% of 1001 is 3.003, fee must round to 4
        assert_eq!(take_fee(1_001, 30), (997, 4));
        assert_eq!(take_fee(100, 0), (100, 0));
    }

    #[test]
    fn zero_input_is_rejected() {
        let curve = Curve::ConstantProduct {
            reserve_a: 1_000,
            reserve_b: 1_000,
        };
        assert_eq!(
            quote(&curve, Direction::AtoB, 30, 0),
            Err(QuoteError::ZeroInput)
        );
    }

    #[test]
    fn impact_grows_with_trade_size() {
        let curve = Curve::ConstantProduct {
            reserve_a: 1_000_000_000,
            reserve_b: 1_000_000_000,
        };
        let small = quote(&curve, Direction::AtoB, 30, 1_000_000).unwrap();
        let large = quote(&curve, Direction::AtoB, 30, 100_000_000).unwrap();
        assert!(large.price_impact_bps > small.price_impact_bps);
    }
}
