//! Order-book pricing: walks visible depth level by level

use serde::{Deserialize, Serialize};

use crate::shared::errors::QuoteError;

/// One resting price level. `price_num / price_den` is the price of one
/// base unit in quote units; `base_qty` is the resting base-side size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price_num: u64,
    pub price_den: u64,
    pub base_qty: u64,
}

impl BookLevel {
    /// Quote units required to lift the whole level, rounded up.
    fn quote_cost(&self) -> Result<u128, QuoteError> {
        let num = self.base_qty as u128 * self.price_num as u128;
        Ok((num + self.price_den as u128 - 1) / self.price_den as u128)
    }
}

/// Sell `amount_in` base units into the bid side. Returns the quote-side
/// payout (floor per level) and the best-level price as (num, den).
pub fn sell_base(
    amount_in: u64,
    bids: &[BookLevel],
) -> Result<(u64, (u128, u128)), QuoteError> {
    let best = bids.first().ok_or(QuoteError::NoDepth)?;
    let spot = (best.price_num as u128, best.price_den as u128);

    let mut remaining = amount_in as u128;
    let mut out: u128 = 0;
    for level in bids {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(level.base_qty as u128);
        out += take * level.price_num as u128 / level.price_den as u128;
        remaining -= take;
    }
    if remaining > 0 {
        return Err(QuoteError::InsufficientDepth);
    }
    let out = u64::try_from(out).map_err(|_| QuoteError::Overflow)?;
    Ok((out, spot))
}

/// Spend `amount_in` quote units against the ask side buying base. Returns
/// the base-side payout and the best-level price as (num, den), inverted so
/// the spot is output units per input unit.
pub fn buy_base(
    amount_in: u64,
    asks: &[BookLevel],
) -> Result<(u64, (u128, u128)), QuoteError> {
    let best = asks.first().ok_or(QuoteError::NoDepth)?;
    let spot = (best.price_den as u128, best.price_num as u128);

    let mut remaining = amount_in as u128;
    let mut out: u128 = 0;
    for level in asks {
        if remaining == 0 {
            break;
        }
        let full_cost = level.quote_cost()?;
        if remaining >= full_cost {
            out += level.base_qty as u128;
            remaining -= full_cost;
        } else {
            // Partial fill: base received rounds down.
            out += remaining * level.price_den as u128 / level.price_num as u128;
            remaining = 0;
        }
    }
    if remaining > 0 {
        return Err(QuoteError::InsufficientDepth);
    }
    let out = u64::try_from(out).map_err(|_| QuoteError::Overflow)?;
    Ok((out, spot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price_num: u64, price_den: u64, base_qty: u64) -> BookLevel {
        BookLevel {
            price_num,
            price_den,
            base_qty,
        }
    }

    #[test]
    fn sell_walks_bids_in_order() {
        // Best bid 1.50, next 1.25. Selling 300 base: 200 @ 1.50 + 100 @ 1.25.
        let bids = vec![level(3, 2, 200), level(5, 4, 500)];
        let (out, spot) = sell_base(300, &bids).unwrap();
        assert_eq!(out, 300 + 125);
        assert_eq!(spot, (3, 2));
    }

    #[test]
    fn sell_rejects_when_depth_exhausted() {
        let bids = vec![level(1, 1, 100)];
        assert_eq!(sell_base(101, &bids), Err(QuoteError::InsufficientDepth));
    }

    #[test]
    fn buy_consumes_full_levels_then_partial() {
        // Ask 2.0 for 100 base (costs 200 quote), then 4.0 for 100 base.
        let asks = vec![level(2, 1, 100), level(4, 1, 100)];
        // 200 quote lifts level one exactly.
        let (out, _) = buy_base(200, &asks).unwrap();
        assert_eq!(out, 100);
        // 300 quote: level one plus 100/4 = 25 base of level two.
        let (out, _) = buy_base(300, &asks).unwrap();
        assert_eq!(out, 125);
    }

    #[test]
    fn buy_partial_fill_rounds_down() {
        // Price 3 quote per base; 10 quote buys 3.33 base -> 3.
        let asks = vec![level(3, 1, 100)];
        let (out, _) = buy_base(10, &asks).unwrap();
        assert_eq!(out, 3);
    }

    #[test]
    fn payout_beyond_u64_is_overflow() {
        // Two base at a price of u64::MAX quote per base.
        let bids = vec![level(u64::MAX, 1, 2)];
        assert_eq!(sell_base(2, &bids), Err(QuoteError::Overflow));
    }

    #[test]
    fn empty_book_is_rejected() {
        assert_eq!(sell_base(10, &[]), Err(QuoteError::NoDepth));
        assert_eq!(buy_base(10, &[]), Err(QuoteError::NoDepth));
    }
}
