//! Constant-product (`x * y = k`) swap math

use crate::shared::errors::QuoteError;

/// Output for a fee-adjusted input against the invariant, floor division.
/// `dy = y * dx / (x + dx)`.
pub fn swap_output(amount_in: u64, reserve_in: u64, reserve_out: u64) -> Result<u64, QuoteError> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(QuoteError::EmptyReserves);
    }
    let dx = amount_in as u128;
    let x = reserve_in as u128;
    let y = reserve_out as u128;
    let out = y
        .checked_mul(dx)
        .ok_or(QuoteError::Overflow)?
        .checked_div(x + dx)
        .ok_or(QuoteError::Overflow)?;
    // A swap can never drain the opposite reserve.
    if out >= y {
        return Err(QuoteError::EmptyReserves);
    }
    Ok(out as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_matches_invariant_hand_calc() {
        // fee applied by the caller: in=9_970_000 against (1e9, 1e9)
        // out = 1e9 * 9_970_000 / 1_009_970_000 = 9_871_580.54.. -> floor
        let out = swap_output(9_970_000, 1_000_000_000, 1_000_000_000).unwrap();
        assert_eq!(out, 9_871_580);
    }

    #[test]
    fn rounding_is_floor_never_up() {
        // 3 * 7 / (10 + 7) = 1.23.. -> 1
        assert_eq!(swap_output(7, 10, 3).unwrap(), 1);
    }

    #[test]
    fn invariant_never_decreases() {
        let (x, y) = (1_000_000u64, 2_500_000u64);
        let dx = 13_337u64;
        let dy = swap_output(dx, x, y).unwrap();
        let k_before = x as u128 * y as u128;
        let k_after = (x + dx) as u128 * (y - dy) as u128;
        assert!(k_after >= k_before);
    }

    #[test]
    fn empty_reserves_rejected() {
        assert_eq!(swap_output(10, 0, 100), Err(QuoteError::EmptyReserves));
        assert_eq!(swap_output(10, 100, 0), Err(QuoteError::EmptyReserves));
    }
}
