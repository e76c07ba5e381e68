// Concentrated-liquidity sizing and its inverse
// ---------------------------------------------
// All square-root prices are Q64.96. Intermediates stay in BigInt; rounding
// matches the pool (mint rounds amounts up, burn and quotes round down).

use ethers::types::U256;
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::error::Result;
use crate::math::fixed_point::{from_big, to_big, to_u128};

#[inline]
fn q96() -> BigInt {
    BigInt::one() << 96
}

#[inline]
fn ceil_div(a: &BigInt, b: &BigInt) -> BigInt {
    // assumes a>=0, b>0
    if a.is_zero() {
        return BigInt::zero();
    }
    (a + (b - BigInt::one())) / b
}

#[inline]
fn sorted(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    if a < b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// amount0 = L * (sb - sa) * Q96 / (sb * sa)
///
/// round_up: ceil( ceil( (L << 96) * (sb - sa) / sb ) / sa )
/// else:     floor( floor( (L << 96) * (sb - sa) / sb ) / sa )
pub fn amount0_delta(sqrt_a: &BigInt, sqrt_b: &BigInt, liquidity: &BigInt, round_up: bool) -> BigInt {
    if liquidity.is_zero() {
        return BigInt::zero();
    }
    let (sa, sb) = sorted(sqrt_a, sqrt_b);
    if sa.is_zero() || sa == sb {
        return BigInt::zero();
    }

    let numerator1 = liquidity << 96;
    let numerator2 = &sb - &sa;

    if round_up {
        let t = ceil_div(&(&numerator1 * &numerator2), &sb);
        ceil_div(&t, &sa)
    } else {
        ((&numerator1 * &numerator2) / &sb) / &sa
    }
}

/// amount1 = L * (sb - sa) / Q96
pub fn amount1_delta(sqrt_a: &BigInt, sqrt_b: &BigInt, liquidity: &BigInt, round_up: bool) -> BigInt {
    if liquidity.is_zero() {
        return BigInt::zero();
    }
    let (sa, sb) = sorted(sqrt_a, sqrt_b);
    if sa == sb {
        return BigInt::zero();
    }

    let num = liquidity * (sb - sa);
    if round_up {
        ceil_div(&num, &q96())
    } else {
        num / q96()
    }
}

/// L0 = amount0 * (sa * sb / Q96) / (sb - sa)
pub fn liquidity_for_amount0(sqrt_a: &BigInt, sqrt_b: &BigInt, amount0: &BigInt) -> BigInt {
    let (sa, sb) = sorted(sqrt_a, sqrt_b);
    if sa == sb {
        return BigInt::zero();
    }
    let intermediate = (&sa * &sb) / q96();
    (amount0 * intermediate) / (sb - sa)
}

/// L1 = amount1 * Q96 / (sb - sa)
pub fn liquidity_for_amount1(sqrt_a: &BigInt, sqrt_b: &BigInt, amount1: &BigInt) -> BigInt {
    let (sa, sb) = sorted(sqrt_a, sqrt_b);
    if sa == sb {
        return BigInt::zero();
    }
    (amount1 * q96()) / (sb - sa)
}

/// Largest liquidity the budget can back over `[sqrt_a, sqrt_b]` at the current price.
///
/// Below the range only token0 counts, above it only token1; inside it the
/// scarcer side limits.
pub fn liquidity_for_amounts(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
    amount1: U256,
) -> Result<u128> {
    let (sa, sb) = sorted(&to_big(sqrt_a), &to_big(sqrt_b));
    let sp = to_big(sqrt_price);
    let a0 = to_big(amount0);
    let a1 = to_big(amount1);

    let liquidity = if sp <= sa {
        liquidity_for_amount0(&sa, &sb, &a0)
    } else if sp < sb {
        let l0 = liquidity_for_amount0(&sp, &sb, &a0);
        let l1 = liquidity_for_amount1(&sa, &sp, &a1);
        if l0 < l1 {
            l0
        } else {
            l1
        }
    } else {
        liquidity_for_amount1(&sa, &sb, &a1)
    };
    to_u128(&liquidity)
}

/// Token amounts backing `liquidity` at the current price, rounded down.
pub fn amounts_for_liquidity(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
) -> Result<(U256, U256)> {
    amounts_for_liquidity_rounding(sqrt_price, sqrt_a, sqrt_b, liquidity, false)
}

/// Same split as [`amounts_for_liquidity`] with explicit rounding direction.
pub fn amounts_for_liquidity_rounding(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<(U256, U256)> {
    let (sa, sb) = sorted(&to_big(sqrt_a), &to_big(sqrt_b));
    let sp = to_big(sqrt_price);
    let l = BigInt::from(liquidity);

    let (amount0, amount1) = if sp <= sa {
        (amount0_delta(&sa, &sb, &l, round_up), BigInt::zero())
    } else if sp < sb {
        (
            amount0_delta(&sp, &sb, &l, round_up),
            amount1_delta(&sa, &sp, &l, round_up),
        )
    } else {
        (BigInt::zero(), amount1_delta(&sa, &sb, &l, round_up))
    };
    Ok((from_big(&amount0)?, from_big(&amount1)?))
}

/// Token0 needed to fill `liquidity` across the whole range (price at or below `sqrt_a`).
pub fn amount0_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256> {
    from_big(&amount0_delta(&to_big(sqrt_a), &to_big(sqrt_b), &BigInt::from(liquidity), false))
}

/// Token1 needed to fill `liquidity` across the whole range (price at or above `sqrt_b`).
pub fn amount1_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256> {
    from_big(&amount1_delta(&to_big(sqrt_a), &to_big(sqrt_b), &BigInt::from(liquidity), false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick_math::sqrt_ratio_at_tick;

    fn sqrt(tick: i32) -> U256 {
        sqrt_ratio_at_tick(tick).expect("in range")
    }

    fn tokens(n: u64) -> U256 {
        U256::exp10(18) * n
    }

    #[test]
    fn below_range_uses_only_token0() {
        let l = liquidity_for_amounts(sqrt(-120), sqrt(0), sqrt(600), tokens(100), tokens(100)).expect("fits");
        assert!(l > 0);
        let (a0, a1) = amounts_for_liquidity(sqrt(-120), sqrt(0), sqrt(600), l).expect("fits");
        assert!(a0 <= tokens(100));
        assert!(tokens(100) - a0 < U256::from(1_000_000u64));
        assert!(a1.is_zero());
    }

    #[test]
    fn above_range_uses_only_token1() {
        let l = liquidity_for_amounts(sqrt(900), sqrt(0), sqrt(600), U256::zero(), tokens(50)).expect("fits");
        let (a0, a1) = amounts_for_liquidity(sqrt(900), sqrt(0), sqrt(600), l).expect("fits");
        assert!(a0.is_zero());
        assert!(a1 <= tokens(50) && tokens(50) - a1 < U256::from(1_000_000u64));
    }

    #[test]
    fn straddling_range_is_limited_by_scarcer_side() {
        let plenty = tokens(1_000_000);
        let l_token1_limited = liquidity_for_amounts(sqrt(0), sqrt(-600), sqrt(600), plenty, tokens(10)).expect("fits");
        let l_token0_limited = liquidity_for_amounts(sqrt(0), sqrt(-600), sqrt(600), tokens(10), plenty).expect("fits");
        let (a0, a1) = amounts_for_liquidity(sqrt(0), sqrt(-600), sqrt(600), l_token1_limited).expect("fits");
        assert!(a1 <= tokens(10));
        assert!(a0 < plenty);
        let (b0, _) = amounts_for_liquidity(sqrt(0), sqrt(-600), sqrt(600), l_token0_limited).expect("fits");
        assert!(b0 <= tokens(10));
    }

    #[test]
    fn empty_budget_gives_zero_liquidity() {
        let l = liquidity_for_amounts(sqrt(0), sqrt(60), sqrt(120), U256::zero(), tokens(5)).expect("fits");
        assert_eq!(l, 0);
    }

    #[test]
    fn round_up_never_below_round_down() {
        let sa = BigInt::from(sqrt(-60).as_u128());
        let sb = BigInt::from(sqrt(60).as_u128());
        let l = BigInt::from(123_456_789_012_345u128);
        assert!(amount0_delta(&sa, &sb, &l, true) >= amount0_delta(&sa, &sb, &l, false));
        assert!(amount1_delta(&sa, &sb, &l, true) >= amount1_delta(&sa, &sb, &l, false));
        assert!(amount1_delta(&sa, &sb, &l, true) - amount1_delta(&sa, &sb, &l, false) <= BigInt::one());
    }

    #[test]
    fn minted_amounts_fit_the_budget_that_sized_them() {
        let budget0 = tokens(7) + U256::from(3u8);
        let budget1 = tokens(3) + U256::from(11u8);
        let l = liquidity_for_amounts(sqrt(30), sqrt(-540), sqrt(600), budget0, budget1).expect("fits");
        let (a0, a1) = amounts_for_liquidity_rounding(sqrt(30), sqrt(-540), sqrt(600), l, true).expect("fits");
        assert!(a0 <= budget0);
        assert!(a1 <= budget1);
    }

    #[test]
    fn whole_range_amounts_match_directional_helpers() {
        let l = 5_000_000_000_000_000_000u128;
        let (a0, _) = amounts_for_liquidity(sqrt(-600), sqrt(-600), sqrt(600), l).expect("fits");
        assert_eq!(a0, amount0_for_liquidity(sqrt(-600), sqrt(600), l).expect("fits"));
        let (_, a1) = amounts_for_liquidity(sqrt(600), sqrt(-600), sqrt(600), l).expect("fits");
        assert_eq!(a1, amount1_for_liquidity(sqrt(-600), sqrt(600), l).expect("fits"));
    }
}
