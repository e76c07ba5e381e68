// Exact Q64.96 square-root price at a tick and its inverse.
// ---------------------------------------------------------
// BigInt end-to-end with the canonical TickMath constants, so results match the
// pool's own fixed-width arithmetic bit for bit.

use ethers::types::U256;
use num_bigint::BigInt;
use num_traits::One;

use crate::error::{EngineError, Result};
use crate::math::fixed_point::{from_big, to_big};

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// Q64.96 unit.
pub fn q96() -> BigInt {
    BigInt::one() << 96
}

fn constant(hex: &str) -> BigInt {
    // constants below are well-formed hex literals
    BigInt::parse_bytes(hex.as_bytes(), 16).unwrap_or_default()
}

/// TickMath.getSqrtRatioAtTick, BigInt form.
pub fn sqrt_ratio_at_tick_big(tick: i32) -> Result<BigInt> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(EngineError::InvalidTick(tick));
    }
    let abs_tick = tick.unsigned_abs();

    // ratio is Q128.128
    let mut ratio = if abs_tick & 0x1 != 0 {
        constant("fffcb933bd6fad37aa2d162d1a594001")
    } else {
        BigInt::one() << 128
    };

    macro_rules! ms {
        ($hex:literal, $bit:expr) => {
            if abs_tick & $bit != 0 {
                ratio = (&ratio * constant($hex)) >> 128;
            }
        };
    }

    ms!("fff97272373d413259a46990580e213a", 0x2);
    ms!("fff2e50f5f656932ef12357cf3c7fdcc", 0x4);
    ms!("ffe5caca7e10e4e61c3624eaa0941cd0", 0x8);
    ms!("ffcb9843d60f6159c9db58835c926644", 0x10);
    ms!("ff973b41fa98c081472e6896dfb254c0", 0x20);
    ms!("ff2ea16466c96a3843ec78b326b52861", 0x40);
    ms!("fe5dee046a99a2a811c461f1969c3053", 0x80);
    ms!("fcbe86c7900a88aedcffc83b479aa3a4", 0x100);
    ms!("f987a7253ac413176f2b074cf7815e54", 0x200);
    ms!("f3392b0822b70005940c7a398e4b70f3", 0x400);
    ms!("e7159475a2c29b7443b29c7fa6e889d9", 0x800);
    ms!("d097f3bdfd2022b8845ad8f792aa5825", 0x1000);
    ms!("a9f746462d870fdf8a65dc1f90e061e5", 0x2000);
    ms!("70d869a156d2a1b890bb3df62baf32f7", 0x4000);
    ms!("31be135f97d08fd981231505542fcfa6", 0x8000);
    ms!("09aa508b5b7a84e1c677de54f3e99bc9", 0x10000);
    ms!("05d6af8dedb81196699c329225ee604", 0x20000);
    ms!("2216e584f5fa1ea926041bedfe98", 0x40000);
    ms!("48a170391f7dc42444e8fa2", 0x80000);

    if tick > 0 {
        let max = (BigInt::one() << 256) - 1;
        ratio = max / ratio;
    }
    // round-up shift by 32 (Q128.128 -> Q64.96)
    Ok((&ratio + ((BigInt::one() << 32) - 1)) >> 32)
}

pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    from_big(&sqrt_ratio_at_tick_big(tick)?)
}

/// Greatest tick whose sqrt ratio is <= the given sqrt price (binary search).
pub fn tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32> {
    let target = to_big(sqrt_price_x96);
    if target < sqrt_ratio_at_tick_big(MIN_TICK)? || target > sqrt_ratio_at_tick_big(MAX_TICK)? {
        return Err(EngineError::InvalidPrice);
    }
    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    while lo < hi {
        let mid = lo + ((hi - lo + 1) / 2);
        if sqrt_ratio_at_tick_big(mid)? <= target {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

pub fn min_sqrt_ratio() -> BigInt {
    sqrt_ratio_at_tick_big(MIN_TICK).unwrap_or_default()
}

pub fn max_sqrt_ratio() -> BigInt {
    sqrt_ratio_at_tick_big(MAX_TICK).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_zero_is_q96() {
        assert_eq!(sqrt_ratio_at_tick_big(0).expect("in range"), q96());
    }

    #[test]
    fn canonical_bounds() {
        assert_eq!(min_sqrt_ratio(), BigInt::from(4_295_128_739u64));
        assert_eq!(
            max_sqrt_ratio(),
            BigInt::parse_bytes(b"1461446703485210103287273052203988822378723970342", 10).expect("literal")
        );
    }

    #[test]
    fn out_of_range_tick_is_rejected() {
        assert_eq!(sqrt_ratio_at_tick(MAX_TICK + 1), Err(EngineError::InvalidTick(MAX_TICK + 1)));
    }

    #[test]
    fn inverse_recovers_grid_ticks() {
        for tick in [-200_040, -887, -60, -1, 0, 1, 60, 46_080, 200_040] {
            let sqrt = sqrt_ratio_at_tick(tick).expect("in range");
            assert_eq!(tick_at_sqrt_ratio(sqrt).expect("in range"), tick);
            assert_eq!(tick_at_sqrt_ratio(sqrt + U256::one()).expect("in range"), tick);
        }
    }

    #[test]
    fn ratios_increase_with_tick() {
        let a = sqrt_ratio_at_tick_big(-60).expect("in range");
        let b = sqrt_ratio_at_tick_big(0).expect("in range");
        let c = sqrt_ratio_at_tick_big(60).expect("in range");
        assert!(a < b && b < c);
    }
}
