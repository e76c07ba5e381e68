// Fee growth accounting
//
// Accumulators are Q128.128 per unit of liquidity and wrap modulo 2^256, so
// every subtraction here is a wrapping one.

use ethers::types::U256;
use num_bigint::BigInt;

use crate::error::Result;
use crate::math::fixed_point::{from_big, to_big};

#[inline]
fn wrapping_sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}

/// Fee growth per unit of liquidity earned inside `[lower_tick, upper_tick)`.
pub fn fee_growth_inside(
    lower_tick: i32,
    upper_tick: i32,
    current_tick: i32,
    fee_growth_global: U256,
    lower_outside: U256,
    upper_outside: U256,
) -> U256 {
    let below = if current_tick >= lower_tick {
        lower_outside
    } else {
        wrapping_sub(fee_growth_global, lower_outside)
    };
    let above = if current_tick < upper_tick {
        upper_outside
    } else {
        wrapping_sub(fee_growth_global, upper_outside)
    };
    wrapping_sub(wrapping_sub(fee_growth_global, below), above)
}

/// Tokens owed for `liquidity` since the checkpoint: `L * (inside - last) / 2^128`.
pub fn fees_owed(liquidity: u128, inside: U256, inside_last: U256) -> Result<U256> {
    let delta = to_big(wrapping_sub(inside, inside_last));
    from_big(&((delta * BigInt::from(liquidity)) >> 128))
}

/// `amount / liquidity` as Q128.128 fee growth.
pub fn growth_for_fee(amount: U256, liquidity: u128) -> Result<U256> {
    if liquidity == 0 {
        return Ok(U256::zero());
    }
    // wraps like the on-chain accumulator
    let growth = (to_big(amount) << 128) / BigInt::from(liquidity);
    let modulus = BigInt::from(1u8) << 256;
    from_big(&(growth % modulus))
}
