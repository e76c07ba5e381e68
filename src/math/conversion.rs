//! Price <-> tick conversion on the base-1.0001 logarithmic grid.
//!
//! Prices are unsigned fixed-point integers carrying `decimals` digits of
//! precision, quoted as token1 per token0. Ticks returned by these helpers are
//! always multiples of the requested tick spacing.

use ethers::types::U256;
use num_bigint::BigInt;

use crate::error::{EngineError, Result};
use crate::math::fixed_point::{from_big, log2_wad, pow10, to_big};
use crate::math::tick_math::{sqrt_ratio_at_tick_big, MAX_TICK, MIN_TICK};

pub const MIN_DECIMALS: u8 = 6;
pub const MAX_DECIMALS: u8 = 18;

/// log2(1.0001) as WAD.
pub const LOG2_1_0001_WAD: i128 = 144_262_291_094_554;

/// Precision used for every price the engine stores.
pub const PRICE_DECIMALS: u8 = 18;

#[inline]
fn check_decimals(decimals: u8) -> Result<()> {
    if !(MIN_DECIMALS..=MAX_DECIMALS).contains(&decimals) {
        return Err(EngineError::InvalidDecimals(decimals));
    }
    Ok(())
}

#[inline]
fn check_spacing(tick_spacing: i32) -> Result<()> {
    if tick_spacing <= 0 {
        return Err(EngineError::InvalidTickSpacing(tick_spacing));
    }
    Ok(())
}

/// Signed division rounding to nearest, ties away from zero. `den` must be positive.
pub fn div_round_half_away(num: i128, den: i128) -> i128 {
    let q = (2 * num.abs() + den) / (2 * den);
    if num < 0 {
        -q
    } else {
        q
    }
}

/// Nearest grid tick to `price`.
///
/// The price is lifted to 18-decimal fixed point, its base-2 logarithm taken
/// (`log2(price) - log2(1e18)` in raw integer terms), divided by
/// `log2(1.0001) * tick_spacing` and rounded to nearest with ties away from
/// zero. The rounded quotient is scaled back by the spacing.
pub fn price_to_tick(price: U256, tick_spacing: i32, decimals: u8) -> Result<i32> {
    check_decimals(decimals)?;
    check_spacing(tick_spacing)?;
    if price.is_zero() {
        return Err(EngineError::InvalidPrice);
    }
    let scaled = price
        .checked_mul(pow10((MAX_DECIMALS - decimals) as u32))
        .ok_or(EngineError::MathOverflow("price normalization"))?;

    let log_price = log2_wad(scaled)?;
    let steps = div_round_half_away(log_price, LOG2_1_0001_WAD * tick_spacing as i128);

    let tick = steps
        .checked_mul(tick_spacing as i128)
        .filter(|t| (MIN_TICK as i128..=MAX_TICK as i128).contains(t))
        .ok_or(EngineError::InvalidPrice)?;
    Ok(tick as i32)
}

/// `1.0001^tick` with `decimals` digits of precision.
pub fn tick_to_price(tick: i32, decimals: u8) -> Result<U256> {
    check_decimals(decimals)?;
    let sqrt = sqrt_ratio_at_tick_big(tick)?;
    sqrt_price_to_price_big(&sqrt, decimals)
}

/// Spot price from a Q64.96 square-root price.
pub fn sqrt_price_to_price(sqrt_price_x96: U256, decimals: u8) -> Result<U256> {
    check_decimals(decimals)?;
    sqrt_price_to_price_big(&to_big(sqrt_price_x96), decimals)
}

fn sqrt_price_to_price_big(sqrt: &BigInt, decimals: u8) -> Result<U256> {
    let scale = BigInt::from(10u64).pow(decimals as u32);
    from_big(&((sqrt * sqrt * scale) >> 192))
}

/// Lower bound at the nearest grid tick and the next grid point strictly above it.
pub fn compute_single_tick(price: U256, tick_spacing: i32, decimals: u8) -> Result<(i32, i32)> {
    let lower = price_to_tick(price, tick_spacing, decimals)?;
    let upper = (lower / tick_spacing + 1) * tick_spacing;
    if upper > MAX_TICK {
        return Err(EngineError::InvalidTick(upper));
    }
    Ok((lower, upper))
}

/// First grid tick strictly above `tick`.
pub fn next_grid_tick_above(tick: i32, tick_spacing: i32) -> Result<i32> {
    check_spacing(tick_spacing)?;
    let next = (tick.div_euclid(tick_spacing) + 1) * tick_spacing;
    if next > MAX_TICK {
        return Err(EngineError::InvalidTick(next));
    }
    Ok(next)
}

pub fn compute_range_ticks(
    price_lower: U256,
    price_upper: U256,
    tick_spacing: i32,
    decimals: u8,
) -> Result<(i32, i32)> {
    let lower = price_to_tick(price_lower, tick_spacing, decimals)?;
    let upper = price_to_tick(price_upper, tick_spacing, decimals)?;
    Ok((lower, upper))
}

/// One as a price with `decimals` precision.
pub fn unit_price(decimals: u8) -> Result<U256> {
    check_decimals(decimals)?;
    Ok(pow10(decimals as u32))
}
