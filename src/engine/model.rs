use ethers::types::{Address, U256};

use crate::chain::pool::Pool;
use crate::chain::vault_host::VaultHost;
use crate::engine::underlying::{fees_earned, underlying_balances};
use crate::error::{EngineError, Result};
use crate::math::conversion::{sqrt_price_to_price, tick_to_price, PRICE_DECIMALS};
use crate::math::fixed_point::div_wad;
use crate::math::liquidity_amounts::amount0_for_liquidity;
use crate::math::tick_math::sqrt_ratio_at_tick;
use crate::models::{wad_to_decimal, LiquidityPosition, Positions, RangeInfo, VaultInfo};

/// Spot price as WAD token1 per token0.
pub fn spot_price<P: Pool>(pool: &P) -> Result<U256> {
    sqrt_price_to_price(pool.current_price(), PRICE_DECIMALS)
}

/// `price(anchor_lower_tick) / spot`, WAD.
pub fn liquidity_ratio<P: Pool>(pool: &P, anchor_lower_tick: i32) -> Result<U256> {
    let spot = spot_price(pool)?;
    if spot.is_zero() {
        return Err(EngineError::DivisionByZero("liquidity ratio"));
    }
    div_wad(tick_to_price(anchor_lower_tick, PRICE_DECIMALS)?, spot)
}

#[inline]
pub fn circulating_from_parts(total_supply: U256, deployed0: U256, protocol_held: U256) -> U256 {
    total_supply.saturating_sub(deployed0).saturating_sub(protocol_held)
}

/// Total supply minus token0 sitting in Anchor and Discovery and token0 held by the protocol.
pub fn circulating_supply<P: Pool, H: VaultHost>(pool: &P, host: &H, owner: Address) -> Result<U256> {
    let positions = host.positions();
    let anchor = underlying_balances(pool, owner, positions.anchor())?;
    let discovery = underlying_balances(pool, owner, positions.discovery())?;
    let deployed0 = anchor
        .amount0
        .checked_add(discovery.amount0)
        .ok_or(EngineError::MathOverflow("deployed token0"))?;
    Ok(circulating_from_parts(host.total_supply(), deployed0, host.protocol_held_balance()))
}

/// Token0 the position would hold with the price at its lower bound.
pub fn position_capacity(position: &LiquidityPosition) -> Result<U256> {
    amount0_for_liquidity(
        sqrt_ratio_at_tick(position.lower_tick)?,
        sqrt_ratio_at_tick(position.upper_tick)?,
        position.liquidity,
    )
}

/// Price at Floor's lower tick; zero before the Floor is deployed.
pub fn intrinsic_minimum_value(positions: &Positions) -> Result<U256> {
    let floor = positions.floor();
    if floor.is_empty() {
        return Ok(U256::zero());
    }
    tick_to_price(floor.lower_tick, PRICE_DECIMALS)
}

pub fn vault_info<P: Pool, H: VaultHost>(pool: &P, host: &H, owner: Address) -> Result<VaultInfo> {
    let positions = host.positions();
    let spot = spot_price(pool)?;
    let imv = intrinsic_minimum_value(&positions)?;
    let ratio = if positions.anchor().is_empty() {
        U256::zero()
    } else {
        liquidity_ratio(pool, positions.anchor().lower_tick)?
    };

    let mut ranges = Vec::with_capacity(3);
    for position in positions.iter() {
        let balances = underlying_balances(pool, owner, position)?;
        ranges.push(RangeInfo {
            kind: position.kind,
            lower_tick: position.lower_tick,
            upper_tick: position.upper_tick,
            liquidity: pool.position_liquidity(owner, position.lower_tick, position.upper_tick).liquidity,
            amount0: balances.amount0,
            amount1: balances.amount1,
            fees: fees_earned(pool, owner, position)?,
            capacity: if position.is_empty() {
                U256::zero()
            } else {
                position_capacity(position)?
            },
        });
    }

    Ok(VaultInfo {
        liquidity_ratio: ratio,
        spot_price: spot,
        intrinsic_minimum_value: imv,
        circulating_supply: circulating_supply(pool, host, owner)?,
        total_supply: host.total_supply(),
        ranges,
        spot_price_display: wad_to_decimal(spot),
        imv_display: wad_to_decimal(imv),
    })
}
