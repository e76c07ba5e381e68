use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::chain::pool::Pool;
use crate::error::Result;
use crate::math::fee_growth::{fee_growth_inside, fees_owed};
use crate::math::liquidity_amounts::amounts_for_liquidity;
use crate::math::tick_math::sqrt_ratio_at_tick;
use crate::models::{LiquidityPosition, TokenAmounts};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlyingBalances {
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub amount0: U256,
    pub amount1: U256,
}

/// Token amounts the position's recorded liquidity backs at the current price.
/// A position with no recorded liquidity reads as zero amounts.
pub fn underlying_balances<P: Pool>(pool: &P, owner: Address, position: &LiquidityPosition) -> Result<UnderlyingBalances> {
    let mut balances = UnderlyingBalances {
        lower_tick: position.lower_tick,
        upper_tick: position.upper_tick,
        ..UnderlyingBalances::default()
    };
    let recorded = pool.position_liquidity(owner, position.lower_tick, position.upper_tick);
    if recorded.liquidity == 0 {
        return Ok(balances);
    }

    let (amount0, amount1) = amounts_for_liquidity(
        pool.current_price(),
        sqrt_ratio_at_tick(position.lower_tick)?,
        sqrt_ratio_at_tick(position.upper_tick)?,
        recorded.liquidity,
    )?;
    balances.amount0 = amount0;
    balances.amount1 = amount1;
    Ok(balances)
}

/// Fees accrued by the position since its last checkpoint, for one token.
///
/// Tokens already moved to `tokens_owed` are not included.
pub fn compute_fees_earned<P: Pool>(
    position: &LiquidityPosition,
    owner: Address,
    pool: &P,
    is_token0: bool,
    current_tick: i32,
) -> Result<U256> {
    let recorded = pool.position_liquidity(owner, position.lower_tick, position.upper_tick);
    if recorded.liquidity == 0 {
        return Ok(U256::zero());
    }
    let lower = pool.tick_info(position.lower_tick);
    let upper = pool.tick_info(position.upper_tick);
    let (global0, global1) = pool.fee_growth_global();

    let (global, lower_outside, upper_outside, last) = if is_token0 {
        (global0, lower.fee_growth_outside0, upper.fee_growth_outside0, recorded.fee_growth_inside0_last)
    } else {
        (global1, lower.fee_growth_outside1, upper.fee_growth_outside1, recorded.fee_growth_inside1_last)
    };
    let inside = fee_growth_inside(
        position.lower_tick,
        position.upper_tick,
        current_tick,
        global,
        lower_outside,
        upper_outside,
    );
    fees_owed(recorded.liquidity, inside, last)
}

/// Both tokens' uncollected fees at the pool's current tick.
pub fn fees_earned<P: Pool>(pool: &P, owner: Address, position: &LiquidityPosition) -> Result<TokenAmounts> {
    let tick = pool.current_tick();
    Ok(TokenAmounts::new(
        compute_fees_earned(position, owner, pool, true, tick)?,
        compute_fees_earned(position, owner, pool, false, tick)?,
    ))
}
