//! Sizing and minting of the three ranges, and their withdrawal.
//!
//! Every deploy sizes liquidity from a token budget at the pool's current
//! price, mints it under the vault's identity and pays the pool from the
//! vault's balances. Range-ordering checks run before anything is minted.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::chain::pool::Pool;
use crate::chain::vault_host::VaultHost;
use crate::error::{EngineError, Result};
use crate::math::conversion::{compute_single_tick, tick_to_price, PRICE_DECIMALS};
use crate::math::fixed_point::scale_up_bps;
use crate::math::liquidity_amounts::liquidity_for_amounts;
use crate::math::tick_math::sqrt_ratio_at_tick;
use crate::models::{LiquidityPosition, PositionKind, TokenAmounts};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    pub kind: PositionKind,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub amount0: U256,
    pub amount1: U256,
}

/// What a withdrawal returned to the vault.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub principal: TokenAmounts,
    pub fees: TokenAmounts,
}

impl Withdrawal {
    pub fn total(&self) -> Result<TokenAmounts> {
        self.principal.checked_add(&self.fees)
    }
}

pub fn deploy_position<P: Pool, H: VaultHost>(pool: &mut P, host: &mut H, params: &DeployParams) -> Result<LiquidityPosition> {
    let spacing = pool.tick_spacing();
    let position = LiquidityPosition {
        lower_tick: params.lower_tick,
        upper_tick: params.upper_tick,
        liquidity: 0,
        price: tick_to_price(params.lower_tick, PRICE_DECIMALS)?,
        tick_spacing: spacing,
        kind: params.kind,
    };
    position.validate()?;

    let liquidity = liquidity_for_amounts(
        pool.current_price(),
        sqrt_ratio_at_tick(params.lower_tick)?,
        sqrt_ratio_at_tick(params.upper_tick)?,
        params.amount0,
        params.amount1,
    )?;
    if liquidity == 0 {
        return Err(EngineError::NoLiquidity(params.kind));
    }

    let owner = host.address();
    let (owed0, owed1) = pool.mint(owner, params.lower_tick, params.upper_tick, liquidity, owner.as_bytes())?;
    host.debit(&TokenAmounts::new(owed0, owed1))?;

    log::debug!(
        "deployed {:?} [{}, {}] liquidity {} paid ({}, {})",
        params.kind,
        params.lower_tick,
        params.upper_tick,
        liquidity,
        owed0,
        owed1
    );

    Ok(LiquidityPosition { liquidity, ..position })
}

/// Single-spacing Floor at `floor_price`, funded with reserve asset only.
pub fn deploy_floor<P: Pool, H: VaultHost>(
    pool: &mut P,
    host: &mut H,
    floor_price: U256,
    amount1: U256,
) -> Result<LiquidityPosition> {
    let (lower, upper) = compute_single_tick(floor_price, pool.tick_spacing(), PRICE_DECIMALS)?;
    deploy_position(
        pool,
        host,
        &DeployParams {
            kind: PositionKind::Floor,
            lower_tick: lower,
            upper_tick: upper,
            amount0: U256::zero(),
            amount1,
        },
    )
}

/// Moves the Floor up to `new_price`. Any liquidity still in the current
/// Floor is withdrawn first and its token1 joins the budget.
pub fn shift_floor<P: Pool, H: VaultHost>(
    pool: &mut P,
    host: &mut H,
    current: &LiquidityPosition,
    new_price: U256,
    amount1: U256,
) -> Result<LiquidityPosition> {
    let (lower, _) = compute_single_tick(new_price, pool.tick_spacing(), PRICE_DECIMALS)?;
    if lower <= current.lower_tick {
        return Err(EngineError::InvalidFloor {
            current: current.lower_tick,
            new: lower,
        });
    }

    let mut budget = amount1;
    let leftover = withdraw_position(pool, host, current)?;
    if !leftover.principal.is_zero() || !leftover.fees.is_zero() {
        let returned = leftover.total()?;
        budget = budget
            .checked_add(returned.amount1)
            .ok_or(EngineError::MathOverflow("floor budget"))?;
    }
    deploy_floor(pool, host, new_price, budget)
}

/// Anchor from `lower_tick` up to the grid point above `upper_price`.
pub fn deploy_anchor<P: Pool, H: VaultHost>(
    pool: &mut P,
    host: &mut H,
    floor: &LiquidityPosition,
    lower_tick: i32,
    upper_price: U256,
    budget: TokenAmounts,
) -> Result<LiquidityPosition> {
    let (_, upper) = compute_single_tick(upper_price, pool.tick_spacing(), PRICE_DECIMALS)?;
    if lower_tick < floor.upper_tick || upper <= lower_tick {
        return Err(EngineError::InvalidTicksAnchor {
            lower: lower_tick,
            upper,
            floor_upper: floor.upper_tick,
        });
    }
    deploy_position(
        pool,
        host,
        &DeployParams {
            kind: PositionKind::Anchor,
            lower_tick,
            upper_tick: upper,
            amount0: budget.amount0,
            amount1: budget.amount1,
        },
    )
}

/// Discovery one spacing above Anchor, `discovery_bips` wide in price, token0 only.
pub fn deploy_discovery<P: Pool, H: VaultHost>(
    pool: &mut P,
    host: &mut H,
    anchor: &LiquidityPosition,
    discovery_bips: u32,
    amount0: U256,
) -> Result<LiquidityPosition> {
    let spacing = pool.tick_spacing();
    let lower = anchor.upper_tick + spacing;
    let upper_price = scale_up_bps(tick_to_price(lower, PRICE_DECIMALS)?, discovery_bips)?;
    let (_, upper) = compute_single_tick(upper_price, spacing, PRICE_DECIMALS)?;

    deploy_position(
        pool,
        host,
        &DeployParams {
            kind: PositionKind::Discovery,
            lower_tick: lower,
            upper_tick: upper,
            amount0,
            amount1: U256::zero(),
        },
    )
}

/// Burns all of the position's liquidity and collects everything owed.
///
/// Collected tokens are credited to the vault and the fee part is recorded
/// in its accumulator.
pub fn withdraw_position<P: Pool, H: VaultHost>(pool: &mut P, host: &mut H, position: &LiquidityPosition) -> Result<Withdrawal> {
    let owner = host.address();
    let recorded = pool.position_liquidity(owner, position.lower_tick, position.upper_tick);
    if recorded.liquidity == 0 && recorded.tokens_owed0.is_zero() && recorded.tokens_owed1.is_zero() {
        return Ok(Withdrawal::default());
    }

    let (principal0, principal1) = if recorded.liquidity > 0 {
        pool.burn(owner, position.lower_tick, position.upper_tick, recorded.liquidity)?
    } else {
        (U256::zero(), U256::zero())
    };
    let (collected0, collected1) = pool.collect(owner, position.lower_tick, position.upper_tick, U256::MAX, U256::MAX)?;

    let withdrawal = Withdrawal {
        principal: TokenAmounts::new(principal0, principal1),
        fees: TokenAmounts::new(collected0.saturating_sub(principal0), collected1.saturating_sub(principal1)),
    };
    host.credit(&TokenAmounts::new(collected0, collected1))?;
    host.record_fees(&withdrawal.fees);

    log::debug!(
        "withdrew {:?} [{}, {}]: principal ({}, {}) fees ({}, {})",
        position.kind,
        position.lower_tick,
        position.upper_tick,
        principal0,
        principal1,
        withdrawal.fees.amount0,
        withdrawal.fees.amount1
    );
    Ok(withdrawal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::sim_pool::SimulatedPool;
    use crate::chain::vault_host::InMemoryVault;
    use ethers::types::Address;

    fn tokens(n: u64) -> U256 {
        U256::exp10(18) * n
    }

    fn wad(n: u64) -> U256 {
        U256::exp10(18) * n
    }

    fn setup() -> (SimulatedPool, InMemoryVault) {
        let pool = SimulatedPool::new(
            Address::from([1u8; 20]),
            3_000,
            60,
            sqrt_ratio_at_tick(0).expect("in range"),
            100,
        )
        .expect("pool");
        let mut host = InMemoryVault::new(Address::from([2u8; 20]), Address::from([3u8; 20]), 60, 100);
        host.seed(tokens(10_000), tokens(10_000)).expect("seed");
        (pool, host)
    }

    #[test]
    fn floor_is_one_spacing_below_spot() {
        let (mut pool, mut host) = setup();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        assert_eq!((floor.lower_tick, floor.upper_tick), (-6960, -6900));
        assert!(floor.liquidity > 0);
        assert_eq!(floor.price, tick_to_price(-6960, 18).expect("price"));
        // only reserve asset was paid
        assert_eq!(host.token_balances().amount0, tokens(10_000));
        assert!(host.token_balances().amount1 >= tokens(9_000));
    }

    #[test]
    fn floor_above_spot_cannot_be_funded_with_reserve() {
        let (mut pool, mut host) = setup();
        let err = deploy_floor(&mut pool, &mut host, wad(2), tokens(1_000));
        assert_eq!(err, Err(EngineError::NoLiquidity(PositionKind::Floor)));
    }

    #[test]
    fn anchor_may_not_overlap_floor() {
        let (mut pool, mut host) = setup();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        let budget = TokenAmounts::new(tokens(100), tokens(100));
        let err = deploy_anchor(&mut pool, &mut host, &floor, -6960, wad(1), budget);
        assert!(matches!(err, Err(EngineError::InvalidTicksAnchor { floor_upper: -6900, .. })));

        let anchor = deploy_anchor(&mut pool, &mut host, &floor, -6900, wad(1), budget).expect("anchor");
        assert_eq!(anchor.lower_tick, -6900);
        assert_eq!(anchor.upper_tick, 60);
    }

    #[test]
    fn discovery_sits_above_anchor() {
        let (mut pool, mut host) = setup();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        let budget = TokenAmounts::new(tokens(100), tokens(100));
        let anchor = deploy_anchor(&mut pool, &mut host, &floor, -6900, wad(1), budget).expect("anchor");
        let discovery = deploy_discovery(&mut pool, &mut host, &anchor, 30_000, tokens(1_000)).expect("discovery");
        assert_eq!(discovery.lower_tick, anchor.upper_tick + 60);
        // four times the lower price is ~13_863 ticks higher
        assert!(discovery.upper_tick > discovery.lower_tick + 13_800);
        assert_eq!(discovery.upper_tick % 60, 0);
    }

    #[test]
    fn narrowest_discovery_still_spans_one_spacing() {
        let (mut pool, mut host) = setup();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        let budget = TokenAmounts::new(tokens(100), tokens(100));
        let anchor = deploy_anchor(&mut pool, &mut host, &floor, -6900, wad(1), budget).expect("anchor");
        let discovery = deploy_discovery(&mut pool, &mut host, &anchor, 1, tokens(1_000)).expect("discovery");
        assert_eq!((discovery.lower_tick, discovery.upper_tick), (120, 180));
        assert!(discovery.liquidity > 0);
    }

    #[test]
    fn discovery_without_tokens_is_degenerate() {
        let (mut pool, mut host) = setup();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        let budget = TokenAmounts::new(tokens(100), tokens(100));
        let anchor = deploy_anchor(&mut pool, &mut host, &floor, -6900, wad(1), budget).expect("anchor");
        assert_eq!(
            deploy_discovery(&mut pool, &mut host, &anchor, 30_000, U256::zero()),
            Err(EngineError::NoLiquidity(PositionKind::Discovery))
        );
    }

    #[test]
    fn shift_floor_only_moves_up() {
        let (mut pool, mut host) = setup();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        let down = shift_floor(&mut pool, &mut host, &floor, wad(1) / 4, tokens(10));
        assert!(matches!(down, Err(EngineError::InvalidFloor { current: -6960, .. })));
        let same = shift_floor(&mut pool, &mut host, &floor, wad(1) / 2, tokens(10));
        assert!(matches!(same, Err(EngineError::InvalidFloor { .. })));

        let raised = shift_floor(&mut pool, &mut host, &floor, wad(8) / 10, tokens(10)).expect("raise");
        assert!(raised.lower_tick > floor.lower_tick);
        // the old floor was withdrawn into the new one
        assert_eq!(pool.position_liquidity(host.address(), -6960, -6900).liquidity, 0);
    }

    #[test]
    fn withdraw_returns_principal_and_credits_vault() {
        let (mut pool, mut host) = setup();
        let before = host.token_balances();
        let floor = deploy_floor(&mut pool, &mut host, wad(1) / 2, tokens(1_000)).expect("floor");
        let w = withdraw_position(&mut pool, &mut host, &floor).expect("withdraw");
        assert!(w.fees.is_zero());
        // mint rounds up and burn rounds down
        let after = host.token_balances();
        assert!(after.amount1 <= before.amount1);
        assert!(before.amount1 - after.amount1 <= U256::from(1u8));
        assert_eq!(host.fee_accumulator().collections, 1);

        let again = withdraw_position(&mut pool, &mut host, &floor).expect("withdraw twice");
        assert_eq!(again, Withdrawal::default());
    }
}
