//! Shift and slide.
//!
//! Both run the same preflight against the live pool and vault: capability,
//! cooldown, every range holding liquidity, the stored parameters, the ratio
//! trigger and the TWAP check, in that order. Nothing is mutated before
//! preflight passes. The
//! redeploy itself runs on a [`WorkUnit`] and only commits if every step
//! succeeds.

use ethers::types::U256;

use crate::chain::clock::Clock;
use crate::chain::pool::Pool;
use crate::chain::supply::AdaptiveSupply;
use crate::chain::vault_host::VaultHost;
use crate::engine::auth::RebalanceCapability;
use crate::engine::deployer::{
    deploy_anchor, deploy_discovery, deploy_position, shift_floor, withdraw_position, DeployParams, Withdrawal,
};
use crate::engine::guard::{GuardConfig, RebalanceGuard};
use crate::engine::model::{circulating_from_parts, liquidity_ratio, spot_price};
use crate::engine::underlying::underlying_balances;
use crate::engine::work_unit::WorkUnit;
use crate::error::{EngineError, Result};
use crate::math::conversion::{compute_single_tick, next_grid_tick_above, PRICE_DECIMALS};
use crate::math::fixed_point::{bps_of, div_wad, mul_wad, scale_down_bps, scale_up_bps};
use crate::math::liquidity_amounts::liquidity_for_amounts;
use crate::math::tick_math::sqrt_ratio_at_tick;
use crate::models::{
    LiquidityPosition, PositionKind, Positions, ProtocolAddresses, ProtocolParameters, RebalanceOutcome, SupplyChange,
    TokenAmounts, VaultEvent,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Trigger {
    Shift,
    Slide,
}

/// State read during preflight and handed to the redeploy.
struct Preflight {
    positions: Positions,
    parameters: ProtocolParameters,
    ratio: U256,
}

struct Executed {
    positions: Positions,
    skimmed: U256,
    fees: TokenAmounts,
    supply: SupplyChange,
}

/// Reserve that must move from Anchor and Discovery into Floor: `reserve - ratio * reserve`.
pub fn compute_skim(reserve: U256, ratio: U256) -> Result<U256> {
    Ok(reserve.saturating_sub(mul_wad(ratio, reserve)?))
}

fn sum_fees(withdrawals: &[&Withdrawal]) -> Result<TokenAmounts> {
    withdrawals
        .iter()
        .try_fold(TokenAmounts::default(), |acc, w| acc.checked_add(&w.fees))
}

#[derive(Debug, Default)]
pub struct Rebalancer {
    guard: RebalanceGuard,
}

impl Rebalancer {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            guard: RebalanceGuard::new(config),
        }
    }

    pub fn guard(&self) -> &RebalanceGuard {
        &self.guard
    }

    fn preflight<P: Pool, H: VaultHost>(
        &self,
        cap: &RebalanceCapability,
        addresses: &ProtocolAddresses,
        pool: &P,
        host: &H,
        now: u64,
        trigger: Trigger,
    ) -> Result<Preflight> {
        cap.check(addresses, pool, host)?;
        self.guard.check_cooldown(now)?;

        let owner = host.address();
        let positions = host.positions();
        for position in positions.iter() {
            if pool.position_liquidity(owner, position.lower_tick, position.upper_tick).liquidity == 0 {
                return Err(EngineError::OnlyNotEmptyPositions);
            }
        }

        let parameters = host.protocol_parameters();
        parameters.validate()?;
        let ratio = liquidity_ratio(pool, positions.anchor().lower_tick)?;
        match trigger {
            Trigger::Shift if ratio > parameters.shift_ratio => {
                return Err(EngineError::AboveThreshold {
                    ratio,
                    threshold: parameters.shift_ratio,
                });
            }
            Trigger::Slide if ratio < parameters.slide_ratio => {
                return Err(EngineError::BelowThreshold {
                    ratio,
                    threshold: parameters.slide_ratio,
                });
            }
            _ => {}
        }

        self.guard.check_twap(pool)?;
        Ok(Preflight {
            positions,
            parameters,
            ratio,
        })
    }

    /// Moves reserve from Anchor and Discovery into a higher Floor and redeploys
    /// the other two ranges above it. Refills Discovery through the supply
    /// controller when the vault runs low on token0.
    pub fn shift<P, H, S, C>(
        &mut self,
        cap: &RebalanceCapability,
        addresses: &ProtocolAddresses,
        pool: &mut P,
        host: &mut H,
        supply: &S,
        clock: &C,
    ) -> Result<RebalanceOutcome>
    where
        P: Pool + Clone,
        H: VaultHost + Clone,
        S: AdaptiveSupply,
        C: Clock,
    {
        let now = clock.now();
        let checked = self.preflight(cap, addresses, pool, host, now, Trigger::Shift)?;

        let mut unit = WorkUnit::begin(pool, host);
        let (staged_pool, staged_host) = unit.parts();
        let executed = execute_shift(staged_pool, staged_host, supply, &checked, now)?;
        unit.commit();
        self.guard.record(now);

        log::info!(
            "shift: ratio {} skimmed {} floor [{}, {}] anchor [{}, {}] discovery [{}, {}] minted {}",
            checked.ratio,
            executed.skimmed,
            executed.positions.floor().lower_tick,
            executed.positions.floor().upper_tick,
            executed.positions.anchor().lower_tick,
            executed.positions.anchor().upper_tick,
            executed.positions.discovery().lower_tick,
            executed.positions.discovery().upper_tick,
            executed.supply.total_minted()
        );

        Ok(RebalanceOutcome {
            event: VaultEvent::Shift,
            liquidity_ratio: checked.ratio,
            skimmed: executed.skimmed,
            positions: executed.positions,
            fees: executed.fees,
            supply: executed.supply,
            executed_at: now,
        })
    }

    /// Redeploys Anchor and Discovery around spot, leaving Floor in place.
    /// Excess token0 in the vault is burned down to a cap.
    pub fn slide<P, H, C>(
        &mut self,
        cap: &RebalanceCapability,
        addresses: &ProtocolAddresses,
        pool: &mut P,
        host: &mut H,
        clock: &C,
    ) -> Result<RebalanceOutcome>
    where
        P: Pool + Clone,
        H: VaultHost + Clone,
        C: Clock,
    {
        let now = clock.now();
        let checked = self.preflight(cap, addresses, pool, host, now, Trigger::Slide)?;

        let mut unit = WorkUnit::begin(pool, host);
        let (staged_pool, staged_host) = unit.parts();
        let executed = execute_slide(staged_pool, staged_host, &checked)?;
        unit.commit();
        self.guard.record(now);

        log::info!(
            "slide: ratio {} anchor [{}, {}] discovery [{}, {}] burned {} reminted {}",
            checked.ratio,
            executed.positions.anchor().lower_tick,
            executed.positions.anchor().upper_tick,
            executed.positions.discovery().lower_tick,
            executed.positions.discovery().upper_tick,
            executed.supply.burned,
            executed.supply.minted_to_vault
        );

        Ok(RebalanceOutcome {
            event: VaultEvent::Slide,
            liquidity_ratio: checked.ratio,
            skimmed: U256::zero(),
            positions: executed.positions,
            fees: executed.fees,
            supply: executed.supply,
            executed_at: now,
        })
    }
}

fn execute_shift<P: Pool, H: VaultHost, S: AdaptiveSupply>(
    pool: &mut P,
    host: &mut H,
    supply: &S,
    checked: &Preflight,
    now: u64,
) -> Result<Executed> {
    let owner = host.address();
    let params = &checked.parameters;
    let (floor, anchor, discovery) = (
        checked.positions.floor(),
        checked.positions.anchor(),
        checked.positions.discovery(),
    );

    let anchor_held = underlying_balances(pool, owner, anchor)?;
    let discovery_held = underlying_balances(pool, owner, discovery)?;
    let reserve = anchor_held
        .amount1
        .checked_add(discovery_held.amount1)
        .ok_or(EngineError::MathOverflow("anchor and discovery reserve"))?;
    let skimmed = compute_skim(reserve, checked.ratio)?;
    let deployed0 = anchor_held
        .amount0
        .checked_add(discovery_held.amount0)
        .ok_or(EngineError::MathOverflow("deployed token0"))?;
    let circulating = circulating_from_parts(host.total_supply(), deployed0, host.protocol_held_balance());
    if circulating.is_zero() {
        return Err(EngineError::DivisionByZero("circulating supply"));
    }

    let floor_out = withdraw_position(pool, host, floor)?;
    let anchor_out = withdraw_position(pool, host, anchor)?;
    let discovery_out = withdraw_position(pool, host, discovery)?;
    let fees = sum_fees(&[&floor_out, &anchor_out, &discovery_out])?;

    let floor_budget = floor_out
        .principal
        .amount1
        .checked_add(skimmed)
        .ok_or(EngineError::MathOverflow("floor budget"))?;
    let new_floor_price = div_wad(floor_budget, circulating)?;
    log::debug!(
        "shift: reserve {} skim {} circulating {} new floor price {}",
        reserve,
        skimmed,
        circulating,
        new_floor_price
    );
    let new_floor = raise_or_hold_floor(pool, host, floor, new_floor_price, floor_budget)?;

    // token1 fees from every range join the anchor
    let spot = spot_price(pool)?;
    let anchor_reserve = anchor_out
        .principal
        .amount1
        .saturating_add(discovery_out.principal.amount1)
        .saturating_add(fees.amount1)
        .saturating_sub(skimmed);
    let balances = host.token_balances();
    let new_anchor = deploy_anchor(
        pool,
        host,
        &new_floor,
        new_floor.upper_tick,
        scale_up_bps(spot, params.shift_anchor_upper_bips)?,
        TokenAmounts::new(balances.amount0, anchor_reserve.min(balances.amount1)),
    )?;

    let supply_change = refill(host, supply, params, circulating, spot, new_floor_price, now)?;

    let remaining0 = host.token_balances().amount0;
    let new_discovery = deploy_discovery(pool, host, &new_anchor, params.discovery_bips, remaining0)?;

    let positions = Positions::new(new_floor, new_anchor, new_discovery)?;
    host.update_positions(positions.clone())?;
    host.emit(VaultEvent::Shift);

    Ok(Executed {
        positions,
        skimmed,
        fees,
        supply: supply_change,
    })
}

/// Moves the Floor up to `price` when that clears its current lower tick.
/// Otherwise the Floor stays on its ticks and is redeployed with `budget`,
/// so buying pressure that outpaces the skim never pushes it down.
fn raise_or_hold_floor<P: Pool, H: VaultHost>(
    pool: &mut P,
    host: &mut H,
    floor: &LiquidityPosition,
    price: U256,
    budget: U256,
) -> Result<LiquidityPosition> {
    let (target, _) = compute_single_tick(price, pool.tick_spacing(), PRICE_DECIMALS)?;
    if target > floor.lower_tick {
        return shift_floor(pool, host, floor, price, budget);
    }
    log::debug!(
        "shift: floor price {} maps to tick {} at or below {}, holding the floor",
        price,
        target,
        floor.lower_tick
    );
    deploy_position(
        pool,
        host,
        &DeployParams {
            kind: PositionKind::Floor,
            lower_tick: floor.lower_tick,
            upper_tick: floor.upper_tick,
            amount0: U256::zero(),
            amount1: budget,
        },
    )
}

/// Mints token0 for Discovery when the vault's balance is below
/// `circulating / low_balance_threshold_factor`.
fn refill<H: VaultHost, S: AdaptiveSupply>(
    host: &mut H,
    supply: &S,
    params: &ProtocolParameters,
    circulating: U256,
    spot: U256,
    imv: U256,
    now: u64,
) -> Result<SupplyChange> {
    let threshold = circulating
        .checked_div(U256::from(params.low_balance_threshold_factor))
        .ok_or(EngineError::DivisionByZero("low balance threshold factor"))?;
    let balance0 = host.token_balances().amount0;
    if balance0 >= threshold {
        return Ok(SupplyChange::default());
    }

    let total_supply = host.total_supply();
    let proposed = supply.compute_mint_amount(total_supply, host.time_since_last_mint(now), spot, imv);
    let mint = if proposed.is_zero() || proposed > total_supply {
        log::warn!(
            "supply controller proposed {} (total supply {}), minting fallback {}",
            proposed,
            total_supply,
            threshold
        );
        threshold
    } else {
        proposed
    };
    if mint.is_zero() {
        return Ok(SupplyChange::default());
    }

    let team_fee = bps_of(mint, params.inflation_fee_bps)?;
    let to_vault = mint
        .checked_sub(team_fee)
        .ok_or(EngineError::MathOverflow("inflation fee exceeds mint"))?;
    let (vault, team) = (host.address(), host.team_multisig());
    host.mint_tokens(vault, to_vault)?;
    if !team_fee.is_zero() {
        host.mint_tokens(team, team_fee)?;
    }
    host.record_mint_time(now);
    log::debug!("refill: balance {} below {}, minted {} (team fee {})", balance0, threshold, mint, team_fee);

    Ok(SupplyChange {
        minted_to_vault: to_vault,
        minted_to_team: team_fee,
        burned: U256::zero(),
    })
}

fn execute_slide<P: Pool, H: VaultHost>(pool: &mut P, host: &mut H, checked: &Preflight) -> Result<Executed> {
    let owner = host.address();
    let params = &checked.parameters;
    let spacing = pool.tick_spacing();
    let (floor, anchor, discovery) = (
        checked.positions.floor(),
        checked.positions.anchor(),
        checked.positions.discovery(),
    );

    let anchor_held = underlying_balances(pool, owner, anchor)?;
    let discovery_held = underlying_balances(pool, owner, discovery)?;
    let deployed0 = anchor_held
        .amount0
        .checked_add(discovery_held.amount0)
        .ok_or(EngineError::MathOverflow("deployed token0"))?;
    let circulating = circulating_from_parts(host.total_supply(), deployed0, host.protocol_held_balance());

    let anchor_out = withdraw_position(pool, host, anchor)?;
    let discovery_out = withdraw_position(pool, host, discovery)?;
    let fees = sum_fees(&[&anchor_out, &discovery_out])?;

    let spot = spot_price(pool)?;
    let bips = params.slide_anchor_upper_bips;
    let upper_price = scale_up_bps(spot, bips)?;
    let (_, upper) = compute_single_tick(upper_price, spacing, PRICE_DECIMALS)?;
    let (spot_lower, _) = compute_single_tick(scale_down_bps(spot, bips)?, spacing, PRICE_DECIMALS)?;
    let mut lower = floor.upper_tick.max(spot_lower);

    let balances = host.token_balances();
    let budget = TokenAmounts::new(anchor_out.total()?.amount0.min(balances.amount0), balances.amount1);
    if upper > lower {
        let straddling = liquidity_for_amounts(
            pool.current_price(),
            sqrt_ratio_at_tick(lower)?,
            sqrt_ratio_at_tick(upper)?,
            budget.amount0,
            budget.amount1,
        )?;
        // no reserve left to quote below spot: keep the anchor above it
        if straddling == 0 {
            lower = floor.upper_tick.max(next_grid_tick_above(pool.current_tick(), spacing)?);
            log::debug!("slide: anchor lower lifted to {} above spot", lower);
        }
    }
    let new_anchor = deploy_anchor(pool, host, floor, lower, upper_price, budget)?;

    let cap = circulating
        .checked_div(U256::from(params.high_balance_threshold_factor))
        .ok_or(EngineError::DivisionByZero("high balance threshold factor"))?;
    let balance0 = host.token_balances().amount0;
    let supply_change = if balance0 > cap {
        host.burn_tokens(balance0)?;
        host.mint_tokens(owner, cap)?;
        log::debug!("slide: drained {} and reminted {}", balance0, cap);
        SupplyChange {
            minted_to_vault: cap,
            minted_to_team: U256::zero(),
            burned: balance0,
        }
    } else {
        SupplyChange::default()
    };

    let remaining0 = host.token_balances().amount0;
    let new_discovery = deploy_discovery(pool, host, &new_anchor, params.discovery_bips, remaining0)?;

    let positions = Positions::new(floor.clone(), new_anchor, new_discovery)?;
    host.update_positions(positions.clone())?;
    host.emit(VaultEvent::Slide);

    Ok(Executed {
        positions,
        skimmed: U256::zero(),
        fees,
        supply: supply_change,
    })
}
