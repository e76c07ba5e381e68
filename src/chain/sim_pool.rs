// In-process concentrated-liquidity pool
// --------------------------------------
// Tick map with gross/net liquidity and fee-growth-outside, per-owner positions
// with fee checkpoints, exact-input swaps crossing initialized ticks, and a
// tick-cumulative observation log for TWAP reads.
//
// BigInt for every price/amount intermediate; results narrowed to U256.

use std::collections::{BTreeMap, HashMap};

use ethers::types::{Address, U256};
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::chain::pool::{Pool, PositionSnapshot, TickSnapshot};
use crate::error::{EngineError, Result};
use crate::math::fee_growth::{fee_growth_inside, fees_owed, growth_for_fee};
use crate::math::fixed_point::{from_big, to_big};
use crate::math::liquidity_amounts::{amount0_delta, amount1_delta};
use crate::math::tick_math::{
    max_sqrt_ratio, min_sqrt_ratio, sqrt_ratio_at_tick_big, tick_at_sqrt_ratio, MAX_TICK, MIN_TICK,
};

const FEE_DENOMINATOR_PPM: u32 = 1_000_000;

#[inline]
fn ceil_div(a: &BigInt, b: &BigInt) -> BigInt {
    if a.is_zero() {
        return BigInt::zero();
    }
    (a + (b - BigInt::one())) / b
}

#[inline]
fn pool_err(msg: impl Into<String>) -> EngineError {
    EngineError::Pool(msg.into())
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Observation {
    timestamp: u64,
    tick_cumulative: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapResult {
    pub amount_in: U256, // gross, fee included
    pub amount_out: U256,
    pub fee_paid: U256,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub crossed_ticks: usize,
}

/// `(sqrt_next, amount_in, amount_out, fee)` for one step towards `sqrt_target`.
fn compute_swap_step(
    sqrt_price: &BigInt,
    sqrt_target: &BigInt,
    liquidity: &BigInt,
    amount_remaining: &BigInt,
    fee_ppm: u32,
    zero_for_one: bool,
) -> (BigInt, BigInt, BigInt, BigInt) {
    let denom = BigInt::from(FEE_DENOMINATOR_PPM);
    let fee_complement = &denom - BigInt::from(fee_ppm);
    let remaining_less_fee = (amount_remaining * &fee_complement) / &denom;

    let in_to_target = if zero_for_one {
        amount0_delta(sqrt_target, sqrt_price, liquidity, true)
    } else {
        amount1_delta(sqrt_price, sqrt_target, liquidity, true)
    };

    if in_to_target <= remaining_less_fee {
        let out = if zero_for_one {
            amount1_delta(sqrt_target, sqrt_price, liquidity, false)
        } else {
            amount0_delta(sqrt_price, sqrt_target, liquidity, false)
        };
        let fee = ceil_div(&(&in_to_target * BigInt::from(fee_ppm)), &fee_complement);
        return (sqrt_target.clone(), in_to_target, out, fee);
    }

    let sqrt_next = if zero_for_one {
        // ceil( (L<<96) * P / ( (L<<96) + amountIn * P ) )
        let numerator1 = liquidity << 96;
        let denominator = &numerator1 + &remaining_less_fee * sqrt_price;
        ceil_div(&(&numerator1 * sqrt_price), &denominator)
    } else {
        // P + floor( amountIn * Q96 / L )
        sqrt_price + ((&remaining_less_fee << 96) / liquidity)
    };
    let (amount_in, out) = if zero_for_one {
        (
            amount0_delta(&sqrt_next, sqrt_price, liquidity, true),
            amount1_delta(&sqrt_next, sqrt_price, liquidity, false),
        )
    } else {
        (
            amount1_delta(sqrt_price, &sqrt_next, liquidity, true),
            amount0_delta(sqrt_price, &sqrt_next, liquidity, false),
        )
    };
    // whatever is left of the input after the price move is fee
    let fee = amount_remaining - &amount_in;
    (sqrt_next, amount_in, out, fee)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatedPool {
    address: Address,
    fee_ppm: u32,
    tick_spacing: i32,
    sqrt_price: BigInt,
    tick: i32,
    liquidity: u128,
    fee_growth_global0: U256,
    fee_growth_global1: U256,
    ticks: BTreeMap<i32, TickSnapshot>,
    positions: HashMap<(Address, i32, i32), PositionSnapshot>,
    observations: Vec<Observation>,
    now: u64,
    reserve0: U256,
    reserve1: U256,
}

impl SimulatedPool {
    pub fn new(address: Address, fee_ppm: u32, tick_spacing: i32, sqrt_price_x96: U256, now: u64) -> Result<Self> {
        if tick_spacing <= 0 {
            return Err(EngineError::InvalidTickSpacing(tick_spacing));
        }
        if fee_ppm >= FEE_DENOMINATOR_PPM {
            return Err(pool_err(format!("fee {} ppm out of range", fee_ppm)));
        }
        let tick = tick_at_sqrt_ratio(sqrt_price_x96)?;
        Ok(Self {
            address,
            fee_ppm,
            tick_spacing,
            sqrt_price: to_big(sqrt_price_x96),
            tick,
            liquidity: 0,
            fee_growth_global0: U256::zero(),
            fee_growth_global1: U256::zero(),
            ticks: BTreeMap::new(),
            positions: HashMap::new(),
            observations: vec![Observation {
                timestamp: now,
                tick_cumulative: 0,
            }],
            now,
            reserve0: U256::zero(),
            reserve1: U256::zero(),
        })
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.now = self.now.saturating_add(secs);
    }

    /// Liquidity active at the current price.
    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn fee_ppm(&self) -> u32 {
        self.fee_ppm
    }

    /// Token balances held by the pool, owed-but-uncollected amounts included.
    pub fn reserves(&self) -> (U256, U256) {
        (self.reserve0, self.reserve1)
    }

    fn tick_cumulative_at_now(&self) -> i64 {
        match self.observations.last() {
            Some(last) => last.tick_cumulative + self.tick as i64 * (self.now - last.timestamp) as i64,
            None => 0,
        }
    }

    /// Checkpoint the cumulative before the tick changes.
    fn write_observation(&mut self) {
        let cumulative = self.tick_cumulative_at_now();
        match self.observations.last_mut() {
            Some(last) if last.timestamp == self.now => last.tick_cumulative = cumulative,
            _ => self.observations.push(Observation {
                timestamp: self.now,
                tick_cumulative: cumulative,
            }),
        }
    }

    fn observe_single(&self, seconds_ago: u32) -> Result<i64> {
        let target = self
            .now
            .checked_sub(seconds_ago as u64)
            .ok_or_else(|| pool_err("observation before time zero"))?;

        let first = self.observations.first().ok_or_else(|| pool_err("no observations"))?;
        if target < first.timestamp {
            return Err(pool_err(format!("observation at {} older than oldest {}", target, first.timestamp)));
        }
        // partition_point: first index with timestamp > target
        let idx = self.observations.partition_point(|o| o.timestamp <= target);
        let before = &self.observations[idx - 1];
        if idx == self.observations.len() {
            return Ok(before.tick_cumulative + self.tick as i64 * (target - before.timestamp) as i64);
        }
        let after = &self.observations[idx];
        let span = (after.timestamp - before.timestamp) as i64;
        let tick_in_span = (after.tick_cumulative - before.tick_cumulative) / span;
        Ok(before.tick_cumulative + tick_in_span * (target - before.timestamp) as i64)
    }

    fn check_ticks(&self, lower_tick: i32, upper_tick: i32) -> Result<()> {
        if lower_tick >= upper_tick {
            return Err(pool_err(format!("lower tick {} >= upper tick {}", lower_tick, upper_tick)));
        }
        if lower_tick < MIN_TICK || upper_tick > MAX_TICK {
            return Err(pool_err("tick out of bounds"));
        }
        if lower_tick % self.tick_spacing != 0 || upper_tick % self.tick_spacing != 0 {
            return Err(pool_err(format!("ticks not multiples of spacing {}", self.tick_spacing)));
        }
        Ok(())
    }

    fn update_tick(&mut self, tick: i32, delta: i128, upper: bool) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let (current, global0, global1) = (self.tick, self.fee_growth_global0, self.fee_growth_global1);
        let info = self.ticks.entry(tick).or_default();
        if info.liquidity_gross == 0 && delta > 0 && tick <= current {
            // growth before initialization is assumed to have happened below
            info.fee_growth_outside0 = global0;
            info.fee_growth_outside1 = global1;
        }
        let gross = info.liquidity_gross as i128 + delta;
        if gross < 0 {
            return Err(pool_err(format!("tick {} liquidity underflow", tick)));
        }
        info.liquidity_gross = gross as u128;
        info.liquidity_net = if upper {
            info.liquidity_net - delta
        } else {
            info.liquidity_net + delta
        };
        Ok(())
    }

    fn clear_tick_if_unused(&mut self, tick: i32) {
        if self.ticks.get(&tick).map_or(false, |t| t.liquidity_gross == 0) {
            self.ticks.remove(&tick);
        }
    }

    fn modify_position(&mut self, owner: Address, lower_tick: i32, upper_tick: i32, delta: i128) -> Result<()> {
        let key = (owner, lower_tick, upper_tick);
        let existing = self.positions.get(&key).map(|p| p.liquidity).unwrap_or(0);
        if delta < 0 && existing < delta.unsigned_abs() {
            return Err(pool_err(format!(
                "burn {} exceeds position liquidity {}",
                delta.unsigned_abs(),
                existing
            )));
        }

        self.update_tick(lower_tick, delta, false)?;
        self.update_tick(upper_tick, delta, true)?;

        let lower = self.tick_info(lower_tick);
        let upper = self.tick_info(upper_tick);
        let inside0 = fee_growth_inside(
            lower_tick,
            upper_tick,
            self.tick,
            self.fee_growth_global0,
            lower.fee_growth_outside0,
            upper.fee_growth_outside0,
        );
        let inside1 = fee_growth_inside(
            lower_tick,
            upper_tick,
            self.tick,
            self.fee_growth_global1,
            lower.fee_growth_outside1,
            upper.fee_growth_outside1,
        );

        let position = self.positions.entry(key).or_default();
        let owed0 = fees_owed(position.liquidity, inside0, position.fee_growth_inside0_last)?;
        let owed1 = fees_owed(position.liquidity, inside1, position.fee_growth_inside1_last)?;
        position.tokens_owed0 = position.tokens_owed0.saturating_add(owed0);
        position.tokens_owed1 = position.tokens_owed1.saturating_add(owed1);
        position.fee_growth_inside0_last = inside0;
        position.fee_growth_inside1_last = inside1;
        position.liquidity = (position.liquidity as i128 + delta) as u128;

        if lower_tick <= self.tick && self.tick < upper_tick {
            self.liquidity = (self.liquidity as i128 + delta) as u128;
        }
        if delta < 0 {
            self.clear_tick_if_unused(lower_tick);
            self.clear_tick_if_unused(upper_tick);
        }
        Ok(())
    }

    /// Amounts backing `liquidity` over the range, branching on the current tick.
    fn amounts_for(&self, lower_tick: i32, upper_tick: i32, liquidity: u128, round_up: bool) -> Result<(U256, U256)> {
        let sa = sqrt_ratio_at_tick_big(lower_tick)?;
        let sb = sqrt_ratio_at_tick_big(upper_tick)?;
        let l = BigInt::from(liquidity);
        let (a0, a1) = if self.tick < lower_tick {
            (amount0_delta(&sa, &sb, &l, round_up), BigInt::zero())
        } else if self.tick < upper_tick {
            (
                amount0_delta(&self.sqrt_price, &sb, &l, round_up),
                amount1_delta(&sa, &self.sqrt_price, &l, round_up),
            )
        } else {
            (BigInt::zero(), amount1_delta(&sa, &sb, &l, round_up))
        };
        Ok((from_big(&a0)?, from_big(&a1)?))
    }

    fn next_initialized_tick(&self, zero_for_one: bool) -> (i32, bool) {
        if zero_for_one {
            match self.ticks.range(..=self.tick).next_back() {
                Some((&t, _)) => (t, true),
                None => (MIN_TICK, false),
            }
        } else {
            match self.ticks.range(self.tick + 1..).next() {
                Some((&t, _)) => (t, true),
                None => (MAX_TICK, false),
            }
        }
    }

    fn cross_tick(&mut self, tick: i32) -> i128 {
        let (global0, global1) = (self.fee_growth_global0, self.fee_growth_global1);
        match self.ticks.get_mut(&tick) {
            Some(info) => {
                info.fee_growth_outside0 = global0.overflowing_sub(info.fee_growth_outside0).0;
                info.fee_growth_outside1 = global1.overflowing_sub(info.fee_growth_outside1).0;
                info.liquidity_net
            }
            None => 0,
        }
    }

    /// Exact-input swap. `zero_for_one` sells token0 for token1 (price moves down).
    ///
    /// Stops when the input is spent or the price reaches `sqrt_price_limit`
    /// (defaults to the edge of the tick range). Zero-liquidity gaps are
    /// crossed without exchanging tokens.
    pub fn swap(&mut self, zero_for_one: bool, amount_in: U256, sqrt_price_limit: Option<U256>) -> Result<SwapResult> {
        if amount_in.is_zero() {
            return Err(pool_err("amount_in must be positive (exact input)"));
        }
        let limit = match sqrt_price_limit {
            Some(l) => to_big(l),
            None if zero_for_one => min_sqrt_ratio() + 1,
            None => max_sqrt_ratio() - 1,
        };
        if zero_for_one && (limit >= self.sqrt_price || limit < min_sqrt_ratio()) {
            return Err(pool_err("price limit must be below current price for zero_for_one"));
        }
        if !zero_for_one && (limit <= self.sqrt_price || limit > max_sqrt_ratio()) {
            return Err(pool_err("price limit must be above current price for one_for_zero"));
        }

        self.write_observation();

        let mut remaining = to_big(amount_in);
        let mut total_in = BigInt::zero();
        let mut total_out = BigInt::zero();
        let mut total_fee = BigInt::zero();
        let mut crossed = 0usize;

        while remaining > BigInt::zero() && self.sqrt_price != limit {
            let (next_tick, has_next) = self.next_initialized_tick(zero_for_one);
            let sqrt_next = sqrt_ratio_at_tick_big(next_tick.clamp(MIN_TICK, MAX_TICK))?;
            let target = if zero_for_one {
                if sqrt_next > limit { sqrt_next.clone() } else { limit.clone() }
            } else if sqrt_next < limit {
                sqrt_next.clone()
            } else {
                limit.clone()
            };

            if self.liquidity == 0 {
                self.sqrt_price = target;
            } else {
                let l = BigInt::from(self.liquidity);
                let (sqrt_q, used_in, got_out, fee) =
                    compute_swap_step(&self.sqrt_price, &target, &l, &remaining, self.fee_ppm, zero_for_one);
                remaining -= &used_in + &fee;
                total_in += &used_in + &fee;
                total_out += &got_out;
                total_fee += &fee;

                let growth = growth_for_fee(from_big(&fee)?, self.liquidity)?;
                if zero_for_one {
                    self.fee_growth_global0 = self.fee_growth_global0.overflowing_add(growth).0;
                } else {
                    self.fee_growth_global1 = self.fee_growth_global1.overflowing_add(growth).0;
                }
                self.sqrt_price = sqrt_q;
            }

            if has_next && self.sqrt_price == sqrt_next {
                crossed += 1;
                let net = self.cross_tick(next_tick);
                let net = if zero_for_one { -net } else { net };
                let active = self.liquidity as i128 + net;
                if active < 0 {
                    return Err(pool_err(format!("active liquidity underflow at tick {}", next_tick)));
                }
                self.liquidity = active as u128;
                self.tick = if zero_for_one { next_tick - 1 } else { next_tick };
            } else {
                // stopped at the limit or ran out of input inside the range
                self.tick = tick_at_sqrt_ratio(from_big(&self.sqrt_price)?)?;
            }
        }

        let amount_in = from_big(&total_in)?;
        let amount_out = from_big(&total_out)?;
        if zero_for_one {
            self.reserve0 = self.reserve0.saturating_add(amount_in);
            self.reserve1 = self
                .reserve1
                .checked_sub(amount_out)
                .ok_or_else(|| pool_err("swap output exceeds token1 reserve"))?;
        } else {
            self.reserve1 = self.reserve1.saturating_add(amount_in);
            self.reserve0 = self
                .reserve0
                .checked_sub(amount_out)
                .ok_or_else(|| pool_err("swap output exceeds token0 reserve"))?;
        }

        log::debug!(
            "sim swap zero_for_one={} in={} out={} fee={} tick={} crossed={}",
            zero_for_one,
            amount_in,
            amount_out,
            total_fee,
            self.tick,
            crossed
        );

        Ok(SwapResult {
            amount_in,
            amount_out,
            fee_paid: from_big(&total_fee)?,
            sqrt_price_x96: from_big(&self.sqrt_price)?,
            tick: self.tick,
            crossed_ticks: crossed,
        })
    }

    /// Swaps with an unbounded budget until the price sits exactly at `tick`.
    pub fn swap_to_tick(&mut self, tick: i32) -> Result<SwapResult> {
        let target = sqrt_ratio_at_tick_big(tick)?;
        if target == self.sqrt_price {
            return Ok(SwapResult {
                sqrt_price_x96: from_big(&self.sqrt_price)?,
                tick: self.tick,
                ..SwapResult::default()
            });
        }
        let zero_for_one = target < self.sqrt_price;
        self.swap(zero_for_one, U256::MAX >> 2, Some(from_big(&target)?))
    }
}

impl Pool for SimulatedPool {
    fn address(&self) -> Address {
        self.address
    }

    fn current_price(&self) -> U256 {
        from_big(&self.sqrt_price).unwrap_or_default()
    }

    fn current_tick(&self) -> i32 {
        self.tick
    }

    fn tick_spacing(&self) -> i32 {
        self.tick_spacing
    }

    fn fee_growth_global(&self) -> (U256, U256) {
        (self.fee_growth_global0, self.fee_growth_global1)
    }

    fn tick_info(&self, tick: i32) -> TickSnapshot {
        self.ticks.get(&tick).cloned().unwrap_or_default()
    }

    fn position_liquidity(&self, owner: Address, lower_tick: i32, upper_tick: i32) -> PositionSnapshot {
        self.positions
            .get(&(owner, lower_tick, upper_tick))
            .cloned()
            .unwrap_or_default()
    }

    fn mint(
        &mut self,
        owner: Address,
        lower_tick: i32,
        upper_tick: i32,
        liquidity: u128,
        aux_data: &[u8],
    ) -> Result<(U256, U256)> {
        self.check_ticks(lower_tick, upper_tick)?;
        if liquidity == 0 {
            return Err(pool_err("mint of zero liquidity"));
        }
        if liquidity > i128::MAX as u128 {
            return Err(EngineError::MathOverflow("mint liquidity"));
        }
        if !aux_data.is_empty() && aux_data != owner.as_bytes() {
            return Err(pool_err("mint callback data does not name the owner"));
        }

        self.modify_position(owner, lower_tick, upper_tick, liquidity as i128)?;
        let (amount0, amount1) = self.amounts_for(lower_tick, upper_tick, liquidity, true)?;
        self.reserve0 = self.reserve0.saturating_add(amount0);
        self.reserve1 = self.reserve1.saturating_add(amount1);
        Ok((amount0, amount1))
    }

    fn burn(&mut self, owner: Address, lower_tick: i32, upper_tick: i32, liquidity: u128) -> Result<(U256, U256)> {
        self.check_ticks(lower_tick, upper_tick)?;
        if liquidity > i128::MAX as u128 {
            return Err(EngineError::MathOverflow("burn liquidity"));
        }
        self.modify_position(owner, lower_tick, upper_tick, -(liquidity as i128))?;
        let (amount0, amount1) = self.amounts_for(lower_tick, upper_tick, liquidity, false)?;
        if let Some(position) = self.positions.get_mut(&(owner, lower_tick, upper_tick)) {
            position.tokens_owed0 = position.tokens_owed0.saturating_add(amount0);
            position.tokens_owed1 = position.tokens_owed1.saturating_add(amount1);
        }
        Ok((amount0, amount1))
    }

    fn collect(
        &mut self,
        owner: Address,
        lower_tick: i32,
        upper_tick: i32,
        max0: U256,
        max1: U256,
    ) -> Result<(U256, U256)> {
        let Some(position) = self.positions.get_mut(&(owner, lower_tick, upper_tick)) else {
            return Ok((U256::zero(), U256::zero()));
        };
        let amount0 = position.tokens_owed0.min(max0);
        let amount1 = position.tokens_owed1.min(max1);
        position.tokens_owed0 -= amount0;
        position.tokens_owed1 -= amount1;

        self.reserve0 = self
            .reserve0
            .checked_sub(amount0)
            .ok_or_else(|| pool_err("collect exceeds token0 reserve"))?;
        self.reserve1 = self
            .reserve1
            .checked_sub(amount1)
            .ok_or_else(|| pool_err("collect exceeds token1 reserve"))?;
        Ok((amount0, amount1))
    }

    fn observe(&self, seconds_agos: &[u32]) -> Result<Vec<i64>> {
        seconds_agos.iter().map(|s| self.observe_single(*s)).collect()
    }
}
