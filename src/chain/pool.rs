use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-tick state recorded by the pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
    pub fee_growth_outside0: U256, // X128
    pub fee_growth_outside1: U256, // X128
}

/// State of one `(owner, lower, upper)` position as the pool records it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub liquidity: u128,
    pub fee_growth_inside0_last: U256, // X128
    pub fee_growth_inside1_last: U256, // X128
    pub tokens_owed0: U256,
    pub tokens_owed1: U256,
}

/// Concentrated-liquidity pool the vault provides liquidity to.
///
/// Token0 is the vault's managed token and token1 the reserve asset. All
/// calls are synchronous; a failure aborts the caller's whole operation.
pub trait Pool {
    fn address(&self) -> Address;

    /// Current Q64.96 square-root price.
    fn current_price(&self) -> U256;

    fn current_tick(&self) -> i32;

    fn tick_spacing(&self) -> i32;

    /// Global fee growth accumulators `(token0, token1)`, X128.
    fn fee_growth_global(&self) -> (U256, U256);

    /// Uninitialized ticks read as all-zero.
    fn tick_info(&self, tick: i32) -> TickSnapshot;

    /// Unknown positions read as all-zero.
    fn position_liquidity(&self, owner: Address, lower_tick: i32, upper_tick: i32) -> PositionSnapshot;

    /// Adds `liquidity` to the position; returns the token amounts the owner must pay.
    fn mint(
        &mut self,
        owner: Address,
        lower_tick: i32,
        upper_tick: i32,
        liquidity: u128,
        aux_data: &[u8],
    ) -> Result<(U256, U256)>;

    /// Removes `liquidity`; the released amounts become owed to the owner.
    fn burn(&mut self, owner: Address, lower_tick: i32, upper_tick: i32, liquidity: u128) -> Result<(U256, U256)>;

    /// Pays out up to `max0`/`max1` of what the position is owed.
    fn collect(
        &mut self,
        owner: Address,
        lower_tick: i32,
        upper_tick: i32,
        max0: U256,
        max1: U256,
    ) -> Result<(U256, U256)>;

    /// Tick cumulatives at each `seconds_ago` offset.
    fn observe(&self, seconds_agos: &[u32]) -> Result<Vec<i64>>;
}
