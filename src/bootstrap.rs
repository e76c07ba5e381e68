use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::chain::pool::Pool;
use crate::chain::vault_host::VaultHost;
use crate::config::EngineConfig;
use crate::engine::auth::RebalanceCapability;
use crate::engine::deployer::{deploy_anchor, deploy_discovery, deploy_floor};
use crate::engine::model::spot_price;
use crate::engine::rebalance::Rebalancer;
use crate::engine::work_unit::WorkUnit;
use crate::error::{EngineError, Result};
use crate::math::conversion::{compute_single_tick, PRICE_DECIMALS};
use crate::math::fixed_point::scale_up_bps;
use crate::models::{Positions, ProtocolAddresses, VaultEvent};

/// Everything the embedding application needs to drive one vault.
#[derive(Debug)]
pub struct EngineState {
    pub addresses: ProtocolAddresses,
    pub rebalancer: Rebalancer,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let addresses = config
            .addresses
            .clone()
            .ok_or_else(|| EngineError::InvalidParameters("protocol addresses are not configured".into()))?;
        config.parameters.validate()?;
        Ok(EngineState {
            addresses,
            rebalancer: Rebalancer::new(config.guard.clone()),
        })
    }
}

/// Installs `env_logger` reading `RUST_LOG`. A second call is a no-op.
pub fn init_logging() {
    if env_logger::Builder::from_default_env().try_init().is_err() {
        log::debug!("logger already initialised");
    }
}

/// Prices and budget for the first deployment of the three ranges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialDeployment {
    pub floor_price: U256,        // WAD
    pub floor_reserve: U256,      // token1 put into the Floor
    pub anchor_lower_price: U256, // WAD
}

/// Deploys Floor, Anchor and Discovery for a vault with no live ranges.
///
/// Floor takes `floor_reserve` at `floor_price`. Anchor runs from
/// `anchor_lower_price` (never below Floor) up to spot plus the shift anchor
/// width and takes the rest of the vault's balances. Discovery gets whatever
/// token0 remains.
pub fn initialize_liquidity<P, H>(
    cap: &RebalanceCapability,
    addresses: &ProtocolAddresses,
    pool: &mut P,
    host: &mut H,
    deployment: &InitialDeployment,
) -> Result<Positions>
where
    P: Pool + Clone,
    H: VaultHost + Clone,
{
    cap.check(addresses, pool, host)?;
    if host.positions().iter().any(|p| !p.is_empty()) {
        return Err(EngineError::InvalidParameters("liquidity already initialized".into()));
    }
    let params = host.protocol_parameters();
    let spacing = pool.tick_spacing();

    let mut unit = WorkUnit::begin(pool, host);
    let (pool, host) = unit.parts();

    let floor = deploy_floor(pool, host, deployment.floor_price, deployment.floor_reserve)?;

    let (anchor_lower, _) = compute_single_tick(deployment.anchor_lower_price, spacing, PRICE_DECIMALS)?;
    let spot = spot_price(pool)?;
    let budget = host.token_balances();
    let anchor = deploy_anchor(
        pool,
        host,
        &floor,
        anchor_lower.max(floor.upper_tick),
        scale_up_bps(spot, params.shift_anchor_upper_bips)?,
        budget,
    )?;

    let remaining0 = host.token_balances().amount0;
    let discovery = deploy_discovery(pool, host, &anchor, params.discovery_bips, remaining0)?;

    let positions = Positions::new(floor, anchor, discovery)?;
    host.update_positions(positions.clone())?;
    host.emit(VaultEvent::LiquidityInitialized);
    unit.commit();

    log::info!(
        "liquidity initialized: floor [{}, {}] anchor [{}, {}] discovery [{}, {}]",
        positions.floor().lower_tick,
        positions.floor().upper_tick,
        positions.anchor().lower_tick,
        positions.anchor().upper_tick,
        positions.discovery().lower_tick,
        positions.discovery().upper_tick
    );
    Ok(positions)
}
