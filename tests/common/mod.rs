#![allow(dead_code)]

use ethers::types::{Address, U256};

use vault_rebalancer::bootstrap::{initialize_liquidity, InitialDeployment};
use vault_rebalancer::chain::{Clock, InMemoryVault, ManualClock, SimulatedPool, VaultHost};
use vault_rebalancer::engine::{AccessPolicy, GuardConfig, RebalanceCapability, Rebalancer};
use vault_rebalancer::math::tick_math::sqrt_ratio_at_tick;
use vault_rebalancer::models::{FeeAccumulator, Positions, ProtocolAddresses, ProtocolParameters, TokenAmounts, VaultEvent};
use vault_rebalancer::{EngineError, Result};

pub const T0: u64 = 1_700_000_000;
pub const FEE_PPM: u32 = 3_000;
pub const SPACING: i32 = 60;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn tokens(n: u64) -> U256 {
    U256::exp10(18) * n
}

pub fn wad_fraction(numerator: u64, denominator: u64) -> U256 {
    U256::exp10(18) * numerator / denominator
}

pub fn addresses() -> ProtocolAddresses {
    ProtocolAddresses {
        pool: Address::from([0x11; 20]),
        vault: Address::from([0x22; 20]),
        deployer: Address::from([0x33; 20]),
        model_helper: Address::from([0x44; 20]),
        adaptive_supply: Address::from([0x55; 20]),
    }
}

pub fn team() -> Address {
    Address::from([0x66; 20])
}

pub fn holder() -> Address {
    Address::from([0x77; 20])
}

pub fn policy() -> AccessPolicy {
    let a = addresses();
    AccessPolicy {
        vault: a.vault,
        deployer: a.deployer,
        manager: Address::from([0x88; 20]),
    }
}

/// Vault funding and first deployment.
#[derive(Clone, Debug)]
pub struct Setup {
    pub vault_token0: U256,
    pub vault_reserve: U256,
    pub issued_to_holder: U256,
    pub deployment: InitialDeployment,
    pub parameters: ProtocolParameters,
}

impl Default for Setup {
    fn default() -> Self {
        Setup {
            vault_token0: tokens(900_000),
            vault_reserve: tokens(100_000),
            issued_to_holder: tokens(100_000),
            deployment: InitialDeployment {
                floor_price: wad_fraction(1, 2),
                floor_reserve: tokens(90_000),
                anchor_lower_price: wad_fraction(905, 1_000),
            },
            parameters: ProtocolParameters::default(),
        }
    }
}

pub struct Harness {
    pub addresses: ProtocolAddresses,
    pub cap: RebalanceCapability,
    pub pool: SimulatedPool,
    pub host: InMemoryVault,
    pub clock: ManualClock,
    pub rebalancer: Rebalancer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_setup(Setup::default())
    }

    /// Pool at price 1 with an hour of history, vault funded and deployed.
    pub fn with_setup(setup: Setup) -> Self {
        init_logging();
        let addresses = addresses();
        let cap = policy().authorize_rebalance(addresses.deployer).expect("deployer may rebalance");
        let pool = SimulatedPool::new(
            addresses.pool,
            FEE_PPM,
            SPACING,
            sqrt_ratio_at_tick(0).expect("tick 0"),
            T0,
        )
        .expect("pool");
        let mut host = InMemoryVault::new(addresses.vault, team(), SPACING, T0)
            .with_parameters(setup.parameters)
            .expect("valid parameters");
        host.seed(setup.vault_token0, setup.vault_reserve).expect("seed vault");
        if !setup.issued_to_holder.is_zero() {
            host.issue_to(holder(), setup.issued_to_holder).expect("issue");
        }

        let mut harness = Harness {
            addresses,
            cap,
            pool,
            host,
            clock: ManualClock::at(T0),
            rebalancer: Rebalancer::new(GuardConfig::default()),
        };
        harness.advance(3_600);
        initialize_liquidity(
            &harness.cap,
            &harness.addresses,
            &mut harness.pool,
            &mut harness.host,
            &setup.deployment,
        )
        .expect("initial deployment");
        harness
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn advance(&mut self, secs: u64) {
        self.pool.advance_time(secs);
        self.clock.advance(secs);
    }

    /// Trades the pool to `tick` and lets the price settle past the TWAP window.
    pub fn move_price_to(&mut self, tick: i32) {
        self.pool.swap_to_tick(tick).expect("swap");
        self.advance(600);
    }
}

/// Host that forwards to an [`InMemoryVault`] but can report parameters it
/// never validated and refuse to mint, like a misbehaving vault contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedVault {
    pub inner: InMemoryVault,
    pub parameters: Option<ProtocolParameters>,
    pub refuse_mints: bool,
}

impl ScriptedVault {
    pub fn new(inner: InMemoryVault) -> Self {
        Self {
            inner,
            parameters: None,
            refuse_mints: false,
        }
    }
}

impl VaultHost for ScriptedVault {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn protocol_parameters(&self) -> ProtocolParameters {
        self.parameters.clone().unwrap_or_else(|| self.inner.protocol_parameters())
    }

    fn set_protocol_parameters(&mut self, parameters: ProtocolParameters) -> Result<()> {
        self.inner.set_protocol_parameters(parameters)
    }

    fn positions(&self) -> Positions {
        self.inner.positions()
    }

    fn update_positions(&mut self, positions: Positions) -> Result<()> {
        self.inner.update_positions(positions)
    }

    fn token_balances(&self) -> TokenAmounts {
        self.inner.token_balances()
    }

    fn debit(&mut self, amounts: &TokenAmounts) -> Result<()> {
        self.inner.debit(amounts)
    }

    fn credit(&mut self, amounts: &TokenAmounts) -> Result<()> {
        self.inner.credit(amounts)
    }

    fn total_supply(&self) -> U256 {
        self.inner.total_supply()
    }

    fn mint_tokens(&mut self, to: Address, amount: U256) -> Result<()> {
        if self.refuse_mints {
            return Err(EngineError::Host(format!("mint of {} to {:?} refused", amount, to)));
        }
        self.inner.mint_tokens(to, amount)
    }

    fn burn_tokens(&mut self, amount: U256) -> Result<()> {
        self.inner.burn_tokens(amount)
    }

    fn team_multisig(&self) -> Address {
        self.inner.team_multisig()
    }

    fn time_since_last_mint(&self, now: u64) -> u64 {
        self.inner.time_since_last_mint(now)
    }

    fn record_mint_time(&mut self, now: u64) {
        self.inner.record_mint_time(now)
    }

    fn protocol_held_balance(&self) -> U256 {
        self.inner.protocol_held_balance()
    }

    fn record_fees(&mut self, fees: &TokenAmounts) {
        self.inner.record_fees(fees)
    }

    fn fee_accumulator(&self) -> FeeAccumulator {
        self.inner.fee_accumulator()
    }

    fn emit(&mut self, event: VaultEvent) {
        self.inner.emit(event)
    }
}
