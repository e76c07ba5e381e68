use std::collections::HashMap;

use ethers::types::{Address, U256};

use crate::error::{EngineError, Result};
use crate::models::{FeeAccumulator, Positions, ProtocolParameters, TokenAmounts, VaultEvent};

/// The vault contract surrounding the engine: token custody, supply control,
/// stored positions and parameters.
pub trait VaultHost {
    /// Identity the vault's pool positions are recorded under.
    fn address(&self) -> Address;

    fn protocol_parameters(&self) -> ProtocolParameters;

    fn set_protocol_parameters(&mut self, parameters: ProtocolParameters) -> Result<()>;

    fn positions(&self) -> Positions;

    fn update_positions(&mut self, positions: Positions) -> Result<()>;

    /// Idle `(token0, token1)` held by the vault.
    fn token_balances(&self) -> TokenAmounts;

    /// Pays tokens out of the vault (into the pool).
    fn debit(&mut self, amounts: &TokenAmounts) -> Result<()>;

    /// Receives tokens (from the pool).
    fn credit(&mut self, amounts: &TokenAmounts) -> Result<()>;

    fn total_supply(&self) -> U256;

    fn mint_tokens(&mut self, to: Address, amount: U256) -> Result<()>;

    /// Burns from the vault's own token0 balance.
    fn burn_tokens(&mut self, amount: U256) -> Result<()>;

    fn team_multisig(&self) -> Address;

    fn time_since_last_mint(&self, now: u64) -> u64;

    fn record_mint_time(&mut self, now: u64);

    /// Token0 owned by the protocol and therefore not circulating.
    fn protocol_held_balance(&self) -> U256;

    fn record_fees(&mut self, fees: &TokenAmounts);

    fn fee_accumulator(&self) -> FeeAccumulator;

    fn emit(&mut self, event: VaultEvent);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InMemoryVault {
    address: Address,
    team_multisig: Address,
    parameters: ProtocolParameters,
    positions: Positions,
    balances: TokenAmounts,
    total_supply: U256,
    holders: HashMap<Address, U256>,
    held_elsewhere: U256,
    last_mint_at: u64,
    fees: FeeAccumulator,
    events: Vec<VaultEvent>,
}

impl InMemoryVault {
    pub fn new(address: Address, team_multisig: Address, tick_spacing: i32, created_at: u64) -> Self {
        Self {
            address,
            team_multisig,
            parameters: ProtocolParameters::default(),
            positions: Positions::empty(tick_spacing),
            balances: TokenAmounts::default(),
            total_supply: U256::zero(),
            holders: HashMap::new(),
            held_elsewhere: U256::zero(),
            last_mint_at: created_at,
            fees: FeeAccumulator::default(),
            events: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: ProtocolParameters) -> Result<Self> {
        parameters.validate()?;
        self.parameters = parameters;
        Ok(self)
    }

    /// Mints token0 into the vault and deposits token1 reserve.
    pub fn seed(&mut self, token0: U256, token1: U256) -> Result<()> {
        self.total_supply = self
            .total_supply
            .checked_add(token0)
            .ok_or(EngineError::MathOverflow("total supply"))?;
        self.credit(&TokenAmounts::new(token0, token1))
    }

    /// Mints token0 to an outside holder.
    pub fn issue_to(&mut self, holder: Address, amount: U256) -> Result<()> {
        self.mint_tokens(holder, amount)
    }

    /// Protocol-owned token0 kept outside the vault (staking, lending).
    pub fn set_held_elsewhere(&mut self, amount: U256) {
        self.held_elsewhere = amount;
    }

    pub fn holder_balance(&self, holder: Address) -> U256 {
        self.holders.get(&holder).copied().unwrap_or_default()
    }

    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }
}

impl VaultHost for InMemoryVault {
    fn address(&self) -> Address {
        self.address
    }

    fn protocol_parameters(&self) -> ProtocolParameters {
        self.parameters.clone()
    }

    fn set_protocol_parameters(&mut self, parameters: ProtocolParameters) -> Result<()> {
        parameters.validate()?;
        self.parameters = parameters;
        self.emit(VaultEvent::ParametersUpdated);
        Ok(())
    }

    fn positions(&self) -> Positions {
        self.positions.clone()
    }

    fn update_positions(&mut self, positions: Positions) -> Result<()> {
        positions.check_ordering()?;
        self.positions = positions;
        Ok(())
    }

    fn token_balances(&self) -> TokenAmounts {
        self.balances
    }

    fn debit(&mut self, amounts: &TokenAmounts) -> Result<()> {
        if amounts.amount0 > self.balances.amount0 {
            return Err(EngineError::InsufficientBalance {
                needed: amounts.amount0,
                available: self.balances.amount0,
            });
        }
        if amounts.amount1 > self.balances.amount1 {
            return Err(EngineError::InsufficientBalance {
                needed: amounts.amount1,
                available: self.balances.amount1,
            });
        }
        self.balances.amount0 -= amounts.amount0;
        self.balances.amount1 -= amounts.amount1;
        Ok(())
    }

    fn credit(&mut self, amounts: &TokenAmounts) -> Result<()> {
        self.balances = self.balances.checked_add(amounts)?;
        Ok(())
    }

    fn total_supply(&self) -> U256 {
        self.total_supply
    }

    fn mint_tokens(&mut self, to: Address, amount: U256) -> Result<()> {
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow("total supply"))?;
        if to == self.address {
            self.balances.amount0 = self
                .balances
                .amount0
                .checked_add(amount)
                .ok_or(EngineError::MathOverflow("vault balance"))?;
        } else {
            let balance = self.holders.entry(to).or_default();
            *balance = balance.saturating_add(amount);
        }
        Ok(())
    }

    fn burn_tokens(&mut self, amount: U256) -> Result<()> {
        if amount > self.balances.amount0 {
            return Err(EngineError::InsufficientBalance {
                needed: amount,
                available: self.balances.amount0,
            });
        }
        self.balances.amount0 -= amount;
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    fn team_multisig(&self) -> Address {
        self.team_multisig
    }

    fn time_since_last_mint(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_mint_at)
    }

    fn record_mint_time(&mut self, now: u64) {
        self.last_mint_at = now;
    }

    fn protocol_held_balance(&self) -> U256 {
        self.balances.amount0.saturating_add(self.held_elsewhere)
    }

    fn record_fees(&mut self, fees: &TokenAmounts) {
        self.fees.record(fees);
    }

    fn fee_accumulator(&self) -> FeeAccumulator {
        self.fees.clone()
    }

    fn emit(&mut self, event: VaultEvent) {
        log::debug!("vault {:?} event {:?}", self.address, event);
        self.events.push(event);
    }
}
