use std::ops::Index;

use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::math::fixed_point::WAD;

/// The three managed ranges, ordered by ascending price.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionKind {
    Floor = 0,
    Anchor = 1,
    Discovery = 2,
}

impl PositionKind {
    pub const ALL: [PositionKind; 3] = [PositionKind::Floor, PositionKind::Anchor, PositionKind::Discovery];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub liquidity: u128,
    pub price: U256, // WAD price at lower_tick
    pub tick_spacing: i32,
    pub kind: PositionKind,
}

impl LiquidityPosition {
    /// Placeholder for a range that has not been deployed yet.
    pub fn empty(kind: PositionKind, tick_spacing: i32) -> Self {
        Self {
            lower_tick: 0,
            upper_tick: 0,
            liquidity: 0,
            price: U256::zero(),
            tick_spacing,
            kind,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.liquidity == 0
    }

    /// Range shape check: non-empty and on the grid.
    pub fn validate(&self) -> Result<()> {
        if self.tick_spacing <= 0 {
            return Err(EngineError::InvalidTickSpacing(self.tick_spacing));
        }
        if self.lower_tick % self.tick_spacing != 0 {
            return Err(EngineError::InvalidTick(self.lower_tick));
        }
        if self.upper_tick % self.tick_spacing != 0 {
            return Err(EngineError::InvalidTick(self.upper_tick));
        }
        if self.lower_tick >= self.upper_tick {
            return Err(match self.kind {
                PositionKind::Floor => EngineError::InvalidTicksFloor {
                    lower: self.lower_tick,
                    upper: self.upper_tick,
                },
                PositionKind::Anchor => EngineError::InvalidTicksAnchor {
                    lower: self.lower_tick,
                    upper: self.upper_tick,
                    floor_upper: self.lower_tick,
                },
                PositionKind::Discovery => EngineError::InvalidTicksDiscovery {
                    lower: self.lower_tick,
                    anchor_upper: self.upper_tick,
                },
            });
        }
        Ok(())
    }
}

/// Floor, Anchor and Discovery, addressed by [`PositionKind`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positions([LiquidityPosition; 3]);

impl Positions {
    pub fn new(floor: LiquidityPosition, anchor: LiquidityPosition, discovery: LiquidityPosition) -> Result<Self> {
        let slots = [floor, anchor, discovery];
        for (slot, kind) in slots.iter().zip(PositionKind::ALL) {
            if slot.kind != kind {
                return Err(EngineError::InvalidParameters(format!(
                    "slot {:?} holds a {:?} position",
                    kind, slot.kind
                )));
            }
        }
        Ok(Self(slots))
    }

    pub fn empty(tick_spacing: i32) -> Self {
        Self(PositionKind::ALL.map(|kind| LiquidityPosition::empty(kind, tick_spacing)))
    }

    #[inline]
    pub fn floor(&self) -> &LiquidityPosition {
        &self.0[PositionKind::Floor.index()]
    }

    #[inline]
    pub fn anchor(&self) -> &LiquidityPosition {
        &self.0[PositionKind::Anchor.index()]
    }

    #[inline]
    pub fn discovery(&self) -> &LiquidityPosition {
        &self.0[PositionKind::Discovery.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiquidityPosition> {
        self.0.iter()
    }

    pub fn is_deployed(&self) -> bool {
        self.0.iter().all(|p| !p.is_empty())
    }

    /// `Floor.upper <= Anchor.lower` and `Anchor.upper <= Discovery.lower`.
    pub fn check_ordering(&self) -> Result<()> {
        for p in self.iter() {
            p.validate()?;
        }
        let (floor, anchor, discovery) = (self.floor(), self.anchor(), self.discovery());
        if anchor.lower_tick < floor.upper_tick {
            return Err(EngineError::InvalidTicksAnchor {
                lower: anchor.lower_tick,
                upper: anchor.upper_tick,
                floor_upper: floor.upper_tick,
            });
        }
        if discovery.lower_tick < anchor.upper_tick {
            return Err(EngineError::InvalidTicksDiscovery {
                lower: discovery.lower_tick,
                anchor_upper: anchor.upper_tick,
            });
        }
        Ok(())
    }
}

impl Index<PositionKind> for Positions {
    type Output = LiquidityPosition;

    fn index(&self, kind: PositionKind) -> &LiquidityPosition {
        &self.0[kind.index()]
    }
}

/// Tunable thresholds owned by the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub shift_ratio: U256, // WAD
    pub slide_ratio: U256, // WAD
    pub discovery_bips: u32,
    pub shift_anchor_upper_bips: u32,
    pub slide_anchor_upper_bips: u32,
    pub low_balance_threshold_factor: u64,
    pub high_balance_threshold_factor: u64,
    pub inflation_fee_bps: u32,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            shift_ratio: U256::exp10(17) * 9,
            slide_ratio: U256::exp10(16) * 115,
            discovery_bips: 30_000,
            shift_anchor_upper_bips: 300,
            slide_anchor_upper_bips: 500,
            low_balance_threshold_factor: 100,
            high_balance_threshold_factor: 50,
            inflation_fee_bps: 500,
        }
    }
}

impl ProtocolParameters {
    pub fn from_json(raw: &str) -> Result<Self> {
        let params: ProtocolParameters = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidParameters(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let wad = U256::from(WAD);
        if self.shift_ratio.is_zero() || self.shift_ratio >= wad {
            return Err(EngineError::InvalidParameters("shift ratio must lie in (0, 1)".into()));
        }
        if self.slide_ratio <= wad {
            return Err(EngineError::InvalidParameters("slide ratio must exceed 1".into()));
        }
        if self.discovery_bips == 0 {
            return Err(EngineError::InvalidParameters("discovery width must be non-zero".into()));
        }
        if self.low_balance_threshold_factor == 0 || self.high_balance_threshold_factor == 0 {
            return Err(EngineError::InvalidParameters("balance threshold factors must be non-zero".into()));
        }
        if self.inflation_fee_bps > 10_000 {
            return Err(EngineError::InvalidParameters("inflation fee above 100%".into()));
        }
        Ok(())
    }
}

/// Collaborator identities handed to every engine call. Never persisted by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAddresses {
    pub pool: Address,
    pub vault: Address,
    pub deployer: Address,
    pub model_helper: Address,
    pub adaptive_supply: Address,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmounts {
    pub amount0: U256,
    pub amount1: U256,
}

impl TokenAmounts {
    pub fn new(amount0: U256, amount1: U256) -> Self {
        Self { amount0, amount1 }
    }

    pub fn checked_add(&self, other: &TokenAmounts) -> Result<TokenAmounts> {
        Ok(TokenAmounts {
            amount0: self
                .amount0
                .checked_add(other.amount0)
                .ok_or(EngineError::MathOverflow("token amount add"))?,
            amount1: self
                .amount1
                .checked_add(other.amount1)
                .ok_or(EngineError::MathOverflow("token amount add"))?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.amount0.is_zero() && self.amount1.is_zero()
    }
}

/// Running total of trading fees collected from the vault's ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAccumulator {
    pub total: TokenAmounts,
    pub collections: u64,
}

impl FeeAccumulator {
    pub fn record(&mut self, fees: &TokenAmounts) {
        self.total.amount0 = self.total.amount0.saturating_add(fees.amount0);
        self.total.amount1 = self.total.amount1.saturating_add(fees.amount1);
        self.collections += 1;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    LiquidityInitialized,
    Shift,
    Slide,
    ParametersUpdated,
}

/// Token supply changes made by a rebalance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyChange {
    pub minted_to_vault: U256,
    pub minted_to_team: U256,
    pub burned: U256,
}

impl SupplyChange {
    pub fn total_minted(&self) -> U256 {
        self.minted_to_vault.saturating_add(self.minted_to_team)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub event: VaultEvent,
    pub liquidity_ratio: U256,
    pub skimmed: U256,
    pub positions: Positions,
    pub fees: TokenAmounts,
    pub supply: SupplyChange,
    pub executed_at: u64,
}

impl RebalanceOutcome {
    pub fn executed_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.executed_at as i64, 0).single()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeInfo {
    pub kind: PositionKind,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
    pub fees: TokenAmounts,
    pub capacity: U256,
}

/// Read-only snapshot of a vault's liquidity model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultInfo {
    pub liquidity_ratio: U256,
    pub spot_price: U256,
    pub intrinsic_minimum_value: U256,
    pub circulating_supply: U256,
    pub total_supply: U256,
    pub ranges: Vec<RangeInfo>,
    pub spot_price_display: Option<Decimal>,
    pub imv_display: Option<Decimal>,
}

/// WAD fixed point to a human-readable decimal; `None` when it does not fit.
pub fn wad_to_decimal(value: U256) -> Option<Decimal> {
    if value > U256::from(i128::MAX as u128) {
        return None;
    }
    Decimal::try_from_i128_with_scale(value.as_u128() as i128, 18).ok()
}
