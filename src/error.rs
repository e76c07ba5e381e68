use ethers::types::{Address, U256};
use thiserror::Error;

use crate::models::PositionKind;

/// Coarse classification of engine failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not time to rebalance yet; the caller may retry once conditions change.
    PreconditionNotMet,
    /// Unsafe or degenerate state was about to be produced; the whole call aborts.
    InvariantViolation,
    /// A pool, host or token collaborator refused an operation.
    Collaborator,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("decimals {0} outside supported range [6, 18]")]
    InvalidDecimals(u8),

    #[error("tick spacing must be positive, got {0}")]
    InvalidTickSpacing(i32),

    #[error("price must be non-zero")]
    InvalidPrice,

    #[error("tick {0} is off the price grid")]
    InvalidTick(i32),

    #[error("floor range is empty: lower {lower} >= upper {upper}")]
    InvalidTicksFloor { lower: i32, upper: i32 },

    #[error("anchor range [{lower}, {upper}] overlaps or sits below floor upper tick {floor_upper}")]
    InvalidTicksAnchor { lower: i32, upper: i32, floor_upper: i32 },

    #[error("discovery lower tick {lower} must be above anchor upper tick {anchor_upper}")]
    InvalidTicksDiscovery { lower: i32, anchor_upper: i32 },

    #[error("floor can only move up: new lower tick {new} <= current lower tick {current}")]
    InvalidFloor { current: i32, new: i32 },

    #[error("computed zero liquidity for {0:?} position")]
    NoLiquidity(PositionKind),

    #[error("liquidity ratio {ratio} above shift threshold {threshold}")]
    AboveThreshold { ratio: U256, threshold: U256 },

    #[error("liquidity ratio {ratio} below slide threshold {threshold}")]
    BelowThreshold { ratio: U256, threshold: U256 },

    #[error("all three positions must hold liquidity")]
    OnlyNotEmptyPositions,

    #[error("rebalance cooldown active for another {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },

    #[error("spot tick {spot_tick} deviates from TWAP tick {twap_tick} by more than {max_deviation}")]
    PriceManipulation { spot_tick: i32, twap_tick: i32, max_deviation: i32 },

    #[error("caller {0:?} is not authorized")]
    Unauthorized(Address),

    #[error("collaborator address mismatch: expected {expected:?}, got {actual:?}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("arithmetic overflow in {0}")]
    MathOverflow(&'static str),

    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),

    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    #[error("pool error: {0}")]
    Pool(String),

    #[error("vault host error: {0}")]
    Host(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::AboveThreshold { .. }
            | EngineError::BelowThreshold { .. }
            | EngineError::OnlyNotEmptyPositions
            | EngineError::CooldownActive { .. }
            | EngineError::PriceManipulation { .. } => ErrorKind::PreconditionNotMet,

            EngineError::InsufficientBalance { .. }
            | EngineError::Pool(_)
            | EngineError::Host(_) => ErrorKind::Collaborator,

            _ => ErrorKind::InvariantViolation,
        }
    }

    /// True when re-invoking later may succeed without any configuration change.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::PreconditionNotMet
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_retryable() {
        let err = EngineError::AboveThreshold {
            ratio: U256::exp10(18),
            threshold: U256::exp10(17) * 9,
        };
        assert_eq!(err.kind(), ErrorKind::PreconditionNotMet);
        assert!(err.is_retryable());
        assert!(EngineError::CooldownActive { remaining_secs: 5 }.is_retryable());
    }

    #[test]
    fn invariant_violations_are_fatal() {
        let err = EngineError::InvalidFloor { current: 120, new: 60 };
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(!err.is_retryable());
        assert_eq!(
            EngineError::NoLiquidity(PositionKind::Anchor).kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(EngineError::Pool("boom".into()).kind(), ErrorKind::Collaborator);
    }
}
