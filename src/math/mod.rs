pub mod conversion;
pub mod fee_growth;
pub mod fixed_point;
pub mod liquidity_amounts;
pub mod tick_math;
