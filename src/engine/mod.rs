pub mod auth;
pub mod deployer;
pub mod guard;
pub mod model;
pub mod rebalance;
pub mod underlying;
pub mod work_unit;

pub use auth::{update_protocol_parameters, AccessPolicy, ManagerCapability, RebalanceCapability};
pub use deployer::{
    deploy_anchor, deploy_discovery, deploy_floor, deploy_position, shift_floor, withdraw_position, DeployParams,
    Withdrawal,
};
pub use guard::{GuardConfig, RebalanceGuard};
pub use model::{
    circulating_supply, intrinsic_minimum_value, liquidity_ratio, position_capacity, spot_price, vault_info,
};
pub use rebalance::{compute_skim, Rebalancer};
pub use underlying::{compute_fees_earned, fees_earned, underlying_balances, UnderlyingBalances};
pub use work_unit::WorkUnit;
