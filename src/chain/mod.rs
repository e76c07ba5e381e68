pub mod clock;
pub mod pool;
pub mod sim_pool;
pub mod supply;
pub mod vault_host;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pool::{Pool, PositionSnapshot, TickSnapshot};
pub use sim_pool::{SimulatedPool, SwapResult};
pub use supply::{AdaptiveSupply, PremiumSupplyController};
pub use vault_host::{InMemoryVault, VaultHost};
