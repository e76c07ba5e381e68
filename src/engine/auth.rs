// Explicit capabilities in place of ambient caller identity. The embedding
// application authorizes a caller once and hands the capability to the engine.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::chain::pool::Pool;
use crate::chain::vault_host::VaultHost;
use crate::error::{EngineError, Result};
use crate::models::{ProtocolAddresses, ProtocolParameters};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub vault: Address,
    pub deployer: Address,
    pub manager: Address,
}

/// Permission to run shift, slide and initial deployment for one vault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebalanceCapability {
    vault: Address,
    holder: Address,
}

/// Permission to change a vault's protocol parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerCapability {
    vault: Address,
    holder: Address,
}

impl AccessPolicy {
    pub fn authorize_rebalance(&self, caller: Address) -> Result<RebalanceCapability> {
        if caller != self.vault && caller != self.deployer {
            return Err(EngineError::Unauthorized(caller));
        }
        Ok(RebalanceCapability {
            vault: self.vault,
            holder: caller,
        })
    }

    pub fn authorize_manager(&self, caller: Address) -> Result<ManagerCapability> {
        if caller != self.manager {
            return Err(EngineError::Unauthorized(caller));
        }
        Ok(ManagerCapability {
            vault: self.vault,
            holder: caller,
        })
    }
}

impl RebalanceCapability {
    pub fn vault(&self) -> Address {
        self.vault
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    /// Capability, addresses and live collaborators must all name the same vault and pool.
    pub fn check<P: Pool, H: VaultHost>(&self, addresses: &ProtocolAddresses, pool: &P, host: &H) -> Result<()> {
        if self.vault != addresses.vault {
            return Err(EngineError::Unauthorized(self.holder));
        }
        if pool.address() != addresses.pool {
            return Err(EngineError::AddressMismatch {
                expected: addresses.pool,
                actual: pool.address(),
            });
        }
        if host.address() != addresses.vault {
            return Err(EngineError::AddressMismatch {
                expected: addresses.vault,
                actual: host.address(),
            });
        }
        Ok(())
    }
}

impl ManagerCapability {
    pub fn vault(&self) -> Address {
        self.vault
    }
}

/// Validates and stores new parameters on the vault the capability was issued for.
pub fn update_protocol_parameters<H: VaultHost>(
    cap: &ManagerCapability,
    host: &mut H,
    parameters: ProtocolParameters,
) -> Result<()> {
    if cap.vault != host.address() {
        return Err(EngineError::Unauthorized(cap.holder));
    }
    host.set_protocol_parameters(parameters)?;
    log::info!("protocol parameters updated for vault {:?}", cap.vault);
    Ok(())
}
