use ethers::types::U256;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::math::fixed_point::{div_wad, from_big, to_big, WAD};

const SECONDS_PER_DAY: u64 = 86_400;
const BPS: u64 = 10_000;

/// Policy deciding how many tokens to mint when Discovery runs low.
pub trait AdaptiveSupply {
    /// Returning zero, or more than `total_supply`, makes the engine fall back
    /// to its fixed fraction of circulating supply.
    fn compute_mint_amount(&self, total_supply: U256, time_elapsed: u64, spot_price: U256, imv: U256) -> U256;
}

/// Mints in proportion to elapsed time and the spot premium over IMV.
///
/// `total_supply * daily_rate_bps/10_000 * elapsed/86_400 * min(premium, max_premium)`
/// with `premium = (spot - imv) / imv` as WAD.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumSupplyController {
    pub daily_rate_bps: u32,
    pub max_premium: U256, // WAD
}

impl Default for PremiumSupplyController {
    fn default() -> Self {
        Self {
            daily_rate_bps: 100,
            max_premium: U256::exp10(18) * 2,
        }
    }
}

impl AdaptiveSupply for PremiumSupplyController {
    fn compute_mint_amount(&self, total_supply: U256, time_elapsed: u64, spot_price: U256, imv: U256) -> U256 {
        if imv.is_zero() || spot_price <= imv || time_elapsed == 0 {
            return U256::zero();
        }
        let premium = match div_wad(spot_price - imv, imv) {
            Ok(p) => p.min(self.max_premium),
            Err(e) => {
                log::warn!("premium computation failed: {}", e);
                return U256::zero();
            }
        };

        let numerator = to_big(total_supply)
            * BigInt::from(self.daily_rate_bps)
            * BigInt::from(time_elapsed)
            * to_big(premium);
        let denominator = BigInt::from(BPS) * BigInt::from(SECONDS_PER_DAY) * BigInt::from(WAD);
        match from_big(&(numerator / denominator)) {
            Ok(amount) => amount,
            Err(e) => {
                log::warn!("mint amount does not fit: {}", e);
                U256::zero()
            }
        }
    }
}
