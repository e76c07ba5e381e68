use num_integer::Integer;
use serde::{Deserialize, Serialize};

use crate::chain::pool::Pool;
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    pub shift_cooldown_secs: u64,
    pub twap_period_secs: u32,
    pub max_twap_deviation_ticks: i32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            shift_cooldown_secs: 300,
            twap_period_secs: 120,
            max_twap_deviation_ticks: 200,
        }
    }
}

/// Rate limit and price-manipulation check run before every shift and slide.
#[derive(Clone, Debug, Default)]
pub struct RebalanceGuard {
    config: GuardConfig,
    last_rebalance_at: Option<u64>,
}

impl RebalanceGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            last_rebalance_at: None,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn last_rebalance_at(&self) -> Option<u64> {
        self.last_rebalance_at
    }

    pub fn check_cooldown(&self, now: u64) -> Result<()> {
        let Some(last) = self.last_rebalance_at else {
            return Ok(());
        };
        let ready_at = last.saturating_add(self.config.shift_cooldown_secs);
        if now < ready_at {
            return Err(EngineError::CooldownActive {
                remaining_secs: ready_at - now,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, now: u64) {
        self.last_rebalance_at = Some(now);
    }

    /// Arithmetic-mean tick over the configured window.
    pub fn twap_tick<P: Pool>(&self, pool: &P) -> Result<i32> {
        let period = self.config.twap_period_secs;
        if period == 0 {
            return Ok(pool.current_tick());
        }
        let cumulatives = pool.observe(&[period, 0])?;
        let [older, newer] = cumulatives[..] else {
            return Err(EngineError::Pool(format!(
                "observe returned {} values for 2 windows",
                cumulatives.len()
            )));
        };
        let mean = Integer::div_floor(&(newer - older), &i64::from(period));
        i32::try_from(mean).map_err(|_| EngineError::MathOverflow("twap tick"))
    }

    /// Fails when spot has moved further from the TWAP than the configured tolerance.
    pub fn check_twap<P: Pool>(&self, pool: &P) -> Result<()> {
        let twap_tick = self.twap_tick(pool)?;
        let spot_tick = pool.current_tick();
        let deviation = (i64::from(spot_tick) - i64::from(twap_tick)).abs();
        log::debug!("spot tick {} twap tick {} deviation {}", spot_tick, twap_tick, deviation);
        if deviation > i64::from(self.config.max_twap_deviation_ticks) {
            return Err(EngineError::PriceManipulation {
                spot_tick,
                twap_tick,
                max_deviation: self.config.max_twap_deviation_ticks,
            });
        }
        Ok(())
    }
}
