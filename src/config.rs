use std::env;
use std::fs;
use std::str::FromStr;

use ethers::types::{Address, U256};
use thiserror::Error;

use crate::engine::guard::GuardConfig;
use crate::models::{ProtocolAddresses, ProtocolParameters};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("cannot read parameters file {path}: {source}")]
    ParametersFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol parameters rejected: {0}")]
    Parameters(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub guard: GuardConfig,
    pub parameters: ProtocolParameters,
    pub addresses: Option<ProtocolAddresses>,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

fn parse_wad_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: U256,
) -> Result<U256, ConfigError> {
    match lookup(var) {
        Some(raw) => U256::from_dec_str(raw.trim()).map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

fn parse_address(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Address>, ConfigError> {
    lookup(var)
        .map(|raw| Address::from_str(raw.trim()).map_err(|_| ConfigError::Invalid { var, value: raw }))
        .transpose()
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load configuration files (local overrides first)
        dotenv::from_filename("vault.env").ok();
        dotenv::from_filename("config/vault.env").ok();
        dotenv::dotenv().ok();

        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the configuration from any variable source. Unset variables fall
    /// back to defaults; set but unparsable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = GuardConfig::default();
        let guard = GuardConfig {
            shift_cooldown_secs: parse_or(&lookup, "SHIFT_COOLDOWN_SECS", defaults.shift_cooldown_secs)?,
            twap_period_secs: parse_or(&lookup, "TWAP_PERIOD_SECS", defaults.twap_period_secs)?,
            max_twap_deviation_ticks: parse_or(&lookup, "MAX_TWAP_DEVIATION_TICKS", defaults.max_twap_deviation_ticks)?,
        };
        if guard.max_twap_deviation_ticks < 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_TWAP_DEVIATION_TICKS",
                value: guard.max_twap_deviation_ticks.to_string(),
            });
        }

        // A JSON file supplies the base parameters; individual variables override it.
        let base = match lookup("PROTOCOL_PARAMETERS_FILE") {
            Some(path) => {
                let raw = fs::read_to_string(&path).map_err(|source| ConfigError::ParametersFile {
                    path: path.clone(),
                    source,
                })?;
                ProtocolParameters::from_json(&raw).map_err(|e| ConfigError::Parameters(e.to_string()))?
            }
            None => ProtocolParameters::default(),
        };

        let parameters = ProtocolParameters {
            shift_ratio: parse_wad_or(&lookup, "SHIFT_RATIO", base.shift_ratio)?,
            slide_ratio: parse_wad_or(&lookup, "SLIDE_RATIO", base.slide_ratio)?,
            discovery_bips: parse_or(&lookup, "DISCOVERY_BIPS", base.discovery_bips)?,
            shift_anchor_upper_bips: parse_or(&lookup, "SHIFT_ANCHOR_UPPER_BIPS", base.shift_anchor_upper_bips)?,
            slide_anchor_upper_bips: parse_or(&lookup, "SLIDE_ANCHOR_UPPER_BIPS", base.slide_anchor_upper_bips)?,
            low_balance_threshold_factor: parse_or(
                &lookup,
                "LOW_BALANCE_THRESHOLD_FACTOR",
                base.low_balance_threshold_factor,
            )?,
            high_balance_threshold_factor: parse_or(
                &lookup,
                "HIGH_BALANCE_THRESHOLD_FACTOR",
                base.high_balance_threshold_factor,
            )?,
            inflation_fee_bps: parse_or(&lookup, "INFLATION_FEE_BPS", base.inflation_fee_bps)?,
        };
        parameters
            .validate()
            .map_err(|e| ConfigError::Parameters(e.to_string()))?;

        // Protocol addresses are all-or-nothing
        let pool = parse_address(&lookup, "POOL_ADDRESS")?;
        let vault = parse_address(&lookup, "VAULT_ADDRESS")?;
        let deployer = parse_address(&lookup, "DEPLOYER_ADDRESS")?;
        let model_helper = parse_address(&lookup, "MODEL_HELPER_ADDRESS")?;
        let adaptive_supply = parse_address(&lookup, "ADAPTIVE_SUPPLY_ADDRESS")?;
        let addresses = match (pool, vault, deployer, model_helper, adaptive_supply) {
            (Some(pool), Some(vault), Some(deployer), Some(model_helper), Some(adaptive_supply)) => {
                Some(ProtocolAddresses {
                    pool,
                    vault,
                    deployer,
                    model_helper,
                    adaptive_supply,
                })
            }
            _ => None,
        };

        Ok(EngineConfig {
            guard,
            parameters,
            addresses,
        })
    }
}
