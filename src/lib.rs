// lib.rs - Rebalancing engine for a three-range concentrated-liquidity vault

pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod math;
pub mod models;

pub use error::{EngineError, ErrorKind, Result};
