//! DEX Aggregator Routing Engine
//!
//! Discovers liquidity across v2 and v3 DEXes, enumerates direct and
//! multi-hop paths, optionally splits the input across parallel routes,
//! ranks candidates by gas-adjusted net output and assembles atomic
//! executor calldata with dynamic balance injection.

pub mod amm;
pub mod config;
pub mod contracts;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod plan;
pub mod quote;
pub mod rpc;
pub mod split;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use config::{ChainConfig, DexConfig, RouterConfig, RouterSettings};
pub use engine::RouterEngine;
pub use error::{Result, RouterError};
pub use types::{
    ExecutorPlan, PoolSnapshot, PoolVersion, PriceQuote, QuotePreference, SplitLeg, Token,
};
