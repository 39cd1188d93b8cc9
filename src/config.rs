//! Configuration management
//!
//! Chain, DEX and engine settings loaded from a TOML file, with RPC URL
//! overrides from the environment (`<CHAINKEY>_RPC_URLS`, comma
//! separated). Settings all have defaults; a minimal config is one chain
//! with one DEX.

use crate::error::{Result, RouterError};
use crate::types::{DexProtocol, PoolVersion};
use alloy::primitives::Address;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Multicall3 deployed address (same on all EVM chains including Polygon)
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Top-level configuration: engine settings plus one entry per chain.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub settings: RouterSettings,
    #[serde(rename = "chain")]
    pub chains: Vec<ChainConfig>,
}

/// One supported chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Stable key used in requests ("polygon", "base", ...)
    pub key: String,
    /// Numeric chain id (137, 8453, ...)
    pub numeric_id: u32,
    /// Display symbol of the native coin ("POL", "ETH", ...)
    pub native_symbol: String,
    /// ERC-20 wrapper of the native coin
    pub wrapped_native: Address,
    /// Deployed swap executor the assembler targets
    pub executor: Address,
    #[serde(rename = "dex")]
    pub dexes: Vec<DexConfig>,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,
    /// Skip merging the built-in public endpoint registry
    #[serde(default)]
    pub disable_public_registry: bool,
    /// Intermediate tokens considered for multi-hop routing
    #[serde(default)]
    pub intermediates: Vec<Address>,
    #[serde(default = "default_multicall3")]
    pub multicall3: Address,
    /// Optional batch reader contract fusing v2 pair reads
    #[serde(default)]
    pub lens: Option<Address>,
    /// Pools with either v2 reserve below this are dropped (raw units)
    #[serde(default = "default_min_v2_reserve")]
    pub min_v2_reserve: u128,
    /// Pools with active v3 liquidity below this are dropped
    #[serde(default = "default_min_v3_liquidity")]
    pub min_v3_liquidity: u128,
}

impl ChainConfig {
    pub fn find_dex(&self, dex_id: &str) -> Option<&DexConfig> {
        self.dexes.iter().find(|d| d.id == dex_id)
    }
}

/// One DEX deployment on a chain.
#[derive(Debug, Clone, Deserialize)]
pub struct DexConfig {
    pub id: String,
    pub protocol: DexProtocol,
    pub version: PoolVersion,
    pub factory: Address,
    pub router: Address,
    #[serde(default)]
    pub quoter: Option<Address>,
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: Vec<u32>,
    /// Selects the SwapRouter02 calldata layout (no deadline field)
    #[serde(default)]
    pub use_router02: bool,
}

/// Engine tunables. Defaults match production behavior; tests override
/// individual fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    #[serde(default = "default_max_hop_depth")]
    pub max_hop_depth: u8,
    #[serde(default = "default_max_split_legs")]
    pub max_split_legs: usize,
    #[serde(default = "default_min_leg_ratio_bps")]
    pub min_leg_ratio_bps: u16,
    #[serde(default = "default_convergence_threshold_bps")]
    pub convergence_threshold_bps: u16,
    #[serde(default = "default_max_optimizer_iterations")]
    pub max_optimizer_iterations: u32,
    #[serde(default = "default_split_candidate_cap")]
    pub split_candidate_cap: usize,
    /// Extra gas units charged per split leg beyond the first
    #[serde(default = "default_split_leg_gas_overhead")]
    pub split_leg_gas_overhead: u64,
    /// Safety haircut applied to interior hop inputs
    #[serde(default = "default_interhop_buffer_bps")]
    pub interhop_buffer_bps: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
    #[serde(default = "default_rank_ttl_secs")]
    pub rank_ttl_secs: u64,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_multicall3() -> Address {
    Address::from_str(MULTICALL3_ADDRESS).expect("valid constant")
}
fn default_min_v2_reserve() -> u128 {
    1_000
}
fn default_min_v3_liquidity() -> u128 {
    1_000
}
fn default_fee_tiers() -> Vec<u32> {
    vec![500, 3000, 10000]
}
fn default_max_hop_depth() -> u8 {
    2
}
fn default_max_split_legs() -> usize {
    3
}
fn default_min_leg_ratio_bps() -> u16 {
    500
}
fn default_convergence_threshold_bps() -> u16 {
    10
}
fn default_max_optimizer_iterations() -> u32 {
    50
}
fn default_split_candidate_cap() -> usize {
    6
}
fn default_split_leg_gas_overhead() -> u64 {
    80_000
}
fn default_interhop_buffer_bps() -> u16 {
    10
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_probe_concurrency() -> usize {
    4
}
fn default_rank_ttl_secs() -> u64 {
    60
}
fn default_token_ttl_secs() -> u64 {
    300
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_hop_depth: default_max_hop_depth(),
            max_split_legs: default_max_split_legs(),
            min_leg_ratio_bps: default_min_leg_ratio_bps(),
            convergence_threshold_bps: default_convergence_threshold_bps(),
            max_optimizer_iterations: default_max_optimizer_iterations(),
            split_candidate_cap: default_split_candidate_cap(),
            split_leg_gas_overhead: default_split_leg_gas_overhead(),
            interhop_buffer_bps: default_interhop_buffer_bps(),
            request_timeout_ms: default_request_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_concurrency: default_probe_concurrency(),
            rank_ttl_secs: default_rank_ttl_secs(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file and apply environment
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RouterError::InvalidConfig(format!(
                "failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RouterError::InvalidConfig(format!("TOML parse error: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `<CHAINKEY>_RPC_URLS` (comma separated) replaces the configured
    /// primary endpoints for that chain.
    pub fn apply_env_overrides(&mut self) {
        for chain in &mut self.chains {
            let var = format!("{}_RPC_URLS", chain.key.to_uppercase());
            if let Ok(urls) = std::env::var(&var) {
                let parsed: Vec<String> = urls
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if !parsed.is_empty() {
                    chain.rpc_urls = parsed;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(RouterError::InvalidConfig("no chains configured".into()));
        }
        for chain in &self.chains {
            if chain.key.is_empty() {
                return Err(RouterError::InvalidConfig("empty chain key".into()));
            }
            if chain.dexes.is_empty() {
                return Err(RouterError::InvalidConfig(format!(
                    "chain {} has no DEXes",
                    chain.key
                )));
            }
            if chain.rpc_urls.is_empty() && chain.disable_public_registry {
                return Err(RouterError::InvalidConfig(format!(
                    "chain {} has no RPC endpoints and the public registry is disabled",
                    chain.key
                )));
            }
            let mut ids: Vec<&str> = chain.dexes.iter().map(|d| d.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            if ids.len() != chain.dexes.len() {
                return Err(RouterError::InvalidConfig(format!(
                    "chain {} has duplicate DEX ids",
                    chain.key
                )));
            }
        }
        Ok(())
    }

    pub fn chain(&self, key: &str) -> Result<&ChainConfig> {
        self.chains
            .iter()
            .find(|c| c.key == key)
            .ok_or_else(|| RouterError::UnsupportedChain(key.to_string()))
    }
}
