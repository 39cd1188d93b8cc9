//! Routing Engine
//!
//! Wires discovery, the split optimizer, the ranker and the calldata
//! assembler behind three entry points: `get_best_quote`,
//! `build_swap_plan` and the `discover_pools` testing hook. One chain
//! client per configured chain; the token metadata cache is shared
//! process-wide and swept in the background.

use crate::config::{ChainConfig, RouterConfig};
use crate::discovery::PoolDiscovery;
use crate::error::{Result, RouterError};
use crate::plan::{self, PlanRequest};
use crate::quote::rank::select_best;
use crate::quote::ScoreMode;
use crate::rpc::ChainClient;
use crate::split::optimize_split;
use crate::tokens::TokenMetadataCache;
use crate::types::{
    ExecutorPlan, PoolVersion, PriceQuote, QuotePreference, NATIVE_TOKEN_ADDRESS,
};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Hard cap on the slippage a caller may request, in bps.
const MAX_SLIPPAGE_BPS: u16 = 5_000;

/// The aggregator core.
pub struct RouterEngine {
    config: RouterConfig,
    clients: HashMap<String, Arc<ChainClient>>,
    tokens: Arc<TokenMetadataCache>,
}

impl RouterEngine {
    /// Build clients for every configured chain and start the cache
    /// sweeper when a runtime is available.
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        let mut clients = HashMap::new();
        for chain in &config.chains {
            clients.insert(
                chain.key.clone(),
                Arc::new(ChainClient::new(chain, &config.settings)?),
            );
        }
        let tokens = Arc::new(TokenMetadataCache::new(Duration::from_secs(
            config.settings.token_ttl_secs,
        )));
        let engine = Self {
            config,
            clients,
            tokens,
        };
        engine.spawn_cache_sweeper();
        info!(
            "routing engine up: {} chain(s) configured",
            engine.config.chains.len()
        );
        Ok(engine)
    }

    fn spawn_cache_sweeper(&self) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let cache = Arc::clone(&self.tokens);
            let period = Duration::from_secs(self.config.settings.token_ttl_secs.max(1));
            handle.spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    cache.sweep();
                }
            });
        }
    }

    pub fn settings(&self) -> &crate::config::RouterSettings {
        &self.config.settings
    }

    fn chain_and_client(&self, chain_key: &str) -> Result<(&ChainConfig, &Arc<ChainClient>)> {
        let chain = self.config.chain(chain_key)?;
        let client = self
            .clients
            .get(chain_key)
            .ok_or_else(|| RouterError::UnsupportedChain(chain_key.to_string()))?;
        Ok((chain, client))
    }

    /// Find the best route (single or split) for a trade. Returns
    /// `Ok(None)` when the request is a no-op (same token on both
    /// sides); an empty candidate set is `no_route_found`.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_best_quote(
        &self,
        chain_key: &str,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        preference: QuotePreference,
        force_multi_hop: bool,
        enable_split: bool,
    ) -> Result<Option<PriceQuote>> {
        if token_in == token_out {
            return Ok(None);
        }
        let (chain, client) = self.chain_and_client(chain_key)?;

        // Native-coin requests route through the wrapped ERC-20.
        let token_in = as_erc20(chain, token_in);
        let token_out = as_erc20(chain, token_out);
        if token_in == token_out {
            return Ok(None);
        }
        if amount_in.is_zero() {
            return Err(RouterError::NoRouteFound {
                from: token_in,
                to: token_out,
            });
        }

        let gas_price = client.gas_price().await.ok();
        let discovery =
            PoolDiscovery::new(client, chain, &self.tokens, &self.config.settings);
        let allowed = preference.allowed_versions();

        let mut candidates = if force_multi_hop {
            discovery
                .multi_hop_quotes(token_in, token_out, amount_in, allowed, gas_price)
                .await?
        } else {
            let (direct, multi) = tokio::join!(
                discovery.direct_quotes(
                    token_in,
                    token_out,
                    amount_in,
                    allowed,
                    gas_price,
                    ScoreMode::Direct,
                ),
                discovery.multi_hop_quotes(token_in, token_out, amount_in, allowed, gas_price),
            );
            let mut candidates = direct?;
            candidates.extend(multi?);
            candidates
        };

        if candidates.is_empty() {
            return Err(RouterError::NoRouteFound {
                from: token_in,
                to: token_out,
            });
        }
        debug!(
            "{} candidate route(s) for {} -> {} on {}",
            candidates.len(),
            token_in,
            token_out,
            chain_key
        );

        if enable_split {
            let output_decimals = candidates[0]
                .path
                .last()
                .map(|t| t.decimals)
                .unwrap_or(18);
            if let Some(split) = optimize_split(
                &candidates,
                amount_in,
                gas_price,
                None,
                output_decimals,
                &self.config.settings,
            ) {
                candidates.push(split);
            }
        }

        Ok(select_best(candidates, None, None))
    }

    /// Serialize a quote into the executor plan. Slippage is clamped at
    /// the API boundary; the deadline is `now + deadline_seconds`.
    #[allow(clippy::too_many_arguments)]
    pub fn build_swap_plan(
        &self,
        chain_key: &str,
        quote: &PriceQuote,
        amount_out_min: U256,
        recipient: Address,
        slippage_bps: u16,
        deadline_seconds: u64,
        use_native_input: bool,
        use_native_output: bool,
    ) -> Result<ExecutorPlan> {
        let chain = self.config.chain(chain_key)?;
        let deadline = unix_now().saturating_add(deadline_seconds);
        plan::build_swap_plan(&PlanRequest {
            chain,
            quote,
            amount_out_min,
            recipient,
            slippage_bps: clamp_slippage(slippage_bps),
            deadline,
            use_native_input,
            use_native_output,
            interhop_buffer_bps: self.config.settings.interhop_buffer_bps,
        })
    }

    /// Testing hook: raw candidate set without ranking or splitting.
    pub async fn discover_pools(
        &self,
        chain_key: &str,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        allowed: &[PoolVersion],
    ) -> Result<Vec<PriceQuote>> {
        let (chain, client) = self.chain_and_client(chain_key)?;
        let token_in = as_erc20(chain, token_in);
        let token_out = as_erc20(chain, token_out);
        let discovery =
            PoolDiscovery::new(client, chain, &self.tokens, &self.config.settings);
        let (direct, multi) = tokio::join!(
            discovery.direct_quotes(
                token_in,
                token_out,
                amount_in,
                allowed,
                None,
                ScoreMode::Direct,
            ),
            discovery.multi_hop_quotes(token_in, token_out, amount_in, allowed, None),
        );
        let mut candidates = direct?;
        candidates.extend(multi?);
        Ok(candidates)
    }
}

/// Map the native-coin sentinel to the chain's wrapped ERC-20.
fn as_erc20(chain: &ChainConfig, token: Address) -> Address {
    if token == NATIVE_TOKEN_ADDRESS {
        chain.wrapped_native
    } else {
        token
    }
}

fn clamp_slippage(bps: u16) -> u16 {
    bps.min(MAX_SLIPPAGE_BPS)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
