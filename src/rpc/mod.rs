//! Chain Client / RPC Multiplexer
//!
//! One client per chain. Reads fan out across up to three ranked primary
//! endpoints with round-robin rotation and per-request failover,
//! cascading to fallback endpoints on exhaustion. Endpoint ranking is
//! probed periodically and cached with a TTL. A built-in public endpoint
//! registry is merged into the primary set unless the chain disables it.

pub mod multicall;
pub mod ranking;

use crate::config::{ChainConfig, RouterSettings};
use crate::error::{Result, RouterError};
use alloy::primitives::{Address, Bytes, U256};
use multicall::{decode_aggregate3, encode_aggregate3, CallOutcome, CallRequest};
use once_cell::sync::Lazy;
use ranking::{probe_endpoints, rank_endpoints, EndpointHealth};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How many ranked primaries participate in round-robin rotation.
const ACTIVE_PRIMARY_SET: usize = 3;

/// Well-known public endpoints, merged into a chain's primaries unless
/// `disable_public_registry` is set.
static PUBLIC_RPC_REGISTRY: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        let mut registry: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        registry.insert(
            "ethereum",
            &["https://eth.llamarpc.com", "https://rpc.ankr.com/eth"][..],
        );
        registry.insert(
            "polygon",
            &["https://polygon-rpc.com", "https://rpc.ankr.com/polygon"][..],
        );
        registry.insert(
            "base",
            &["https://mainnet.base.org", "https://base.llamarpc.com"][..],
        );
        registry.insert("bsc", &["https://bsc-dataseed.bnbchain.org"][..]);
        registry.insert("arbitrum", &["https://arb1.arbitrum.io/rpc"][..]);
        registry
    });

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

struct RankCache {
    ranked: Vec<String>,
    report: Vec<EndpointHealth>,
    refreshed_at: Instant,
}

/// Multiplexing JSON-RPC client for one chain.
pub struct ChainClient {
    chain_key: String,
    multicall3: Address,
    primaries: Vec<String>,
    fallbacks: Vec<String>,
    http: reqwest::Client,
    request_timeout: Duration,
    probe_timeout: Duration,
    probe_concurrency: usize,
    rank_ttl: Duration,
    rank_cache: RwLock<Option<RankCache>>,
    cursor: AtomicUsize,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(chain: &ChainConfig, settings: &RouterSettings) -> Result<Self> {
        let mut primaries = chain.rpc_urls.clone();
        if !chain.disable_public_registry {
            if let Some(extra) = PUBLIC_RPC_REGISTRY.get(chain.key.as_str()) {
                for url in extra.iter() {
                    if !primaries.iter().any(|p| p == url) {
                        primaries.push((*url).to_string());
                    }
                }
            }
        }
        if primaries.is_empty() && chain.fallback_rpc_urls.is_empty() {
            return Err(RouterError::MissingConfig(format!(
                "chain {} has no usable RPC endpoints",
                chain.key
            )));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RouterError::NetworkError(format!("http client: {e}")))?;

        Ok(Self {
            chain_key: chain.key.clone(),
            multicall3: chain.multicall3,
            primaries,
            fallbacks: chain.fallback_rpc_urls.clone(),
            http,
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            probe_timeout: Duration::from_millis(settings.probe_timeout_ms),
            probe_concurrency: settings.probe_concurrency,
            rank_ttl: Duration::from_secs(settings.rank_ttl_secs),
            rank_cache: RwLock::new(None),
            cursor: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    /// The ranked active endpoint set, refreshed when the TTL lapses.
    async fn active_endpoints(&self) -> Vec<String> {
        {
            let cache = self.rank_cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.refreshed_at.elapsed() < self.rank_ttl {
                    return entry.ranked.clone();
                }
            }
        }

        let report = rank_endpoints(
            probe_endpoints(
                &self.http,
                &self.primaries,
                self.probe_timeout,
                self.probe_concurrency,
            )
            .await,
        );
        let ranked: Vec<String> = report
            .iter()
            .take(ACTIVE_PRIMARY_SET)
            .map(|h| h.url.clone())
            .collect();
        let ranked = if ranked.is_empty() {
            self.primaries.clone()
        } else {
            ranked
        };

        let mut cache = self.rank_cache.write().await;
        *cache = Some(RankCache {
            ranked: ranked.clone(),
            report,
            refreshed_at: Instant::now(),
        });
        ranked
    }

    /// Latest probe results for observability.
    pub async fn endpoint_report(&self) -> Vec<EndpointHealth> {
        let _ = self.active_endpoints().await;
        self.rank_cache
            .read()
            .await
            .as_ref()
            .map(|c| c.report.clone())
            .unwrap_or_default()
    }

    /// Issue one JSON-RPC request with rotation and failover. A failure
    /// on a single endpoint never propagates while another endpoint
    /// succeeds.
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let active = self.active_endpoints().await;
        let start = if active.is_empty() {
            0
        } else {
            self.cursor.fetch_add(1, Ordering::Relaxed) % active.len()
        };

        let mut attempts: Vec<&String> = Vec::with_capacity(active.len() + self.fallbacks.len());
        attempts.extend(active.iter().skip(start));
        attempts.extend(active.iter().take(start));
        attempts.extend(self.fallbacks.iter());

        let mut last_error =
            RouterError::MissingConfig(format!("chain {} has no endpoints", self.chain_key));
        for url in attempts {
            match self.request_one(url, method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "rpc {} on {} failed via {}: {}",
                        method, self.chain_key, url, e
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn request_one<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RouterError::RpcTimeout(url.to_string())
                } else {
                    RouterError::NetworkError(format!("{url}: {e}"))
                }
            })?;

        let parsed: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| RouterError::RpcError(format!("{url}: malformed response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(RouterError::RpcError(format!(
                "{url}: {} (code {})",
                err.message, err.code
            )));
        }
        parsed
            .result
            .ok_or_else(|| RouterError::RpcError(format!("{url}: empty result")))
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.request(
            "eth_call",
            json!([{ "to": to, "data": data }, "latest"]),
        )
        .await
    }

    /// Batch many reads into one `eth_call` to Multicall3.
    pub async fn multicall(&self, calls: &[CallRequest]) -> Result<Vec<CallOutcome>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "multicall on {}: {} sub-calls in one round-trip",
            self.chain_key,
            calls.len()
        );
        let data = self.call(self.multicall3, encode_aggregate3(calls)).await?;
        let outcomes = decode_aggregate3(&data)?;
        if outcomes.len() != calls.len() {
            return Err(RouterError::RpcError(format!(
                "multicall returned {} results, expected {}",
                outcomes.len(),
                calls.len()
            )));
        }
        Ok(outcomes)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let hex: String = self.request("eth_chainId", json!([])).await?;
        parse_hex_u64(&hex)
    }

    pub async fn gas_price(&self) -> Result<U256> {
        let hex: String = self.request("eth_gasPrice", json!([])).await?;
        parse_hex_u256(&hex)
    }

    pub async fn latest_block_number(&self) -> Result<u64> {
        let block: Value = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let number = block
            .get("number")
            .and_then(|n| n.as_str())
            .ok_or_else(|| RouterError::RpcError("block without number".into()))?;
        parse_hex_u64(number)
    }
}

fn parse_hex_u64(hex: &str) -> Result<u64> {
    let trimmed = hex.trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| RouterError::RpcError(format!("bad hex quantity {hex}: {e}")))
}

fn parse_hex_u256(hex: &str) -> Result<U256> {
    let trimmed = hex.trim_start_matches("0x");
    U256::from_str_radix(trimmed, 16)
        .map_err(|e| RouterError::RpcError(format!("bad hex quantity {hex}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DexProtocol, PoolVersion};

    fn test_chain(rpc_urls: Vec<String>, disable_registry: bool) -> ChainConfig {
        ChainConfig {
            key: "polygon".into(),
            numeric_id: 137,
            native_symbol: "POL".into(),
            wrapped_native: Address::repeat_byte(0x10),
            executor: Address::repeat_byte(0xe1),
            dexes: vec![crate::config::DexConfig {
                id: "quickswap".into(),
                protocol: DexProtocol::Uniswap,
                version: PoolVersion::V2,
                factory: Address::repeat_byte(0xfa),
                router: Address::repeat_byte(0xf0),
                quoter: None,
                fee_tiers: vec![],
                use_router02: false,
            }],
            rpc_urls,
            fallback_rpc_urls: vec![],
            disable_public_registry: disable_registry,
            intermediates: vec![],
            multicall3: Address::repeat_byte(0xca),
            lens: None,
            min_v2_reserve: 0,
            min_v3_liquidity: 0,
        }
    }

    #[test]
    fn test_parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x89").unwrap(), 137);
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert!(parse_hex_u64("0xzz").is_err());
        assert_eq!(
            parse_hex_u256("0xde0b6b3a7640000").unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
    }

    #[test]
    fn test_public_registry_merges_unless_disabled() {
        let settings = RouterSettings::default();
        let merged = ChainClient::new(
            &test_chain(vec!["https://private.example".into()], false),
            &settings,
        )
        .unwrap();
        assert!(merged.primaries.len() > 1);
        assert_eq!(merged.primaries[0], "https://private.example");

        let isolated = ChainClient::new(
            &test_chain(vec!["https://private.example".into()], true),
            &settings,
        )
        .unwrap();
        assert_eq!(isolated.primaries, vec!["https://private.example"]);
    }

    #[test]
    fn test_registry_merge_deduplicates() {
        let settings = RouterSettings::default();
        let client = ChainClient::new(
            &test_chain(vec!["https://polygon-rpc.com".into()], false),
            &settings,
        )
        .unwrap();
        let count = client
            .primaries
            .iter()
            .filter(|u| u.as_str() == "https://polygon-rpc.com")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_no_endpoints_is_a_config_error() {
        let settings = RouterSettings::default();
        let err = ChainClient::new(&test_chain(vec![], true), &settings).unwrap_err();
        assert_eq!(err.code(), "missing_config");
    }

    #[tokio::test]
    async fn test_empty_multicall_skips_the_round_trip() {
        let settings = RouterSettings::default();
        let client = ChainClient::new(
            &test_chain(vec!["http://127.0.0.1:1/".into()], true),
            &settings,
        )
        .unwrap();
        // no endpoint is reachable, but an empty batch never dials out
        let outcomes = client.multicall(&[]).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
