//! Token Metadata Cache
//!
//! TTL-cached symbol/name/decimals/totalSupply per (chain, address),
//! fetched in one multicall with per-field failure tolerance. Entries
//! evict lazily on read plus a periodic sweep. The native-coin sentinel
//! short-circuits to a synthetic 18-decimals entry.

use crate::config::ChainConfig;
use crate::contracts::IERC20;
use crate::error::{Result, RouterError};
use crate::rpc::multicall::CallRequest;
use crate::rpc::ChainClient;
use crate::types::{Token, MAX_TOKEN_DECIMALS, NATIVE_TOKEN_ADDRESS};
use alloy::primitives::{Address, U256};
use alloy::sol_types::{sol_data, SolCall, SolType, SolValue};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct CacheEntry {
    token: Token,
    expires_at: Instant,
}

/// Process-wide token metadata cache.
pub struct TokenMetadataCache {
    entries: DashMap<(u32, Address), CacheEntry>,
    ttl: Duration,
}

impl TokenMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Seed the cache with known tokens (chain intermediates, wrapped
    /// native) at construction.
    pub fn preload(&self, tokens: impl IntoIterator<Item = Token>) {
        let expires_at = Instant::now() + self.ttl;
        for token in tokens {
            self.entries.insert(
                (token.chain_id, token.address),
                CacheEntry {
                    token,
                    expires_at,
                },
            );
        }
    }

    /// Cache lookup with lazy eviction.
    fn cached(&self, chain_id: u32, address: Address) -> Option<Token> {
        let key = (chain_id, address);
        if let Some(entry) = self.entries.get(&key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.token.clone());
            }
        } else {
            return None;
        }
        // expired: drop it so the next fetch refreshes
        self.entries.remove(&key);
        None
    }

    fn insert(&self, token: Token) {
        self.entries.insert(
            (token.chain_id, token.address),
            CacheEntry {
                expires_at: Instant::now() + self.ttl,
                token,
            },
        );
    }

    /// Drop all expired entries. Called from a periodic maintenance task.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metadata for one token. Missing `decimals` is fatal for the token.
    pub async fn get(
        &self,
        client: &ChainClient,
        chain: &ChainConfig,
        address: Address,
    ) -> Result<Token> {
        let found = self.get_batch(client, chain, &[address]).await?;
        found
            .get(&address)
            .cloned()
            .ok_or(RouterError::UnsupportedToken(address))
    }

    /// Metadata for many tokens; all uncached addresses coalesce into a
    /// single batched read. Tokens whose `decimals` read fails are
    /// omitted from the result.
    pub async fn get_batch(
        &self,
        client: &ChainClient,
        chain: &ChainConfig,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Token>> {
        let mut found = HashMap::new();
        let mut missing = Vec::new();

        for &address in addresses {
            if address == NATIVE_TOKEN_ADDRESS {
                found.insert(address, native_token(chain));
            } else if let Some(token) = self.cached(chain.numeric_id, address) {
                found.insert(address, token);
            } else if !missing.contains(&address) {
                missing.push(address);
            }
        }
        if missing.is_empty() {
            return Ok(found);
        }

        debug!(
            "token metadata fetch on {}: {} uncached of {}",
            chain.key,
            missing.len(),
            addresses.len()
        );

        // 4 sub-calls per token: symbol, name, decimals, totalSupply
        let mut calls = Vec::with_capacity(missing.len() * 4);
        for &address in &missing {
            calls.push(CallRequest::allowing_failure(
                address,
                IERC20::symbolCall {}.abi_encode(),
            ));
            calls.push(CallRequest::allowing_failure(
                address,
                IERC20::nameCall {}.abi_encode(),
            ));
            calls.push(CallRequest::allowing_failure(
                address,
                IERC20::decimalsCall {}.abi_encode(),
            ));
            calls.push(CallRequest::allowing_failure(
                address,
                IERC20::totalSupplyCall {}.abi_encode(),
            ));
        }
        let outcomes = client.multicall(&calls).await?;

        for (i, &address) in missing.iter().enumerate() {
            let base = i * 4;
            let symbol = outcomes[base].ok_data().and_then(decode_string_return);
            let name = outcomes[base + 1].ok_data().and_then(decode_string_return);
            let decimals = outcomes[base + 2].ok_data().and_then(decode_u8_return);
            let total_supply = outcomes[base + 3].ok_data().and_then(decode_u256_return);

            let decimals = match decimals {
                Some(d) if d <= MAX_TOKEN_DECIMALS => d,
                Some(d) => {
                    warn!("token {address} reports {d} decimals, skipping");
                    continue;
                }
                None => {
                    warn!("token {address} has no readable decimals, skipping");
                    continue;
                }
            };

            let symbol = symbol.unwrap_or_else(|| "UNKNOWN".to_string());
            let name = name.unwrap_or_else(|| symbol.clone());
            let token = Token {
                chain_id: chain.numeric_id,
                address,
                symbol,
                name,
                decimals,
                total_supply,
            };
            self.insert(token.clone());
            found.insert(address, token);
        }

        Ok(found)
    }
}

fn native_token(chain: &ChainConfig) -> Token {
    Token {
        chain_id: chain.numeric_id,
        address: NATIVE_TOKEN_ADDRESS,
        symbol: chain.native_symbol.clone(),
        name: chain.native_symbol.clone(),
        decimals: 18,
        total_supply: None,
    }
}

/// Decode a string return. Modern tokens ABI-encode a dynamic string;
/// legacy contracts return a raw 32-byte word which is decoded as UTF-8
/// with trailing NULs stripped.
fn decode_string_return(data: &[u8]) -> Option<String> {
    if let Ok(value) = String::abi_decode(data) {
        let trimmed = value.trim_matches('\0').trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
        return None;
    }
    if data.len() == 32 {
        let trimmed: Vec<u8> = data
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect();
        let value = String::from_utf8(trimmed).ok()?;
        let value = value.trim().to_string();
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

fn decode_u8_return(data: &[u8]) -> Option<u8> {
    sol_data::Uint::<8>::abi_decode(data).ok()
}

fn decode_u256_return(data: &[u8]) -> Option<U256> {
    U256::abi_decode(data).ok()
}
