//! Pool Discovery
//!
//! Finds candidate pools for a token pair across every configured DEX
//! and prices them into quotes. The direct pass batches factory lookups,
//! reserve/slot0 reads and optional quoter calls through multicall; the
//! multi-hop pass recurses through configured intermediate tokens.
//!
//! A failure on a single pool (reverting reads, dust reserves, decode
//! errors) skips that pool and never fails the request.

use crate::config::{ChainConfig, RouterSettings};
use crate::contracts::{
    IQuoterV2, IReserveLens, IUniswapV2Factory, IUniswapV2Pair, IUniswapV3Factory,
    IUniswapV3Pool,
};
use crate::error::{Result, RouterError};
use crate::quote::{build_single_hop_quote, combine_two_hop, ScoreMode};
use crate::rpc::multicall::{decode_revert_reason, CallRequest};
use crate::rpc::ChainClient;
use crate::tokens::TokenMetadataCache;
use crate::types::{PoolSnapshot, PoolVersion, PriceQuote, Token};
use alloy::primitives::{
    aliases::{U160, U24},
    Address, U256,
};
use alloy::sol_types::{SolCall, SolValue};
use futures::future::join_all;
use tracing::{debug, warn};

/// Where a factory answer slots back into the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FactorySlot {
    V2 { dex_index: usize },
    V3 { dex_index: usize, fee: u32 },
}

/// Pool discovery for one chain.
pub struct PoolDiscovery<'a> {
    client: &'a ChainClient,
    chain: &'a ChainConfig,
    tokens: &'a TokenMetadataCache,
    settings: &'a RouterSettings,
}

impl<'a> PoolDiscovery<'a> {
    pub fn new(
        client: &'a ChainClient,
        chain: &'a ChainConfig,
        tokens: &'a TokenMetadataCache,
        settings: &'a RouterSettings,
    ) -> Self {
        Self {
            client,
            chain,
            tokens,
            settings,
        }
    }

    /// Direct pass: one quote per live pool between the two tokens.
    pub async fn direct_quotes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        allowed: &[PoolVersion],
        gas_price_wei: Option<U256>,
        score_mode: ScoreMode,
    ) -> Result<Vec<PriceQuote>> {
        let metadata = self
            .tokens
            .get_batch(self.client, self.chain, &[token_in, token_out])
            .await?;
        let token_in_meta = metadata
            .get(&token_in)
            .ok_or(RouterError::UnsupportedToken(token_in))?
            .clone();
        let token_out_meta = metadata
            .get(&token_out)
            .ok_or(RouterError::UnsupportedToken(token_out))?
            .clone();

        let (calls, slots) = factory_calls(self.chain, token_in, token_out, allowed);
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let outcomes = self.client.multicall(&calls).await?;

        let mut v2_bucket: Vec<(usize, Address)> = Vec::new();
        let mut v3_bucket: Vec<(usize, u32, Address)> = Vec::new();
        for (slot, outcome) in slots.iter().zip(&outcomes) {
            let Some(data) = outcome.ok_data() else {
                continue;
            };
            let Ok(pool) = Address::abi_decode(data) else {
                continue;
            };
            if pool == Address::ZERO {
                continue;
            }
            match *slot {
                FactorySlot::V2 { dex_index } => v2_bucket.push((dex_index, pool)),
                FactorySlot::V3 { dex_index, fee } => v3_bucket.push((dex_index, fee, pool)),
            }
        }
        debug!(
            "discovery on {}: {} v2 and {} v3 pools for {} -> {}",
            self.chain.key,
            v2_bucket.len(),
            v3_bucket.len(),
            token_in_meta.symbol,
            token_out_meta.symbol
        );

        let mut quotes = Vec::new();
        quotes.extend(
            self.price_v2_bucket(
                &v2_bucket,
                &token_in_meta,
                &token_out_meta,
                amount_in,
                gas_price_wei,
                score_mode,
            )
            .await?,
        );
        quotes.extend(
            self.price_v3_bucket(
                &v3_bucket,
                &token_in_meta,
                &token_out_meta,
                amount_in,
                gas_price_wei,
                score_mode,
            )
            .await?,
        );
        Ok(quotes)
    }

    /// Multi-hop pass: two-hop quotes through each configured
    /// intermediate. Leg A is computed once per intermediate; leg B is
    /// recomputed per leg-A candidate because its input depends on leg
    /// A's output.
    pub async fn multi_hop_quotes(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        allowed: &[PoolVersion],
        gas_price_wei: Option<U256>,
    ) -> Result<Vec<PriceQuote>> {
        if self.settings.max_hop_depth < 2 {
            return Ok(Vec::new());
        }
        let intermediates: Vec<Address> = self
            .chain
            .intermediates
            .iter()
            .copied()
            .filter(|m| *m != token_in && *m != token_out)
            .collect();
        if intermediates.is_empty() {
            return Ok(Vec::new());
        }

        let per_intermediate = intermediates.iter().map(|&mid| {
            self.hops_through(token_in, mid, token_out, amount_in, allowed, gas_price_wei)
        });
        let mut quotes = Vec::new();
        for result in join_all(per_intermediate).await {
            match result {
                Ok(mut found) => quotes.append(&mut found),
                Err(e) => warn!("multi-hop leg failed: {e}"),
            }
        }
        Ok(quotes)
    }

    async fn hops_through(
        &self,
        token_in: Address,
        intermediate: Address,
        token_out: Address,
        amount_in: U256,
        allowed: &[PoolVersion],
        gas_price_wei: Option<U256>,
    ) -> Result<Vec<PriceQuote>> {
        let leg_a_candidates = self
            .direct_quotes(
                token_in,
                intermediate,
                amount_in,
                allowed,
                gas_price_wei,
                ScoreMode::MidPass,
            )
            .await?;
        if leg_a_candidates.is_empty() {
            return Ok(Vec::new());
        }

        let leg_b_futures = leg_a_candidates.iter().map(|leg_a| async move {
            let leg_b_candidates = self
                .direct_quotes(
                    intermediate,
                    token_out,
                    leg_a.amount_out,
                    allowed,
                    gas_price_wei,
                    ScoreMode::MidPass,
                )
                .await
                .unwrap_or_default();
            leg_b_candidates
                .iter()
                .filter_map(|leg_b| combine_two_hop(leg_a, leg_b, gas_price_wei))
                .collect::<Vec<_>>()
        });
        Ok(join_all(leg_b_futures).await.into_iter().flatten().collect())
    }

    async fn price_v2_bucket(
        &self,
        bucket: &[(usize, Address)],
        token_in: &Token,
        token_out: &Token,
        amount_in: U256,
        gas_price_wei: Option<U256>,
        score_mode: ScoreMode,
    ) -> Result<Vec<PriceQuote>> {
        if bucket.is_empty() {
            return Ok(Vec::new());
        }
        let min_reserve = U256::from(self.chain.min_v2_reserve);

        // A configured lens fuses all pair reads into one on-chain call;
        // otherwise two sub-calls per pair through plain multicall.
        let states: Vec<Option<(U256, U256, Address)>> = match self.chain.lens {
            Some(lens) => {
                let pairs: Vec<Address> = bucket.iter().map(|(_, p)| *p).collect();
                let data = self
                    .client
                    .call(
                        lens,
                        IReserveLens::v2PairStatesCall { pairs }.abi_encode().into(),
                    )
                    .await?;
                let decoded = IReserveLens::v2PairStatesCall::abi_decode_returns(&data)
                    .map_err(|e| RouterError::RpcError(format!("lens decode: {e}")))?;
                decoded
                    .into_iter()
                    .map(|s| {
                        Some((
                            U256::from(s.reserve0),
                            U256::from(s.reserve1),
                            s.token0,
                        ))
                    })
                    .collect()
            }
            None => {
                let mut calls = Vec::with_capacity(bucket.len() * 2);
                for (_, pair) in bucket {
                    calls.push(CallRequest::allowing_failure(
                        *pair,
                        IUniswapV2Pair::getReservesCall {}.abi_encode(),
                    ));
                    calls.push(CallRequest::allowing_failure(
                        *pair,
                        IUniswapV2Pair::token0Call {}.abi_encode(),
                    ));
                }
                let outcomes = self.client.multicall(&calls).await?;
                bucket
                    .iter()
                    .enumerate()
                    .map(|(i, _)| {
                        let reserves = outcomes[i * 2]
                            .ok_data()
                            .and_then(|d| IUniswapV2Pair::getReservesCall::abi_decode_returns(d).ok())?;
                        let token0 = outcomes[i * 2 + 1]
                            .ok_data()
                            .and_then(|d| Address::abi_decode(d).ok())?;
                        Some((
                            U256::from(reserves.reserve0),
                            U256::from(reserves.reserve1),
                            token0,
                        ))
                    })
                    .collect()
            }
        };

        let mut quotes = Vec::new();
        for ((dex_index, pair), state) in bucket.iter().zip(states) {
            let Some((reserve0, reserve1, token0)) = state else {
                debug!("v2 pair {pair} state read failed, skipping");
                continue;
            };
            if reserve0 < min_reserve || reserve1 < min_reserve {
                debug!("v2 pair {pair} below reserve threshold, skipping");
                continue;
            }
            let token1 = if token0 == token_in.address {
                token_out.address
            } else {
                token_in.address
            };
            let snapshot = PoolSnapshot::V2 {
                pair_address: *pair,
                reserve0,
                reserve1,
                token0,
                token1,
            };
            if let Some(quote) = build_single_hop_quote(
                &self.chain.key,
                &self.chain.dexes[*dex_index],
                snapshot,
                token_in,
                token_out,
                amount_in,
                None,
                gas_price_wei,
                score_mode,
            ) {
                quotes.push(quote);
            }
        }
        Ok(quotes)
    }

    async fn price_v3_bucket(
        &self,
        bucket: &[(usize, u32, Address)],
        token_in: &Token,
        token_out: &Token,
        amount_in: U256,
        gas_price_wei: Option<U256>,
        score_mode: ScoreMode,
    ) -> Result<Vec<PriceQuote>> {
        if bucket.is_empty() {
            return Ok(Vec::new());
        }

        let mut calls = Vec::with_capacity(bucket.len() * 4);
        for (_, _, pool) in bucket {
            calls.push(CallRequest::allowing_failure(
                *pool,
                IUniswapV3Pool::slot0Call {}.abi_encode(),
            ));
            calls.push(CallRequest::allowing_failure(
                *pool,
                IUniswapV3Pool::liquidityCall {}.abi_encode(),
            ));
            calls.push(CallRequest::allowing_failure(
                *pool,
                IUniswapV3Pool::token0Call {}.abi_encode(),
            ));
            calls.push(CallRequest::allowing_failure(
                *pool,
                IUniswapV3Pool::token1Call {}.abi_encode(),
            ));
        }
        let outcomes = self.client.multicall(&calls).await?;

        struct V3State {
            dex_index: usize,
            fee: u32,
            snapshot: PoolSnapshot,
        }
        let mut survivors: Vec<V3State> = Vec::new();
        for (i, (dex_index, fee, pool)) in bucket.iter().enumerate() {
            let base = i * 4;
            let slot0 = outcomes[base]
                .ok_data()
                .and_then(|d| IUniswapV3Pool::slot0Call::abi_decode_returns(d).ok());
            let liquidity = outcomes[base + 1]
                .ok_data()
                .and_then(|d| u128::abi_decode(d).ok());
            let token0 = outcomes[base + 2]
                .ok_data()
                .and_then(|d| Address::abi_decode(d).ok());
            let token1 = outcomes[base + 3]
                .ok_data()
                .and_then(|d| Address::abi_decode(d).ok());
            let (Some(slot0), Some(liquidity), Some(token0), Some(token1)) =
                (slot0, liquidity, token0, token1)
            else {
                debug!("v3 pool {pool} state read failed, skipping");
                continue;
            };
            if liquidity < self.chain.min_v3_liquidity {
                debug!("v3 pool {pool} below liquidity threshold, skipping");
                continue;
            }
            survivors.push(V3State {
                dex_index: *dex_index,
                fee: *fee,
                snapshot: PoolSnapshot::V3 {
                    pool_address: *pool,
                    sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
                    tick: slot0.tick.as_i32(),
                    liquidity,
                    fee: *fee,
                    token0,
                    token1,
                },
            });
        }
        if survivors.is_empty() {
            return Ok(Vec::new());
        }

        // Exact amounts from the quoter where one is configured; its
        // simulated gas estimate is decoded and discarded.
        let mut quoter_calls = Vec::new();
        let mut quoter_slots = Vec::new();
        for (i, state) in survivors.iter().enumerate() {
            if let Some(quoter) = self.chain.dexes[state.dex_index].quoter {
                quoter_calls.push(CallRequest::allowing_failure(
                    quoter,
                    IQuoterV2::quoteExactInputSingleCall {
                        params: IQuoterV2::QuoteExactInputSingleParams {
                            tokenIn: token_in.address,
                            tokenOut: token_out.address,
                            amountIn: amount_in,
                            fee: U24::from(state.fee),
                            sqrtPriceLimitX96: U160::ZERO,
                        },
                    }
                    .abi_encode(),
                ));
                quoter_slots.push(i);
            }
        }
        let mut quoted: Vec<Option<U256>> = vec![None; survivors.len()];
        if !quoter_calls.is_empty() {
            match self.client.multicall(&quoter_calls).await {
                Ok(results) => {
                    for (slot, outcome) in quoter_slots.iter().zip(results) {
                        quoted[*slot] = match outcome.ok_data() {
                            Some(d) => {
                                IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(d)
                                    .ok()
                                    .map(|r| r.amountOut)
                            }
                            None => {
                                if let Some(reason) = decode_revert_reason(&outcome.data) {
                                    debug!("quoter call reverted: {reason}");
                                }
                                None
                            }
                        };
                    }
                }
                Err(e) => warn!("quoter batch failed, using single-tick math: {e}"),
            }
        }

        let mut quotes = Vec::new();
        for (state, quoter_out) in survivors.into_iter().zip(quoted) {
            if let Some(quote) = build_single_hop_quote(
                &self.chain.key,
                &self.chain.dexes[state.dex_index],
                state.snapshot,
                token_in,
                token_out,
                amount_in,
                quoter_out,
                gas_price_wei,
                score_mode,
            ) {
                quotes.push(quote);
            }
        }
        Ok(quotes)
    }
}

/// Build the factory lookup batch: v2 `getPair` per DEX, v3 `getPool`
/// per DEX per fee tier.
fn factory_calls(
    chain: &ChainConfig,
    token_in: Address,
    token_out: Address,
    allowed: &[PoolVersion],
) -> (Vec<CallRequest>, Vec<FactorySlot>) {
    let mut calls = Vec::new();
    let mut slots = Vec::new();
    for (dex_index, dex) in chain.dexes.iter().enumerate() {
        if !allowed.contains(&dex.version) {
            continue;
        }
        match dex.version {
            PoolVersion::V2 => {
                calls.push(CallRequest::allowing_failure(
                    dex.factory,
                    IUniswapV2Factory::getPairCall {
                        tokenA: token_in,
                        tokenB: token_out,
                    }
                    .abi_encode(),
                ));
                slots.push(FactorySlot::V2 { dex_index });
            }
            PoolVersion::V3 => {
                for &fee in &dex.fee_tiers {
                    calls.push(CallRequest::allowing_failure(
                        dex.factory,
                        IUniswapV3Factory::getPoolCall {
                            tokenA: token_in,
                            tokenB: token_out,
                            fee: U24::from(fee),
                        }
                        .abi_encode(),
                    ));
                    slots.push(FactorySlot::V3 { dex_index, fee });
                }
            }
        }
    }
    (calls, slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DexProtocol;

    fn chain() -> ChainConfig {
        ChainConfig {
            key: "polygon".into(),
            numeric_id: 137,
            native_symbol: "POL".into(),
            wrapped_native: Address::repeat_byte(0x77),
            executor: Address::repeat_byte(0xe1),
            dexes: vec![
                crate::config::DexConfig {
                    id: "quickswap".into(),
                    protocol: DexProtocol::Uniswap,
                    version: PoolVersion::V2,
                    factory: Address::repeat_byte(0xfa),
                    router: Address::repeat_byte(0xf0),
                    quoter: None,
                    fee_tiers: vec![],
                    use_router02: false,
                },
                crate::config::DexConfig {
                    id: "uniswap-v3".into(),
                    protocol: DexProtocol::Uniswap,
                    version: PoolVersion::V3,
                    factory: Address::repeat_byte(0xfb),
                    router: Address::repeat_byte(0xf1),
                    quoter: Some(Address::repeat_byte(0xcc)),
                    fee_tiers: vec![500, 3000, 10000],
                    use_router02: false,
                },
            ],
            rpc_urls: vec!["https://rpc.example".into()],
            fallback_rpc_urls: vec![],
            disable_public_registry: true,
            intermediates: vec![],
            multicall3: Address::repeat_byte(0xca),
            lens: None,
            min_v2_reserve: 1_000,
            min_v3_liquidity: 1_000,
        }
    }

    #[test]
    fn test_factory_batch_fans_out_fee_tiers() {
        let cfg = chain();
        let (calls, slots) = factory_calls(
            &cfg,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            &[PoolVersion::V2, PoolVersion::V3],
        );
        // one getPair + three getPool fee tiers
        assert_eq!(calls.len(), 4);
        assert_eq!(slots[0], FactorySlot::V2 { dex_index: 0 });
        assert_eq!(slots[1], FactorySlot::V3 { dex_index: 1, fee: 500 });
        assert_eq!(slots[3], FactorySlot::V3 { dex_index: 1, fee: 10000 });
        assert_eq!(calls[0].target, cfg.dexes[0].factory);
        assert_eq!(calls[1].target, cfg.dexes[1].factory);
    }

    #[test]
    fn test_factory_batch_respects_version_filter() {
        let cfg = chain();
        let (v2_only, slots) = factory_calls(
            &cfg,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            &[PoolVersion::V2],
        );
        assert_eq!(v2_only.len(), 1);
        assert!(matches!(slots[0], FactorySlot::V2 { .. }));

        let (v3_only, _) = factory_calls(
            &cfg,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            &[PoolVersion::V3],
        );
        assert_eq!(v3_only.len(), 3);
    }
}
