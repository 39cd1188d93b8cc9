//! AMM math and protocol adapters
//!
//! Swap formulas per pool flavor plus the process-wide adapter registry
//! that dispatches across DEX families. Adapters are small strategy
//! objects keyed by `(protocol, version)`; unknown protocols fall back to
//! the neutral (997, 1000) fee pair.

pub mod fixed_point;
pub mod v2;
pub mod v3;

use crate::types::{DexProtocol, PoolSnapshot, PoolVersion};
use alloy::primitives::{Address, U256, U512};
use alloy::primitives::ruint::UintTryFrom;
use fixed_point::apply_price_q18;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Per-family swap strategy. One instance per protocol family is
/// registered at startup; lookups go through [`adapter_for`].
pub trait DexAdapter: Send + Sync {
    /// The v2 constant-product fee pair for this family.
    fn v2_fee_pair(&self) -> (u32, u32);

    fn v2_amount_out(&self, amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
        let (num, den) = self.v2_fee_pair();
        v2::get_amount_out(amount_in, reserve_in, reserve_out, num, den)
    }

    fn v3_amount_out(
        &self,
        sqrt_price_x96: U256,
        liquidity: u128,
        fee_ppm: u32,
        amount_in: U256,
        zero_for_one: bool,
    ) -> U256 {
        v3::get_amount_out(sqrt_price_x96, liquidity, fee_ppm, amount_in, zero_for_one)
    }

    /// Marginal gas charged for one hop through this family's pools.
    fn hop_gas(&self, version: PoolVersion) -> u64 {
        match version {
            PoolVersion::V2 => 70_000,
            PoolVersion::V3 => 110_000,
        }
    }

    fn supports_chain(&self, _chain_id: u32) -> bool {
        true
    }
}

struct UniswapAdapter;

impl DexAdapter for UniswapAdapter {
    fn v2_fee_pair(&self) -> (u32, u32) {
        (997, 1000)
    }
}

struct PancakeAdapter;

impl DexAdapter for PancakeAdapter {
    fn v2_fee_pair(&self) -> (u32, u32) {
        (9975, 10000)
    }
}

static UNISWAP_ADAPTER: UniswapAdapter = UniswapAdapter;
static PANCAKE_ADAPTER: PancakeAdapter = PancakeAdapter;

static ADAPTER_REGISTRY: Lazy<HashMap<(DexProtocol, PoolVersion), &'static dyn DexAdapter>> =
    Lazy::new(|| {
        let mut registry: HashMap<(DexProtocol, PoolVersion), &'static dyn DexAdapter> =
            HashMap::new();
        for version in [PoolVersion::V2, PoolVersion::V3] {
            registry.insert((DexProtocol::Uniswap, version), &UNISWAP_ADAPTER);
            registry.insert((DexProtocol::Pancake, version), &PANCAKE_ADAPTER);
        }
        registry
    });

/// Look up the adapter for a `(protocol, version)` pair. Unknown
/// protocols resolve to the neutral Uniswap-style adapter.
pub fn adapter_for(protocol: DexProtocol, version: PoolVersion) -> &'static dyn DexAdapter {
    ADAPTER_REGISTRY
        .get(&(protocol, version))
        .copied()
        .unwrap_or(&UNISWAP_ADAPTER)
}

/// Price impact in basis points: the shortfall of the realized output
/// versus the output expected at the mid price, saturated to [0, 10000].
pub fn price_impact_bps(
    mid_price_q18: U256,
    amount_in: U256,
    amount_out: U256,
    dec_in: u8,
    dec_out: u8,
) -> u16 {
    let expected = apply_price_q18(mid_price_q18, amount_in, dec_in, dec_out);
    if expected.is_zero() || amount_out >= expected {
        return 0;
    }
    let shortfall = expected - amount_out;
    let bps = shortfall.widening_mul(U256::from(10_000u64)) / U512::from(expected);
    U256::uint_try_from(bps)
        .ok()
        .and_then(|v| u16::try_from(v.to::<u64>().min(10_000)).ok())
        .unwrap_or(10_000)
}

/// Simulate a swap against a pool snapshot. The direction is derived from
/// `token_in`; fee semantics come from the protocol family (v2) or the
/// pool's own fee tier (v3).
pub fn snapshot_amount_out(
    snapshot: &PoolSnapshot,
    protocol: DexProtocol,
    token_in: Address,
    amount_in: U256,
) -> U256 {
    match snapshot {
        PoolSnapshot::V2 {
            reserve0, reserve1, ..
        } => {
            let (reserve_in, reserve_out) = if snapshot.zero_for_one(token_in) {
                (*reserve0, *reserve1)
            } else {
                (*reserve1, *reserve0)
            };
            adapter_for(protocol, PoolVersion::V2).v2_amount_out(amount_in, reserve_in, reserve_out)
        }
        PoolSnapshot::V3 {
            sqrt_price_x96,
            liquidity,
            fee,
            ..
        } => adapter_for(protocol, PoolVersion::V3).v3_amount_out(
            *sqrt_price_x96,
            *liquidity,
            *fee,
            amount_in,
            snapshot.zero_for_one(token_in),
        ),
    }
}

/// Marginal `d out / d in` (Q128) for a swap against a pool snapshot at
/// the given allocation.
pub fn snapshot_marginal_q128(
    snapshot: &PoolSnapshot,
    protocol: DexProtocol,
    token_in: Address,
    amount_in: U256,
) -> U256 {
    match snapshot {
        PoolSnapshot::V2 {
            reserve0, reserve1, ..
        } => {
            let (reserve_in, reserve_out) = if snapshot.zero_for_one(token_in) {
                (*reserve0, *reserve1)
            } else {
                (*reserve1, *reserve0)
            };
            let (num, den) = adapter_for(protocol, PoolVersion::V2).v2_fee_pair();
            v2::marginal_q128(amount_in, reserve_in, reserve_out, num, den)
        }
        PoolSnapshot::V3 {
            sqrt_price_x96,
            liquidity,
            fee,
            ..
        } => v3::marginal_q128(
            *sqrt_price_x96,
            *liquidity,
            *fee,
            amount_in,
            snapshot.zero_for_one(token_in),
        ),
    }
}

/// Mid price (Q18) of a snapshot for the given trade direction.
pub fn snapshot_mid_price_q18(
    snapshot: &PoolSnapshot,
    token_in: Address,
    dec_in: u8,
    dec_out: u8,
) -> U256 {
    match snapshot {
        PoolSnapshot::V2 {
            reserve0, reserve1, ..
        } => {
            let (reserve_in, reserve_out) = if snapshot.zero_for_one(token_in) {
                (*reserve0, *reserve1)
            } else {
                (*reserve1, *reserve0)
            };
            v2::mid_price_q18(reserve_in, reserve_out, dec_in, dec_out)
        }
        PoolSnapshot::V3 { sqrt_price_x96, .. } => v3::mid_price_q18(
            *sqrt_price_x96,
            dec_in,
            dec_out,
            snapshot.zero_for_one(token_in),
        ),
    }
}
