//! Core data structures for the routing engine
//!
//! Token metadata, pool snapshots, price quotes, split legs and the
//! executor plan. Quotes copy token fields by value (never by reference)
//! so they can be serialized across the API boundary without cycles.

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel address denoting the chain's native coin (all bytes 0xEE).
/// Used by convention across the ecosystem whenever the native coin is
/// treated like an ERC-20 token.
pub const NATIVE_TOKEN_ADDRESS: Address = Address::repeat_byte(0xee);

/// Maximum token decimals accepted by the engine.
pub const MAX_TOKEN_DECIMALS: u8 = 30;

/// DEX protocol family. Determines the constant-product fee pair for v2
/// pools; v3 pools carry their fee tier in the pool itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DexProtocol {
    /// Uniswap and byte-compatible forks: 0.30% flat fee (997/1000)
    Uniswap,
    /// PancakeSwap-style forks: 0.25% flat fee (9975/10000)
    Pancake,
    /// Unrecognized protocol — treated with the neutral (997/1000) pair
    #[serde(other)]
    Other,
}

impl DexProtocol {
    /// The `(feeNumerator, feeDenominator)` pair applied to v2 swaps.
    pub fn v2_fee_pair(&self) -> (u32, u32) {
        match self {
            DexProtocol::Pancake => (9975, 10000),
            DexProtocol::Uniswap | DexProtocol::Other => (997, 1000),
        }
    }
}

/// Pool flavor: constant-product (v2) or concentrated-liquidity (v3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolVersion {
    V2,
    V3,
}

impl fmt::Display for PoolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PoolVersion::V2 => write!(f, "v2"),
            PoolVersion::V3 => write!(f, "v3"),
        }
    }
}

/// Which pool versions a quote request considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotePreference {
    Auto,
    V2,
    V3,
}

impl QuotePreference {
    pub fn allowed_versions(&self) -> &'static [PoolVersion] {
        match self {
            QuotePreference::Auto => &[PoolVersion::V2, PoolVersion::V3],
            QuotePreference::V2 => &[PoolVersion::V2],
            QuotePreference::V3 => &[PoolVersion::V3],
        }
    }
}

impl Default for QuotePreference {
    fn default() -> Self {
        QuotePreference::Auto
    }
}

/// Token metadata. Equality is by `(chain_id, address)` only — symbol and
/// name are display data and may legitimately differ between sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub chain_id: u32,
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<U256>,
}

impl Token {
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.address)
    }
}

/// Ephemeral on-chain pool state, read once per request.
///
/// V2 reserves fit `uint112` on chain; V3 `sqrt_price_x96` fits 160 bits.
/// Both are widened to `U256` so downstream math has one integer type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum PoolSnapshot {
    V2 {
        pair_address: Address,
        reserve0: U256,
        reserve1: U256,
        token0: Address,
        token1: Address,
    },
    V3 {
        pool_address: Address,
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
        fee: u32,
        token0: Address,
        token1: Address,
    },
}

impl PoolSnapshot {
    pub fn address(&self) -> Address {
        match self {
            PoolSnapshot::V2 { pair_address, .. } => *pair_address,
            PoolSnapshot::V3 { pool_address, .. } => *pool_address,
        }
    }

    pub fn version(&self) -> PoolVersion {
        match self {
            PoolSnapshot::V2 { .. } => PoolVersion::V2,
            PoolSnapshot::V3 { .. } => PoolVersion::V3,
        }
    }

    pub fn token0(&self) -> Address {
        match self {
            PoolSnapshot::V2 { token0, .. } => *token0,
            PoolSnapshot::V3 { token0, .. } => *token0,
        }
    }

    pub fn token1(&self) -> Address {
        match self {
            PoolSnapshot::V2 { token1, .. } => *token1,
            PoolSnapshot::V3 { token1, .. } => *token1,
        }
    }

    /// True when `token_in` enters on the token0 side.
    pub fn zero_for_one(&self, token_in: Address) -> bool {
        self.token0() == token_in
    }
}

/// One pool traversal inside a quote. Carries a copy of the pool state
/// used for the simulation so later recomputation (split optimizer, plan
/// assembly) is self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSource {
    pub dex_id: String,
    pub protocol: DexProtocol,
    pub pool: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_tier: Option<u32>,
    pub snapshot: PoolSnapshot,
}

/// A fully-priced route candidate.
///
/// Invariants: `path.len() == sources.len() + 1 == hop_versions.len() + 1`;
/// `path[i].address == route_addresses[i]`; `sources[i]` is the pool
/// between `path[i]` and `path[i + 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub chain_key: String,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Q18-scaled output/input price including decimals normalization
    pub price_q18: U256,
    pub execution_price_q18: U256,
    pub mid_price_q18: U256,
    pub price_impact_bps: u16,
    pub path: Vec<Token>,
    pub route_addresses: Vec<Address>,
    pub sources: Vec<PriceSource>,
    pub hop_versions: Vec<PoolVersion>,
    pub liquidity_score: U256,
    pub estimated_gas_units: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_gas_cost_wei: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price_wei: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_split: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splits: Option<Vec<SplitLeg>>,
    /// Non-winning alternatives, best first, winner excluded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offers: Option<Vec<PriceQuote>>,
}

impl PriceQuote {
    pub fn hop_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_multi_hop(&self) -> bool {
        self.sources.len() > 1
    }

    /// The `(dex_id, pool)` identity keys of every pool this quote touches.
    /// Candidates sharing any key cannot co-split.
    pub fn pool_keys(&self) -> Vec<(String, Address)> {
        self.sources
            .iter()
            .map(|s| (s.dex_id.clone(), s.pool))
            .collect()
    }
}

/// One leg of a split trade. `ratio_bps` values across a split always sum
/// to exactly 10000.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitLeg {
    pub quote: PriceQuote,
    pub ratio_bps: u16,
}

/// A token transfer the executor pulls from the user before swapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPull {
    pub token: Address,
    pub amount: U256,
}

/// An ERC-20 approval the executor grants to a router for the duration of
/// the call. `revoke_after` resets the allowance to zero on exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenApproval {
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
    pub revoke_after: bool,
}

/// One inner call dispatched by the executor. When `inject_token` is
/// nonzero the executor overwrites the 32 bytes of `data` at
/// `inject_offset` with its current balance of that token before
/// dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerCall {
    pub target: Address,
    pub value: U256,
    pub data: Bytes,
    pub inject_token: Address,
    pub inject_offset: u64,
}

impl InnerCall {
    pub fn injects(&self) -> bool {
        self.inject_token != Address::ZERO
    }
}

/// The argument tuple consumed by the stateless multicall executor:
/// `(pulls[], approvals[], calls[], tokensToFlush[])`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorPlan {
    pub pulls: Vec<TokenPull>,
    pub approvals: Vec<TokenApproval>,
    pub calls: Vec<InnerCall>,
    pub tokens_to_flush: Vec<Address>,
}

impl ExecutorPlan {
    /// Native value the outer call must carry (the sum of inner call
    /// values — nonzero only for native-input routes).
    pub fn outer_value(&self) -> U256 {
        self.calls
            .iter()
            .fold(U256::ZERO, |acc, c| acc.saturating_add(c.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(chain: u32, byte: u8, symbol: &str) -> Token {
        Token {
            chain_id: chain,
            address: Address::repeat_byte(byte),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals: 18,
            total_supply: None,
        }
    }

    #[test]
    fn test_native_sentinel() {
        assert_eq!(
            NATIVE_TOKEN_ADDRESS,
            "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"
                .parse::<Address>()
                .unwrap()
        );
        let mut t = token(137, 0xee, "POL");
        assert!(t.is_native());
        t.address = Address::repeat_byte(0x01);
        assert!(!t.is_native());
    }

    #[test]
    fn test_token_equality_ignores_display_fields() {
        let a = token(137, 0x11, "WETH");
        let mut b = token(137, 0x11, "WETH9");
        b.name = "Wrapped Ether".into();
        assert_eq!(a, b);

        let other_chain = token(8453, 0x11, "WETH");
        assert_ne!(a, other_chain);
    }

    #[test]
    fn test_fee_pairs() {
        assert_eq!(DexProtocol::Uniswap.v2_fee_pair(), (997, 1000));
        assert_eq!(DexProtocol::Pancake.v2_fee_pair(), (9975, 10000));
        assert_eq!(DexProtocol::Other.v2_fee_pair(), (997, 1000));
    }

    #[test]
    fn test_preference_versions() {
        assert_eq!(QuotePreference::Auto.allowed_versions().len(), 2);
        assert_eq!(QuotePreference::V2.allowed_versions(), &[PoolVersion::V2]);
        assert_eq!(QuotePreference::V3.allowed_versions(), &[PoolVersion::V3]);
    }

    #[test]
    fn test_snapshot_direction() {
        let snap = PoolSnapshot::V2 {
            pair_address: Address::repeat_byte(0xaa),
            reserve0: U256::from(1u64),
            reserve1: U256::from(2u64),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
        };
        assert!(snap.zero_for_one(Address::repeat_byte(0x01)));
        assert!(!snap.zero_for_one(Address::repeat_byte(0x02)));
        assert_eq!(snap.version(), PoolVersion::V2);
    }

    #[test]
    fn test_inner_call_injection_flag() {
        let disabled = InnerCall {
            target: Address::repeat_byte(0x01),
            value: U256::ZERO,
            data: Bytes::new(),
            inject_token: Address::ZERO,
            inject_offset: 0,
        };
        assert!(!disabled.injects());

        let enabled = InnerCall {
            inject_token: Address::repeat_byte(0x02),
            inject_offset: 164,
            ..disabled
        };
        assert!(enabled.injects());
    }

    #[test]
    fn test_outer_value_sums_inner_values() {
        let plan = ExecutorPlan {
            pulls: vec![],
            approvals: vec![],
            calls: vec![
                InnerCall {
                    target: Address::repeat_byte(0x01),
                    value: U256::from(7u64),
                    data: Bytes::new(),
                    inject_token: Address::ZERO,
                    inject_offset: 0,
                },
                InnerCall {
                    target: Address::repeat_byte(0x02),
                    value: U256::from(5u64),
                    data: Bytes::new(),
                    inject_token: Address::ZERO,
                    inject_offset: 0,
                },
            ],
            tokens_to_flush: vec![],
        };
        assert_eq!(plan.outer_value(), U256::from(12u64));
    }
}
