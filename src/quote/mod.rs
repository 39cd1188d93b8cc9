//! Quote Builder
//!
//! Turns a pool snapshot plus a trade direction into a fully-priced
//! `PriceQuote`: execution price, mid price, impact, liquidity score and
//! the deterministic gas estimate. Two-hop quotes compose leg quotes.

pub mod gas;
pub mod rank;

use crate::amm::{
    self,
    fixed_point::{multiply_q18, price_q18, scale_to_q18},
};
use crate::config::DexConfig;
use crate::types::{PoolSnapshot, PoolVersion, PriceQuote, PriceSource, Token};
use alloy::primitives::U256;

/// How a v2 liquidity score is computed. Direct candidates use the raw
/// reserve sum; multi-hop legs use the Q18-scaled minimum side so scores
/// stay comparable across decimals before taking the route minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    Direct,
    MidPass,
}

/// Price and assemble a single-hop quote. Returns `None` when the pool
/// cannot produce output for this input (zero reserves, overflow
/// sentinel, dust input).
#[allow(clippy::too_many_arguments)]
pub fn build_single_hop_quote(
    chain_key: &str,
    dex: &DexConfig,
    snapshot: PoolSnapshot,
    token_in: &Token,
    token_out: &Token,
    amount_in: U256,
    quoter_amount_out: Option<U256>,
    gas_price_wei: Option<U256>,
    score_mode: ScoreMode,
) -> Option<PriceQuote> {
    if amount_in.is_zero() {
        return None;
    }
    let simulated =
        amm::snapshot_amount_out(&snapshot, dex.protocol, token_in.address, amount_in);
    // A configured quoter's result takes precedence over the single-tick
    // approximation; its simulated gas is ignored either way.
    let amount_out = quoter_amount_out.unwrap_or(simulated);
    if amount_out.is_zero() {
        return None;
    }

    let mid_price_q18 = amm::snapshot_mid_price_q18(
        &snapshot,
        token_in.address,
        token_in.decimals,
        token_out.decimals,
    );
    let execution_price_q18 = price_q18(
        amount_in,
        amount_out,
        token_in.decimals,
        token_out.decimals,
    );
    let price_impact_bps = amm::price_impact_bps(
        mid_price_q18,
        amount_in,
        amount_out,
        token_in.decimals,
        token_out.decimals,
    );
    let liquidity_score = liquidity_score(&snapshot, token_in, token_out, score_mode);

    let version = snapshot.version();
    let fee_tier = match &snapshot {
        PoolSnapshot::V3 { fee, .. } => Some(*fee),
        PoolSnapshot::V2 { .. } => None,
    };
    let source = PriceSource {
        dex_id: dex.id.clone(),
        protocol: dex.protocol,
        pool: snapshot.address(),
        amount_in,
        amount_out,
        fee_tier,
        snapshot,
    };

    let hop_versions = vec![version];
    let estimated_gas_units = gas::estimate_gas_units(&hop_versions);
    let estimated_gas_cost_wei =
        gas_price_wei.map(|p| p.saturating_mul(U256::from(estimated_gas_units)));

    Some(PriceQuote {
        chain_key: chain_key.to_string(),
        amount_in,
        amount_out,
        price_q18: execution_price_q18,
        execution_price_q18,
        mid_price_q18,
        price_impact_bps,
        path: vec![token_in.clone(), token_out.clone()],
        route_addresses: vec![token_in.address, token_out.address],
        sources: vec![source],
        hop_versions,
        liquidity_score,
        estimated_gas_units,
        estimated_gas_cost_wei,
        gas_price_wei,
        is_split: None,
        splits: None,
        offers: None,
    })
}

/// Compose two leg quotes into one two-hop quote. The legs must share
/// the intermediate token and leg B must consume leg A's output.
pub fn combine_two_hop(
    leg_a: &PriceQuote,
    leg_b: &PriceQuote,
    gas_price_wei: Option<U256>,
) -> Option<PriceQuote> {
    let junction_a = leg_a.path.last()?;
    let junction_b = leg_b.path.first()?;
    if junction_a != junction_b {
        return None;
    }
    let token_in = leg_a.path.first()?;
    let token_out = leg_b.path.last()?;

    let amount_in = leg_a.amount_in;
    let amount_out = leg_b.amount_out;
    if amount_in.is_zero() || amount_out.is_zero() {
        return None;
    }

    let mid_price_q18 = multiply_q18(leg_a.mid_price_q18, leg_b.mid_price_q18);
    let execution_price_q18 = price_q18(
        amount_in,
        amount_out,
        token_in.decimals,
        token_out.decimals,
    );
    let price_impact_bps = leg_a
        .price_impact_bps
        .saturating_add(leg_b.price_impact_bps)
        .min(10_000);
    let liquidity_score = leg_a.liquidity_score.min(leg_b.liquidity_score);

    let mut path = leg_a.path.clone();
    path.extend(leg_b.path.iter().skip(1).cloned());
    let mut route_addresses = leg_a.route_addresses.clone();
    route_addresses.extend(leg_b.route_addresses.iter().skip(1).copied());
    let mut sources = leg_a.sources.clone();
    sources.extend(leg_b.sources.iter().cloned());
    let mut hop_versions = leg_a.hop_versions.clone();
    hop_versions.extend(leg_b.hop_versions.iter().copied());

    let estimated_gas_units = gas::estimate_gas_units(&hop_versions);
    let estimated_gas_cost_wei =
        gas_price_wei.map(|p| p.saturating_mul(U256::from(estimated_gas_units)));

    Some(PriceQuote {
        chain_key: leg_a.chain_key.clone(),
        amount_in,
        amount_out,
        price_q18: execution_price_q18,
        execution_price_q18,
        mid_price_q18,
        price_impact_bps,
        path,
        route_addresses,
        sources,
        hop_versions,
        liquidity_score,
        estimated_gas_units,
        estimated_gas_cost_wei,
        gas_price_wei,
        is_split: None,
        splits: None,
        offers: None,
    })
}

fn liquidity_score(
    snapshot: &PoolSnapshot,
    token_in: &Token,
    token_out: &Token,
    mode: ScoreMode,
) -> U256 {
    match snapshot {
        PoolSnapshot::V2 {
            reserve0, reserve1, ..
        } => {
            let (reserve_in, reserve_out) = if snapshot.zero_for_one(token_in.address) {
                (*reserve0, *reserve1)
            } else {
                (*reserve1, *reserve0)
            };
            match mode {
                ScoreMode::Direct => reserve_in.saturating_add(reserve_out),
                ScoreMode::MidPass => scale_to_q18(reserve_in, token_in.decimals)
                    .min(scale_to_q18(reserve_out, token_out.decimals)),
            }
        }
        PoolSnapshot::V3 { liquidity, .. } => U256::from(*liquidity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm::fixed_point::q18;
    use crate::types::DexProtocol;
    use alloy::primitives::Address;

    fn token(byte: u8, decimals: u8) -> Token {
        Token {
            chain_id: 137,
            address: Address::repeat_byte(byte),
            symbol: format!("T{byte}"),
            name: format!("Token {byte}"),
            decimals,
            total_supply: None,
        }
    }

    fn v2_dex() -> DexConfig {
        DexConfig {
            id: "quickswap".into(),
            protocol: DexProtocol::Uniswap,
            version: PoolVersion::V2,
            factory: Address::repeat_byte(0xfa),
            router: Address::repeat_byte(0xf0),
            quoter: None,
            fee_tiers: vec![],
            use_router02: false,
        }
    }

    fn v3_dex() -> DexConfig {
        DexConfig {
            id: "uniswap-v3".into(),
            protocol: DexProtocol::Uniswap,
            version: PoolVersion::V3,
            factory: Address::repeat_byte(0xfb),
            router: Address::repeat_byte(0xf1),
            quoter: Some(Address::repeat_byte(0xcc)),
            fee_tiers: vec![3000],
            use_router02: false,
        }
    }

    fn v2_snapshot(token0: &Token, token1: &Token, r0: U256, r1: U256) -> PoolSnapshot {
        PoolSnapshot::V2 {
            pair_address: Address::repeat_byte(0xaa),
            reserve0: r0,
            reserve1: r1,
            token0: token0.address,
            token1: token1.address,
        }
    }

    fn v3_snapshot(token0: &Token, token1: &Token, liquidity: u128) -> PoolSnapshot {
        PoolSnapshot::V3 {
            pool_address: Address::repeat_byte(0xbb),
            sqrt_price_x96: U256::from(1u64) << 96,
            tick: 0,
            liquidity,
            fee: 3000,
            token0: token0.address,
            token1: token1.address,
        }
    }

    #[test]
    fn test_direct_v2_quote_shape_and_impact() {
        let a = token(0x01, 18);
        let b = token(0x02, 18);
        let r = U256::from(1_000_000u64) * q18();
        let amount_in = U256::from(1_000u64) * q18();
        let quote = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&a, &b, r, r),
            &a,
            &b,
            amount_in,
            None,
            None,
            ScoreMode::Direct,
        )
        .unwrap();

        let expected = U256::from_str_radix("996006981039903216183", 10).unwrap();
        let diff = if quote.amount_out > expected {
            quote.amount_out - expected
        } else {
            expected - quote.amount_out
        };
        assert!(diff <= U256::from(1u64));
        assert!(quote.price_impact_bps <= 100);
        assert_eq!(quote.path.len(), 2);
        assert_eq!(quote.sources.len(), 1);
        assert_eq!(quote.hop_versions, vec![PoolVersion::V2]);
        assert_eq!(quote.route_addresses, vec![a.address, b.address]);
        assert_eq!(quote.liquidity_score, r + r);
        assert_eq!(quote.estimated_gas_units, 120_000);
        assert!(quote.estimated_gas_cost_wei.is_none());
        assert!(quote.is_split.is_none());
    }

    #[test]
    fn test_quoter_result_takes_precedence() {
        let a = token(0x01, 18);
        let b = token(0x02, 18);
        let quote = build_single_hop_quote(
            "polygon",
            &v3_dex(),
            v3_snapshot(&a, &b, 10_000_000_000_000_000_000_000u128),
            &a,
            &b,
            q18(),
            Some(U256::from(123u64)),
            None,
            ScoreMode::Direct,
        )
        .unwrap();
        assert_eq!(quote.amount_out, U256::from(123u64));
        assert_eq!(quote.sources[0].fee_tier, Some(3000));
    }

    #[test]
    fn test_gas_cost_present_when_price_known() {
        let a = token(0x01, 18);
        let b = token(0x02, 18);
        let r = U256::from(1_000u64) * q18();
        let quote = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&a, &b, r, r),
            &a,
            &b,
            q18(),
            None,
            Some(U256::from(30_000_000_000u64)),
            ScoreMode::Direct,
        )
        .unwrap();
        assert_eq!(
            quote.estimated_gas_cost_wei,
            Some(U256::from(120_000u64) * U256::from(30_000_000_000u64))
        );
        assert_eq!(quote.gas_price_wei, Some(U256::from(30_000_000_000u64)));
    }

    #[test]
    fn test_zero_output_yields_no_quote() {
        let a = token(0x01, 18);
        let b = token(0x02, 18);
        let empty = v2_snapshot(&a, &b, U256::ZERO, U256::ZERO);
        assert!(build_single_hop_quote(
            "polygon",
            &v2_dex(),
            empty,
            &a,
            &b,
            q18(),
            None,
            None,
            ScoreMode::Direct,
        )
        .is_none());
    }

    #[test]
    fn test_two_hop_combination() {
        let a = token(0x01, 18);
        let mid = token(0x02, 18);
        let b = token(0x03, 18);

        // leg A: v2 pool 5000/5000 (scaled by 1e18)
        let r = U256::from(5_000u64) * q18();
        let leg_a = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&a, &mid, r, r),
            &a,
            &mid,
            q18(),
            None,
            None,
            ScoreMode::MidPass,
        )
        .unwrap();

        // leg B: v3 pool at price 1.0, L = 1e22
        let leg_b = build_single_hop_quote(
            "polygon",
            &v3_dex(),
            v3_snapshot(&mid, &b, 10_000_000_000_000_000_000_000u128),
            &mid,
            &b,
            leg_a.amount_out,
            None,
            None,
            ScoreMode::MidPass,
        )
        .unwrap();

        let combined = combine_two_hop(&leg_a, &leg_b, None).unwrap();
        assert_eq!(
            combined.hop_versions,
            vec![PoolVersion::V2, PoolVersion::V3]
        );
        assert_eq!(combined.path.len(), 3);
        assert_eq!(combined.sources.len(), 2);
        assert_eq!(combined.amount_in, leg_a.amount_in);
        assert_eq!(combined.amount_out, leg_b.amount_out);
        assert_eq!(
            combined.price_impact_bps,
            leg_a.price_impact_bps + leg_b.price_impact_bps
        );
        assert_eq!(
            combined.liquidity_score,
            leg_a.liquidity_score.min(leg_b.liquidity_score)
        );
        // both legs sit at mid price 1.0, so the product stays 1.0
        assert_eq!(combined.mid_price_q18, q18());
        assert_eq!(
            combined.estimated_gas_units,
            50_000 + 70_000 + 110_000 + 20_000
        );
    }

    #[test]
    fn test_quote_shape_invariants() {
        // path.len == sources.len + 1 == hop_versions.len + 1 and the
        // route addresses track the token sequence, for both shapes.
        let a = token(0x01, 18);
        let mid = token(0x02, 18);
        let b = token(0x03, 18);
        let r = U256::from(5_000u64) * q18();

        let single = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&a, &b, r, r),
            &a,
            &b,
            q18(),
            None,
            None,
            ScoreMode::Direct,
        )
        .unwrap();
        let leg_a = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&a, &mid, r, r),
            &a,
            &mid,
            q18(),
            None,
            None,
            ScoreMode::MidPass,
        )
        .unwrap();
        let leg_b = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&mid, &b, r, r),
            &mid,
            &b,
            leg_a.amount_out,
            None,
            None,
            ScoreMode::MidPass,
        )
        .unwrap();
        let double = combine_two_hop(&leg_a, &leg_b, None).unwrap();

        for quote in [&single, &double] {
            assert_eq!(quote.path.len(), quote.sources.len() + 1);
            assert_eq!(quote.path.len(), quote.hop_versions.len() + 1);
            assert_eq!(quote.path.len(), quote.route_addresses.len());
            for (token, address) in quote.path.iter().zip(&quote.route_addresses) {
                assert_eq!(token.address, *address);
            }
            assert!(quote.price_impact_bps <= 10_000);
        }
    }

    #[test]
    fn test_combine_rejects_mismatched_junction() {
        let a = token(0x01, 18);
        let mid = token(0x02, 18);
        let other = token(0x04, 18);
        let b = token(0x03, 18);
        let r = U256::from(5_000u64) * q18();

        let leg_a = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&a, &mid, r, r),
            &a,
            &mid,
            q18(),
            None,
            None,
            ScoreMode::MidPass,
        )
        .unwrap();
        let leg_b = build_single_hop_quote(
            "polygon",
            &v2_dex(),
            v2_snapshot(&other, &b, r, r),
            &other,
            &b,
            q18(),
            None,
            None,
            ScoreMode::MidPass,
        )
        .unwrap();
        assert!(combine_two_hop(&leg_a, &leg_b, None).is_none());
    }
}
