//! Split Optimizer — Marginal-Price Equalization
//!
//! Searches N-way allocations of the input across disjoint route
//! candidates. Each route's output is concave in its allocation, so the
//! optimum has equal marginal prices; the loop transfers input from the
//! lowest-marginal leg to the highest until the spread converges. All
//! arithmetic is integer; every candidate's output is recomputed from
//! the pool snapshots carried in its `PriceSource`s.

use crate::amm;
use crate::amm::fixed_point::{mul_div, price_q18};
use crate::config::RouterSettings;
use crate::quote::gas::convert_gas_to_output_units;
use crate::types::{PriceQuote, SplitLeg};
use alloy::primitives::U256;
use alloy::primitives::ruint::UintTryFrom;
use std::collections::HashSet;
use tracing::debug;

/// Search for a split allocation that beats the best single route net of
/// gas. Returns `None` when no acceptable split exists.
pub fn optimize_split(
    candidates: &[PriceQuote],
    amount_in: U256,
    gas_price_wei: Option<U256>,
    native_to_output_price_q18: Option<U256>,
    output_decimals: u8,
    settings: &RouterSettings,
) -> Option<PriceQuote> {
    if amount_in.is_zero() || settings.max_split_legs < 2 || candidates.len() < 2 {
        return None;
    }

    let best_single_out = candidates
        .iter()
        .map(|c| c.amount_out)
        .max()
        .unwrap_or(U256::ZERO);

    // Same-pool routes cannot co-split: keep only the best candidate per
    // pool, best-output first, then cap the combination space.
    let mut order: Vec<&PriceQuote> = candidates.iter().collect();
    order.sort_by(|a, b| b.amount_out.cmp(&a.amount_out));
    let mut seen_pools: HashSet<(String, alloy::primitives::Address)> = HashSet::new();
    let mut kept: Vec<&PriceQuote> = Vec::new();
    for candidate in order {
        let keys = candidate.pool_keys();
        if keys.iter().any(|k| seen_pools.contains(k)) {
            continue;
        }
        seen_pools.extend(keys);
        kept.push(candidate);
        if kept.len() == settings.split_candidate_cap {
            break;
        }
    }
    if kept.len() < 2 {
        return None;
    }

    let min_allocation = mul_div(
        amount_in,
        U256::from(settings.min_leg_ratio_bps),
        U256::from(10_000u64),
    );

    let max_legs = settings.max_split_legs.min(kept.len());
    let mut best: Option<(U256, Vec<(usize, U256)>)> = None;

    for legs in 2..=max_legs {
        for combo in combinations(kept.len(), legs) {
            let members: Vec<&PriceQuote> = combo.iter().map(|&i| kept[i]).collect();
            if let Some(allocation) =
                equalize_marginals(&members, amount_in, min_allocation, settings)
            {
                let total: U256 = allocation.iter().fold(U256::ZERO, |acc, (mi, x)| {
                    acc.saturating_add(route_amount_out(members[*mi], *x))
                });
                let tagged: Vec<(usize, U256)> = allocation
                    .into_iter()
                    .map(|(mi, x)| (combo[mi], x))
                    .collect();
                if best.as_ref().map(|(t, _)| total > *t).unwrap_or(true) {
                    best = Some((total, tagged));
                }
            }
        }
    }

    let (split_total, allocation) = best?;
    if split_total <= best_single_out {
        return None;
    }

    // Gas guard: the split only stands if its output gain exceeds the
    // extra per-leg execution overhead.
    if let Some(gas_price) = gas_price_wei {
        let extra_legs = allocation.len() as u64 - 1;
        let extra_wei =
            U256::from(settings.split_leg_gas_overhead * extra_legs).saturating_mul(gas_price);
        let gain = split_total - best_single_out;
        let rejected = match native_to_output_price_q18 {
            Some(price) => {
                gain <= convert_gas_to_output_units(extra_wei, output_decimals, price)
            }
            // Without a conversion price the guard only applies when wei
            // and output units share the 18-decimal scale.
            None => output_decimals == 18 && gain <= extra_wei,
        };
        if rejected {
            debug!(
                "split rejected by gas guard: gain {} vs extra gas {} wei",
                gain, extra_wei
            );
            return None;
        }
    }

    Some(assemble_split(
        &kept,
        allocation,
        amount_in,
        split_total,
        gas_price_wei,
        settings,
    ))
}

/// Run the MPE loop for one combination. Returns `(member index,
/// allocation)` pairs pruned of dust legs, or `None` when fewer than two
/// legs survive.
fn equalize_marginals(
    members: &[&PriceQuote],
    amount_in: U256,
    min_allocation: U256,
    settings: &RouterSettings,
) -> Option<Vec<(usize, U256)>> {
    let legs = members.len();

    // Equal start, residual to the last leg.
    let share = amount_in / U256::from(legs as u64);
    let mut allocation = vec![share; legs];
    allocation[legs - 1] = amount_in - share * U256::from(legs as u64 - 1);

    let mut marginals: Vec<U256> = members
        .iter()
        .zip(&allocation)
        .map(|(c, x)| route_marginal_q128(c, *x))
        .collect();
    let mut total = total_output(members, &allocation);

    for _ in 0..settings.max_optimizer_iterations {
        let (hi, lo) = extremes(&marginals);
        if hi == lo {
            break;
        }
        let (m_hi, m_lo) = (marginals[hi], marginals[lo]);
        if m_hi.is_zero() {
            break;
        }
        let spread_bps = mul_div(m_hi - m_lo, U256::from(10_000u64), m_hi);
        if spread_bps <= U256::from(settings.convergence_threshold_bps) {
            break;
        }

        let mut delta = mul_div(amount_in, spread_bps, U256::from(30_000u64))
            .max(U256::from(1u64));
        // Clamp so the donor leg stays at or above the floor.
        if allocation[lo] <= min_allocation {
            break;
        }
        let headroom = allocation[lo] - min_allocation;
        if delta > headroom {
            delta = headroom;
        }
        if delta.is_zero() {
            break;
        }

        allocation[lo] -= delta;
        allocation[hi] += delta;
        marginals[lo] = route_marginal_q128(members[lo], allocation[lo]);
        marginals[hi] = route_marginal_q128(members[hi], allocation[hi]);

        // Concavity makes each transfer non-decreasing in total output;
        // integer rounding can still produce a degenerate step, which is
        // undone and ends the search.
        let new_total = total_output(members, &allocation);
        if new_total < total {
            allocation[lo] += delta;
            allocation[hi] -= delta;
            break;
        }
        total = new_total;
    }

    // Prune dust legs, moving their input to the hungriest survivor.
    let mut pruned_amount = U256::ZERO;
    let mut survivors: Vec<(usize, U256)> = Vec::with_capacity(legs);
    for (i, &x) in allocation.iter().enumerate() {
        if x < min_allocation || x.is_zero() {
            pruned_amount += x;
        } else {
            survivors.push((i, x));
        }
    }
    if survivors.len() < 2 {
        return None;
    }
    if !pruned_amount.is_zero() {
        let target = survivors
            .iter()
            .enumerate()
            .max_by_key(|(_, (i, x))| route_marginal_q128(members[*i], *x))
            .map(|(pos, _)| pos)?;
        survivors[target].1 += pruned_amount;
    }
    Some(survivors)
}

fn total_output(members: &[&PriceQuote], allocation: &[U256]) -> U256 {
    members
        .iter()
        .zip(allocation)
        .fold(U256::ZERO, |acc, (c, x)| {
            acc.saturating_add(route_amount_out(c, *x))
        })
}

fn extremes(marginals: &[U256]) -> (usize, usize) {
    let mut hi = 0;
    let mut lo = 0;
    for (i, m) in marginals.iter().enumerate() {
        if *m > marginals[hi] {
            hi = i;
        }
        if *m < marginals[lo] {
            lo = i;
        }
    }
    (hi, lo)
}

/// Re-simulate a candidate route at a hypothetical input, hop by hop,
/// from the snapshots its sources carry.
pub fn route_amount_out(quote: &PriceQuote, amount_in: U256) -> U256 {
    let mut amount = amount_in;
    for (i, source) in quote.sources.iter().enumerate() {
        if amount.is_zero() {
            return U256::ZERO;
        }
        let token_in = quote.route_addresses[i];
        amount = amm::snapshot_amount_out(&source.snapshot, source.protocol, token_in, amount);
    }
    amount
}

/// Marginal `d out / d in` (Q128) of a whole route at the given input:
/// the chain-rule product of per-hop marginals at their local amounts.
pub fn route_marginal_q128(quote: &PriceQuote, amount_in: U256) -> U256 {
    let mut marginal = U256::from(1u64) << 128usize;
    let mut amount = amount_in;
    for (i, source) in quote.sources.iter().enumerate() {
        let token_in = quote.route_addresses[i];
        let hop =
            amm::snapshot_marginal_q128(&source.snapshot, source.protocol, token_in, amount);
        let wide = marginal.widening_mul(hop) >> 128;
        marginal = match U256::uint_try_from(wide) {
            Ok(v) => v,
            Err(_) => return U256::ZERO,
        };
        if marginal.is_zero() {
            return U256::ZERO;
        }
        amount = amm::snapshot_amount_out(&source.snapshot, source.protocol, token_in, amount);
    }
    marginal
}

/// Rebuild one leg quote at its final allocation.
fn rebuild_leg(template: &PriceQuote, allocation: U256, gas_price_wei: Option<U256>) -> PriceQuote {
    let mut leg = template.clone();
    leg.offers = None;
    leg.amount_in = allocation;

    let mut amount = allocation;
    for (i, source) in leg.sources.iter_mut().enumerate() {
        let token_in = leg.route_addresses[i];
        source.amount_in = amount;
        amount = amm::snapshot_amount_out(&source.snapshot, source.protocol, token_in, amount);
        source.amount_out = amount;
    }
    leg.amount_out = amount;

    let dec_in = leg.path.first().map(|t| t.decimals).unwrap_or(18);
    let dec_out = leg.path.last().map(|t| t.decimals).unwrap_or(18);
    leg.execution_price_q18 = price_q18(leg.amount_in, leg.amount_out, dec_in, dec_out);
    leg.price_q18 = leg.execution_price_q18;
    leg.price_impact_bps = amm::price_impact_bps(
        leg.mid_price_q18,
        leg.amount_in,
        leg.amount_out,
        dec_in,
        dec_out,
    );
    leg.estimated_gas_cost_wei =
        gas_price_wei.map(|p| p.saturating_mul(U256::from(leg.estimated_gas_units)));
    leg.gas_price_wei = gas_price_wei;
    leg
}

/// Emit the synthetic parent quote for an accepted allocation.
fn assemble_split(
    kept: &[&PriceQuote],
    allocation: Vec<(usize, U256)>,
    amount_in: U256,
    split_total: U256,
    gas_price_wei: Option<U256>,
    settings: &RouterSettings,
) -> PriceQuote {
    let mut sized: Vec<(&PriceQuote, U256)> = allocation
        .into_iter()
        .map(|(i, x)| (kept[i], x))
        .collect();
    // Largest leg first; the ratio residual lands on the last leg.
    sized.sort_by(|a, b| b.1.cmp(&a.1));

    let mut legs: Vec<SplitLeg> = Vec::with_capacity(sized.len());
    let mut ratio_spent: u16 = 0;
    for (i, (template, x)) in sized.iter().enumerate() {
        let ratio_bps = if i + 1 == sized.len() {
            10_000 - ratio_spent
        } else {
            let share = mul_div(*x, U256::from(10_000u64), amount_in);
            let share = u16::try_from(share.to::<u64>().min(10_000)).unwrap_or(10_000);
            ratio_spent += share;
            share
        };
        legs.push(SplitLeg {
            quote: rebuild_leg(template, *x, gas_price_wei),
            ratio_bps,
        });
    }

    // Amount conservation: absorb per-hop rounding into the primary leg
    // so the leg inputs sum to the requested amount exactly.
    let leg_in_total: U256 = legs
        .iter()
        .fold(U256::ZERO, |acc, l| acc + l.quote.amount_in);
    debug_assert_eq!(leg_in_total, amount_in);
    let amount_out: U256 = legs
        .iter()
        .fold(U256::ZERO, |acc, l| acc + l.quote.amount_out);
    debug_assert_eq!(amount_out, split_total);

    // The parent quote inherits path, mid price and liquidity from the
    // primary (largest) leg.
    let mut parent = legs[0].quote.clone();
    let dec_in = parent.path.first().map(|t| t.decimals).unwrap_or(18);
    let dec_out = parent.path.last().map(|t| t.decimals).unwrap_or(18);

    // Ratio-weighted impact across legs.
    let impact_weighted: u64 = legs
        .iter()
        .map(|l| u64::from(l.quote.price_impact_bps) * u64::from(l.ratio_bps))
        .sum::<u64>()
        / 10_000;

    let estimated_gas_units: u64 = legs
        .iter()
        .map(|l| l.quote.estimated_gas_units)
        .sum::<u64>()
        + settings.split_leg_gas_overhead * (legs.len() as u64 - 1);

    parent.amount_in = amount_in;
    parent.amount_out = amount_out;
    parent.price_q18 = price_q18(amount_in, amount_out, dec_in, dec_out);
    parent.execution_price_q18 = parent.price_q18;
    parent.price_impact_bps = u16::try_from(impact_weighted.min(10_000)).unwrap_or(10_000);
    parent.estimated_gas_units = estimated_gas_units;
    parent.estimated_gas_cost_wei =
        gas_price_wei.map(|p| p.saturating_mul(U256::from(estimated_gas_units)));
    parent.gas_price_wei = gas_price_wei;
    parent.is_split = Some(true);
    parent.splits = Some(legs);
    parent.offers = None;
    parent
}

/// All size-`k` index combinations of `0..n`, lexicographic.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn recurse(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            recurse(i + 1, n, k, current, out);
            current.pop();
        }
    }
    recurse(0, n, k, &mut current, &mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm::fixed_point::q18;
    use crate::config::DexConfig;
    use crate::quote::{build_single_hop_quote, ScoreMode};
    use crate::types::{DexProtocol, PoolSnapshot, PoolVersion, Token};
    use alloy::primitives::Address;

    fn token(byte: u8) -> Token {
        Token {
            chain_id: 137,
            address: Address::repeat_byte(byte),
            symbol: format!("T{byte}"),
            name: format!("Token {byte}"),
            decimals: 18,
            total_supply: None,
        }
    }

    fn dex(id: &str) -> DexConfig {
        DexConfig {
            id: id.into(),
            protocol: DexProtocol::Uniswap,
            version: PoolVersion::V2,
            factory: Address::repeat_byte(0xfa),
            router: Address::repeat_byte(0xf0),
            quoter: None,
            fee_tiers: vec![],
            use_router02: false,
        }
    }

    fn v2_candidate(pool_byte: u8, dex_id: &str, reserves: U256, amount_in: U256) -> PriceQuote {
        let a = token(0x01);
        let b = token(0x02);
        let snapshot = PoolSnapshot::V2 {
            pair_address: Address::repeat_byte(pool_byte),
            reserve0: reserves,
            reserve1: reserves,
            token0: a.address,
            token1: b.address,
        };
        build_single_hop_quote(
            "polygon",
            &dex(dex_id),
            snapshot,
            &a,
            &b,
            amount_in,
            None,
            None,
            ScoreMode::Direct,
        )
        .unwrap()
    }

    fn settings() -> RouterSettings {
        RouterSettings::default()
    }

    #[test]
    fn test_identical_pools_split_near_even() {
        let amount = U256::from(200_000u64) * q18();
        let reserves = U256::from(1_000_000u64) * q18();
        let a = v2_candidate(0xaa, "dex-a", reserves, amount);
        let b = v2_candidate(0xbb, "dex-b", reserves, amount);
        let single_best = a.amount_out.max(b.amount_out);

        let split = optimize_split(
            &[a, b],
            amount,
            None,
            None,
            18,
            &settings(),
        )
        .unwrap();

        assert_eq!(split.is_split, Some(true));
        let legs = split.splits.as_ref().unwrap();
        assert_eq!(legs.len(), 2);
        // near 50/50
        for leg in legs {
            assert!(leg.ratio_bps >= 4995 && leg.ratio_bps <= 5005, "{}", leg.ratio_bps);
        }
        // ratios sum exactly; inputs conserve exactly
        let ratio_sum: u32 = legs.iter().map(|l| u32::from(l.ratio_bps)).sum();
        assert_eq!(ratio_sum, 10_000);
        let in_sum: U256 = legs
            .iter()
            .fold(U256::ZERO, |acc, l| acc + l.quote.amount_in);
        assert_eq!(in_sum, amount);
        let out_sum: U256 = legs
            .iter()
            .fold(U256::ZERO, |acc, l| acc + l.quote.amount_out);
        assert_eq!(out_sum, split.amount_out);

        // better than the single pool by more than 0.1%
        let improvement = (split.amount_out - single_best) * U256::from(100_000u64) / single_best;
        assert!(improvement > U256::from(100u64), "improvement {improvement}");
    }

    #[test]
    fn test_depth_asymmetry_favors_deep_pool() {
        let amount = U256::from(100_000u64) * q18();
        let deep = v2_candidate(0xaa, "dex-a", U256::from(2_000_000u64) * q18(), amount);
        let shallow = v2_candidate(0xbb, "dex-b", U256::from(500_000u64) * q18(), amount);
        let deep_alone = deep.amount_out;

        let split = optimize_split(
            &[deep, shallow],
            amount,
            None,
            None,
            18,
            &settings(),
        )
        .unwrap();

        let legs = split.splits.as_ref().unwrap();
        // primary (largest) leg runs through the deep pool with majority share
        assert_eq!(legs[0].quote.sources[0].pool, Address::repeat_byte(0xaa));
        assert!(legs[0].ratio_bps > 5_000);
        assert!(split.amount_out > deep_alone);
    }

    #[test]
    fn test_split_monotone_under_more_legs() {
        // Adding a third pool may only improve the chosen total.
        let amount = U256::from(150_000u64) * q18();
        let r = U256::from(1_000_000u64) * q18();
        let a = v2_candidate(0xaa, "dex-a", r, amount);
        let b = v2_candidate(0xbb, "dex-b", r, amount);
        let c = v2_candidate(0xcc, "dex-c", r, amount);

        let two = optimize_split(
            &[a.clone(), b.clone()],
            amount,
            None,
            None,
            18,
            &settings(),
        )
        .unwrap();
        let three = optimize_split(&[a, b, c], amount, None, None, 18, &settings()).unwrap();
        assert!(three.amount_out >= two.amount_out);
    }

    #[test]
    fn test_gas_guard_rejects_marginal_split() {
        // deep pools, small trade: split gain is dwarfed by leg overhead
        let amount = U256::from(100u64) * q18();
        let reserves = U256::from(10_000_000u64) * q18();
        let a = v2_candidate(0xaa, "dex-a", reserves, amount);
        let b = v2_candidate(0xbb, "dex-b", reserves, amount);

        let rejected = optimize_split(
            &[a.clone(), b.clone()],
            amount,
            Some(U256::from(100_000_000_000u64)), // 1e11 wei
            None,
            18,
            &settings(),
        );
        assert!(rejected.is_none());

        // with free gas the same split is accepted
        let accepted = optimize_split(&[a, b], amount, None, None, 18, &settings());
        assert!(accepted.is_some());
    }

    #[test]
    fn test_same_pool_candidates_cannot_co_split() {
        let amount = U256::from(200_000u64) * q18();
        let reserves = U256::from(1_000_000u64) * q18();
        // the same (dex, pool) presented twice
        let a = v2_candidate(0xaa, "dex-a", reserves, amount);
        let dup = v2_candidate(0xaa, "dex-a", reserves, amount);
        assert!(optimize_split(&[a, dup], amount, None, None, 18, &settings()).is_none());
    }

    #[test]
    fn test_single_candidate_and_legs_cap() {
        let amount = U256::from(200_000u64) * q18();
        let reserves = U256::from(1_000_000u64) * q18();
        let a = v2_candidate(0xaa, "dex-a", reserves, amount);
        let b = v2_candidate(0xbb, "dex-b", reserves, amount);

        assert!(optimize_split(&[a.clone()], amount, None, None, 18, &settings()).is_none());

        let mut capped = settings();
        capped.max_split_legs = 1;
        assert!(optimize_split(&[a, b], amount, None, None, 18, &capped).is_none());
    }

    #[test]
    fn test_route_marginal_is_concave() {
        let amount = U256::from(100_000u64) * q18();
        let candidate = v2_candidate(0xaa, "dex-a", U256::from(1_000_000u64) * q18(), amount);
        let m0 = route_marginal_q128(&candidate, U256::ZERO);
        let m1 = route_marginal_q128(&candidate, U256::from(10_000u64) * q18());
        let m2 = route_marginal_q128(&candidate, U256::from(50_000u64) * q18());
        assert!(m0 > m1 && m1 > m2);
    }

    #[test]
    fn test_route_amount_out_matches_quote() {
        let amount = U256::from(1_000u64) * q18();
        let candidate = v2_candidate(0xaa, "dex-a", U256::from(1_000_000u64) * q18(), amount);
        assert_eq!(route_amount_out(&candidate, amount), candidate.amount_out);
    }

    #[test]
    fn test_split_beats_equal_allocation_start() {
        // The MPE loop must never finish below its equal-split starting
        // point (monotone under concavity).
        let amount = U256::from(120_000u64) * q18();
        let deep = v2_candidate(0xaa, "dex-a", U256::from(3_000_000u64) * q18(), amount);
        let shallow = v2_candidate(0xbb, "dex-b", U256::from(400_000u64) * q18(), amount);

        let half = amount / U256::from(2u64);
        let equal_start =
            route_amount_out(&deep, half) + route_amount_out(&shallow, amount - half);

        let split = optimize_split(
            &[deep, shallow],
            amount,
            None,
            None,
            18,
            &settings(),
        )
        .unwrap();
        assert!(split.amount_out >= equal_start);
    }

    #[test]
    fn test_three_way_split_allocates_by_depth() {
        let amount = U256::from(300_000u64) * q18();
        let big = v2_candidate(0xaa, "dex-a", U256::from(4_000_000u64) * q18(), amount);
        let mid = v2_candidate(0xbb, "dex-b", U256::from(2_000_000u64) * q18(), amount);
        let small = v2_candidate(0xcc, "dex-c", U256::from(1_000_000u64) * q18(), amount);

        let split = optimize_split(
            &[small, big, mid],
            amount,
            None,
            None,
            18,
            &settings(),
        )
        .unwrap();
        let legs = split.splits.as_ref().unwrap();
        assert_eq!(legs.len(), 3);
        // legs come out largest-ratio first, tracking pool depth
        assert_eq!(legs[0].quote.sources[0].pool, Address::repeat_byte(0xaa));
        assert!(legs[0].ratio_bps >= legs[1].ratio_bps);
        assert!(legs[1].ratio_bps >= legs[2].ratio_bps);
        let ratio_sum: u32 = legs.iter().map(|l| u32::from(l.ratio_bps)).sum();
        assert_eq!(ratio_sum, 10_000);
    }

    #[test]
    fn test_combinations_enumeration() {
        assert_eq!(combinations(3, 2), vec![vec![0, 1], vec![0, 2], vec![1, 2]]);
        assert_eq!(combinations(4, 4).len(), 1);
        assert_eq!(combinations(5, 3).len(), 10);
    }
}
