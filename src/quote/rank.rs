//! Gas-Adjusted Quote Ranking
//!
//! Total-order comparator over quotes. The primary key is raw output, or
//! output net of gas when a native→output price is available. Ties fall
//! through gas cost (missing ranks after present), liquidity score, then
//! price impact. The winner carries every non-winning candidate as
//! `offers`, best first.

use super::gas::convert_gas_to_output_units;
use crate::types::PriceQuote;
use alloy::primitives::U256;
use std::cmp::Ordering;

/// Compare two quotes; `Less` means `a` ranks ahead of `b`.
///
/// Antisymmetric and transitive for any fixed `(price, decimals)` input,
/// so it is safe for sorting. `compare_quotes(x, x)` is always `Equal`.
pub fn compare_quotes(
    a: &PriceQuote,
    b: &PriceQuote,
    native_to_output_price_q18: Option<U256>,
    output_decimals: Option<u8>,
) -> Ordering {
    let key_a = ranking_output(a, native_to_output_price_q18, output_decimals);
    let key_b = ranking_output(b, native_to_output_price_q18, output_decimals);

    key_b
        .cmp(&key_a)
        .then_with(|| compare_gas_cost(a, b))
        .then_with(|| b.liquidity_score.cmp(&a.liquidity_score))
        .then_with(|| a.price_impact_bps.cmp(&b.price_impact_bps))
}

/// The primary ranking key: `amount_out`, reduced by the gas cost
/// converted into output units when a conversion price is supplied.
fn ranking_output(
    quote: &PriceQuote,
    native_to_output_price_q18: Option<U256>,
    output_decimals: Option<u8>,
) -> U256 {
    match (native_to_output_price_q18, output_decimals) {
        (Some(price), Some(decimals)) => {
            let cost = quote
                .estimated_gas_cost_wei
                .map(|wei| convert_gas_to_output_units(wei, decimals, price))
                .unwrap_or(U256::ZERO);
            quote.amount_out.saturating_sub(cost)
        }
        _ => quote.amount_out,
    }
}

/// Lower gas cost wins; a quote with no cost estimate ranks after one
/// that has it. "Missing" and "zero" are distinct.
fn compare_gas_cost(a: &PriceQuote, b: &PriceQuote) -> Ordering {
    match (a.estimated_gas_cost_wei, b.estimated_gas_cost_wei) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

/// Rank the candidate set and return the winner with the remaining
/// candidates attached as `offers` (best first, winner excluded).
pub fn select_best(
    mut candidates: Vec<PriceQuote>,
    native_to_output_price_q18: Option<U256>,
    output_decimals: Option<u8>,
) -> Option<PriceQuote> {
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(|a, b| {
        compare_quotes(a, b, native_to_output_price_q18, output_decimals)
    });
    let mut winner = candidates.remove(0);
    if !candidates.is_empty() {
        winner.offers = Some(candidates);
    }
    Some(winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm::fixed_point::q18;
    use crate::types::{PoolVersion, Token};
    use alloy::primitives::Address;

    fn quote(amount_out: u64, gas_cost: Option<u64>, liquidity: u64, impact: u16) -> PriceQuote {
        let token = |byte: u8| Token {
            chain_id: 137,
            address: Address::repeat_byte(byte),
            symbol: "T".into(),
            name: "T".into(),
            decimals: 18,
            total_supply: None,
        };
        PriceQuote {
            chain_key: "polygon".into(),
            amount_in: q18(),
            amount_out: U256::from(amount_out),
            price_q18: U256::ZERO,
            execution_price_q18: U256::ZERO,
            mid_price_q18: U256::ZERO,
            price_impact_bps: impact,
            path: vec![token(0x01), token(0x02)],
            route_addresses: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            sources: vec![],
            hop_versions: vec![PoolVersion::V2],
            liquidity_score: U256::from(liquidity),
            estimated_gas_units: 120_000,
            estimated_gas_cost_wei: gas_cost.map(U256::from),
            gas_price_wei: None,
            is_split: None,
            splits: None,
            offers: None,
        }
    }

    #[test]
    fn test_higher_output_wins() {
        let a = quote(200, None, 1, 0);
        let b = quote(100, None, 1, 0);
        assert_eq!(compare_quotes(&a, &b, None, None), Ordering::Less);
        assert_eq!(compare_quotes(&b, &a, None, None), Ordering::Greater);
    }

    #[test]
    fn test_reflexive_and_antisymmetric() {
        let a = quote(100, Some(5), 10, 30);
        let b = quote(100, Some(7), 10, 30);
        assert_eq!(compare_quotes(&a, &a, None, None), Ordering::Equal);
        assert_eq!(
            compare_quotes(&a, &b, None, None),
            compare_quotes(&b, &a, None, None).reverse()
        );
    }

    #[test]
    fn test_transitive_over_tiebreaks() {
        let a = quote(100, Some(1), 50, 10);
        let b = quote(100, Some(1), 50, 20);
        let c = quote(100, Some(1), 40, 5);
        // a < b (impact), b < c (liquidity), so a < c must hold
        assert_eq!(compare_quotes(&a, &b, None, None), Ordering::Less);
        assert_eq!(compare_quotes(&b, &c, None, None), Ordering::Less);
        assert_eq!(compare_quotes(&a, &c, None, None), Ordering::Less);
    }

    #[test]
    fn test_missing_gas_cost_ranks_after_present() {
        let priced = quote(100, Some(1_000_000), 1, 0);
        let unpriced = quote(100, None, 1, 0);
        assert_eq!(compare_quotes(&priced, &unpriced, None, None), Ordering::Less);
        // and zero is better than any positive cost
        let free = quote(100, Some(0), 1, 0);
        assert_eq!(compare_quotes(&free, &priced, None, None), Ordering::Less);
    }

    #[test]
    fn test_net_output_key_flips_winner() {
        // a pays out 10 more units but costs 1e6 wei more gas
        let a = quote(1_000_010, Some(2_000_000), 1, 0);
        let b = quote(1_000_000, Some(1_000_000), 1, 0);
        // raw output: a wins
        assert_eq!(compare_quotes(&a, &b, None, None), Ordering::Less);
        // net of gas at price 1.0 with 18-decimal output: b wins
        assert_eq!(
            compare_quotes(&a, &b, Some(q18()), Some(18)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_liquidity_then_impact_tiebreaks() {
        let deep = quote(100, None, 500, 40);
        let shallow = quote(100, None, 100, 10);
        assert_eq!(compare_quotes(&deep, &shallow, None, None), Ordering::Less);

        let calm = quote(100, None, 500, 10);
        assert_eq!(compare_quotes(&calm, &deep, None, None), Ordering::Less);
    }

    #[test]
    fn test_select_best_attaches_offers() {
        let winner = quote(300, None, 1, 0);
        let second = quote(200, None, 1, 0);
        let third = quote(100, None, 1, 0);
        let best = select_best(
            vec![third.clone(), winner.clone(), second.clone()],
            None,
            None,
        )
        .unwrap();
        assert_eq!(best.amount_out, U256::from(300u64));
        let offers = best.offers.unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].amount_out, U256::from(200u64));
        assert_eq!(offers[1].amount_out, U256::from(100u64));
    }

    #[test]
    fn test_select_best_single_candidate_has_no_offers() {
        let best = select_best(vec![quote(100, None, 1, 0)], None, None).unwrap();
        assert!(best.offers.is_none());
        assert!(select_best(vec![], None, None).is_none());
    }
}
