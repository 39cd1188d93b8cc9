//! Deterministic Gas Model
//!
//! Route gas is a pure function of the hop versions; quoter-simulated
//! gas estimates are informational only and never override this model.

use crate::amm::fixed_point::apply_price_q18;
use crate::types::PoolVersion;
use alloy::primitives::U256;

/// Fixed overhead of one executor round trip.
pub const BASE_GAS: u64 = 50_000;
/// Marginal cost of a v2 pool traversal.
pub const V2_HOP_GAS: u64 = 70_000;
/// Marginal cost of a v3 pool traversal.
pub const V3_HOP_GAS: u64 = 110_000;
/// Chaining overhead per hop beyond the first.
pub const EXTRA_HOP_GAS: u64 = 20_000;

/// Gas units for a route with the given hop versions.
pub fn estimate_gas_units(hop_versions: &[PoolVersion]) -> u64 {
    let mut units = BASE_GAS;
    for version in hop_versions {
        units += match version {
            PoolVersion::V2 => V2_HOP_GAS,
            PoolVersion::V3 => V3_HOP_GAS,
        };
    }
    if hop_versions.len() > 1 {
        units += EXTRA_HOP_GAS * (hop_versions.len() as u64 - 1);
    }
    units
}

/// Convert a wei gas cost into output-token raw units using a Q18
/// native→output price. Returns zero when the conversion overflows.
pub fn convert_gas_to_output_units(
    cost_wei: U256,
    output_decimals: u8,
    native_to_output_price_q18: U256,
) -> U256 {
    apply_price_q18(native_to_output_price_q18, cost_wei, 18, output_decimals)
}
