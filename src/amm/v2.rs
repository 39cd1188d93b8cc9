//! Constant-Product (v2) Swap Math
//!
//! Output, inverse, marginal derivative and mid price for `x * y = k`
//! pools with a flat per-trade fee expressed as a `(num, den)` pair,
//! e.g. (997, 1000) for the 0.30% family.
//!
//! All intermediates go through `U512`; reserves fit `uint112` on chain
//! so products never saturate the wide type for real pool state.

use super::fixed_point::pow10;
use alloy::primitives::{U256, U512};
use alloy::primitives::ruint::UintTryFrom;

/// Output amount for a given input using the constant product formula:
///
/// `amountOut = (amountIn * feeNum * reserveOut) /
///              (reserveIn * feeDen + amountIn * feeNum)`
///
/// Zero input or empty reserves return zero.
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_num: u32,
    fee_den: u32,
) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() || fee_den == 0 {
        return U256::ZERO;
    }

    let amount_in_with_fee = U512::from(amount_in) * U512::from(fee_num);
    let numerator = match amount_in_with_fee.checked_mul(U512::from(reserve_out)) {
        Some(v) => v,
        None => return U256::ZERO,
    };
    let denominator = match (U512::from(reserve_in) * U512::from(fee_den))
        .checked_add(amount_in_with_fee)
    {
        Some(v) => v,
        None => return U256::ZERO,
    };

    U256::uint_try_from(numerator / denominator).unwrap_or(U256::ZERO)
}

/// Input amount required for a target output. Inverse of
/// [`get_amount_out`]. Returns `U256::MAX` when the pool cannot produce
/// `amount_out` at any input size.
pub fn get_amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_num: u32,
    fee_den: u32,
) -> U256 {
    if amount_out.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() || fee_num == 0 {
        return U256::ZERO;
    }
    if amount_out >= reserve_out {
        return U256::MAX;
    }

    let numerator = U512::from(reserve_in) * U512::from(amount_out) * U512::from(fee_den);
    let denominator = (U512::from(reserve_out) - U512::from(amount_out)) * U512::from(fee_num);

    U256::uint_try_from(numerator / denominator + U512::from(1u64)).unwrap_or(U256::MAX)
}

/// Marginal output per unit input at allocation `amount_in`, scaled by
/// `2^128`:
///
/// `d out / d in = feeNum * feeDen * reserveIn * reserveOut /
///                 (reserveIn * feeDen + amountIn * feeNum)^2`
///
/// Strictly decreasing in `amount_in` for any nontrivial pool, which the
/// split optimizer relies on.
pub fn marginal_q128(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_num: u32,
    fee_den: u32,
) -> U256 {
    if reserve_in.is_zero() || reserve_out.is_zero() || fee_den == 0 {
        return U256::ZERO;
    }

    let fee_product = U512::from(u64::from(fee_num) * u64::from(fee_den));
    let numerator = match reserve_in
        .widening_mul(reserve_out)
        .checked_mul(fee_product)
        .and_then(|v| v.checked_shl(128))
    {
        Some(v) => v,
        None => return U256::ZERO,
    };

    let inner = match (U512::from(reserve_in) * U512::from(fee_den))
        .checked_add(U512::from(amount_in) * U512::from(fee_num))
    {
        Some(v) => v,
        None => return U256::ZERO,
    };
    let denominator = match inner.checked_mul(inner) {
        Some(v) => v,
        None => return U256::ZERO,
    };
    if denominator.is_zero() {
        return U256::ZERO;
    }

    U256::uint_try_from(numerator / denominator).unwrap_or(U256::ZERO)
}

/// Mid price at zero trade size, before fee, as Q18:
/// `reserveOut * 10^decIn * 10^18 / (reserveIn * 10^decOut)`.
pub fn mid_price_q18(reserve_in: U256, reserve_out: U256, dec_in: u8, dec_out: u8) -> U256 {
    let scale_in = pow10(dec_in.saturating_add(18));
    let scale_out = pow10(dec_out);
    if reserve_in.is_zero() || scale_in.is_zero() || scale_out.is_zero() {
        return U256::ZERO;
    }
    let numerator = reserve_out.widening_mul(scale_in);
    let denominator = U512::from(reserve_in) * U512::from(scale_out);
    U256::uint_try_from(numerator / denominator).unwrap_or(U256::ZERO)
}
