//! Concentrated-Liquidity (v3) Swap Math
//!
//! Single-tick output, marginal derivative and mid price from
//! `sqrtPriceX96` (Q64.96) and active liquidity. Valid only while the
//! swap stays inside the current initialized-liquidity range; callers
//! prefer a quoter-contract result when one is configured and treat
//! these values as an approximation otherwise. There is no tick
//! traversal here.

use super::fixed_point::pow10;
use alloy::primitives::{U256, U512};
use alloy::primitives::ruint::UintTryFrom;

/// Parts-per-million denominator for v3 fee tiers.
const FEE_PPM_DENOM: u64 = 1_000_000;

/// Fee-reduced input: `amountIn * (1e6 - fee_ppm) / 1e6`.
fn amount_in_less_fee(amount_in: U256, fee_ppm: u32) -> U256 {
    let keep = FEE_PPM_DENOM.saturating_sub(u64::from(fee_ppm));
    let wide = U512::from(amount_in) * U512::from(keep) / U512::from(FEE_PPM_DENOM);
    U256::uint_try_from(wide).unwrap_or(U256::ZERO)
}

/// Single-tick output amount.
///
/// Zero-for-one (token0 in, token1 out), with `A = L * 2^96`:
///
/// ```text
/// x'            = amountIn * (1e6 - fee) / 1e6
/// sqrtPriceNext = A * P / (A + x' * P)
/// amountOut     = L * (P - sqrtPriceNext) / 2^96
/// ```
///
/// One-for-zero moves the price up by `x' * 2^96 / L` and pays out
/// `L * 2^96 * (P' - P) / (P' * P)` of token0.
pub fn get_amount_out(
    sqrt_price_x96: U256,
    liquidity: u128,
    fee_ppm: u32,
    amount_in: U256,
    zero_for_one: bool,
) -> U256 {
    if amount_in.is_zero() || liquidity == 0 || sqrt_price_x96.is_zero() {
        return U256::ZERO;
    }
    let scaled_in = amount_in_less_fee(amount_in, fee_ppm);
    if scaled_in.is_zero() {
        return U256::ZERO;
    }

    let price = U512::from(sqrt_price_x96);
    let liquidity_x96 = U512::from(liquidity) << 96usize;

    if zero_for_one {
        let denominator = match liquidity_x96.checked_add(U512::from(scaled_in) * price) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        let sqrt_next = liquidity_x96 * price / denominator;
        let delta = price - sqrt_next;
        let out = U512::from(liquidity) * delta >> 96;
        U256::uint_try_from(out).unwrap_or(U256::ZERO)
    } else {
        let delta = (U512::from(scaled_in) << 96) / U512::from(liquidity);
        let sqrt_next = match price.checked_add(delta) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        // amount0 = L * 2^96 * (P' - P) / (P' * P)
        let numerator = match liquidity_x96.checked_mul(delta) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        let denominator = match sqrt_next.checked_mul(price) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        if denominator.is_zero() {
            return U256::ZERO;
        }
        U256::uint_try_from(numerator / denominator).unwrap_or(U256::ZERO)
    }
}

/// Marginal output per unit input at allocation `amount_in`, scaled by
/// `2^128`. Strictly decreasing in the allocation (concavity) within the
/// current tick range.
pub fn marginal_q128(
    sqrt_price_x96: U256,
    liquidity: u128,
    fee_ppm: u32,
    amount_in: U256,
    zero_for_one: bool,
) -> U256 {
    if liquidity == 0 || sqrt_price_x96.is_zero() {
        return U256::ZERO;
    }
    let keep = FEE_PPM_DENOM.saturating_sub(u64::from(fee_ppm));
    if keep == 0 {
        return U256::ZERO;
    }
    let scaled_in = amount_in_less_fee(amount_in, fee_ppm);
    let price = U512::from(sqrt_price_x96);

    let base_q128 = if zero_for_one {
        // d out / d x' = (L * P / (A + x'P))^2; computed as a Q64 root
        // squared into Q128
        let denominator = match (U512::from(liquidity) << 96usize)
            .checked_add(U512::from(scaled_in) * price)
        {
            Some(v) => v,
            None => return U256::ZERO,
        };
        let root_q64 = (U512::from(liquidity) * price << 64) / denominator;
        let root = match U256::uint_try_from(root_q64) {
            Ok(v) => v,
            Err(_) => return U256::ZERO,
        };
        root.widening_mul(root)
    } else {
        // d out / d y' = 2^192 / P'^2, as Q128: 2^320 / P'^2
        let delta = (U512::from(scaled_in) << 96) / U512::from(liquidity);
        let sqrt_next = match price.checked_add(delta) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        let squared = match sqrt_next.checked_mul(sqrt_next) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        if squared.is_zero() {
            return U256::ZERO;
        }
        (U512::ONE << 320) / squared
    };

    // Apply the fee factor once: d x' / d x = keep / 1e6
    let with_fee = match base_q128.checked_mul(U512::from(keep)) {
        Some(v) => v / U512::from(FEE_PPM_DENOM),
        None => return U256::ZERO,
    };
    U256::uint_try_from(with_fee).unwrap_or(U256::ZERO)
}

/// Mid price as Q18 for the given trade direction.
///
/// The raw pool price is `P^2 / 2^192` token1 per token0; the inverse
/// direction uses `2^192 / P^2`. Decimal normalization follows the Q18
/// price convention.
pub fn mid_price_q18(sqrt_price_x96: U256, dec_in: u8, dec_out: u8, zero_for_one: bool) -> U256 {
    if sqrt_price_x96.is_zero() {
        return U256::ZERO;
    }
    let scale_in = pow10(dec_in.saturating_add(18));
    let scale_out = pow10(dec_out);
    if scale_in.is_zero() || scale_out.is_zero() {
        return U256::ZERO;
    }

    let squared = sqrt_price_x96.widening_mul(sqrt_price_x96);
    let (numerator, denominator) = if zero_for_one {
        // P^2 * 10^(18 + decIn) / (2^192 * 10^decOut)
        let num = match squared.checked_mul(U512::from(scale_in)) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        let den = match (U512::ONE << 192usize).checked_mul(U512::from(scale_out)) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        (num, den)
    } else {
        // 2^192 * 10^(18 + decIn) / (P^2 * 10^decOut)
        let num = match (U512::ONE << 192).checked_mul(U512::from(scale_in)) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        let den = match squared.checked_mul(U512::from(scale_out)) {
            Some(v) => v,
            None => return U256::ZERO,
        };
        (num, den)
    };
    if denominator.is_zero() {
        return U256::ZERO;
    }
    U256::uint_try_from(numerator / denominator).unwrap_or(U256::ZERO)
}
