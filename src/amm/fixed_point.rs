//! Fixed-Point Arithmetic
//!
//! Q18 scaling helpers over unbounded unsigned integers. Products are
//! staged through `U512` and divided last so no intermediate truncates.
//! Division truncates toward zero; a zero denominator or an overflow
//! yields the zero sentinel instead of panicking, which causes the
//! affected candidate to be dropped upstream.

use alloy::primitives::{U256, U512};
use alloy::primitives::ruint::UintTryFrom;

/// 10^18, the Q18 scale factor.
pub fn q18() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

/// 10^n, or zero when 10^n does not fit 256 bits (n > 77).
pub fn pow10(n: u8) -> U256 {
    let ten = U256::from(10u64);
    let mut acc = U256::from(1u64);
    for _ in 0..n {
        match acc.checked_mul(ten) {
            Some(v) => acc = v,
            None => return U256::ZERO,
        }
    }
    acc
}

/// `a * b / denom` with a 512-bit intermediate. Returns zero on a zero
/// denominator or if the result does not fit 256 bits.
pub fn mul_div(a: U256, b: U256, denom: U256) -> U256 {
    if denom.is_zero() {
        return U256::ZERO;
    }
    let wide = a.widening_mul(b);
    let quotient = wide / U512::from(denom);
    U256::uint_try_from(quotient).unwrap_or(U256::ZERO)
}

/// Scale a raw token amount to Q18: `amount * 10^18 / 10^decimals`.
pub fn scale_to_q18(amount: U256, decimals: u8) -> U256 {
    mul_div(amount, q18(), pow10(decimals))
}

/// Multiply two Q18 values, keeping Q18 scale: `a * b / 10^18`.
pub fn multiply_q18(a: U256, b: U256) -> U256 {
    mul_div(a, b, q18())
}

/// Apply a Q18 price to a raw input amount, producing a raw output amount:
/// `amount * price * 10^dec_out / (10^18 * 10^dec_in)`.
pub fn apply_price_q18(price: U256, amount: U256, dec_in: u8, dec_out: u8) -> U256 {
    let scale_out = pow10(dec_out);
    let scale_in = pow10(dec_in);
    if scale_out.is_zero() || scale_in.is_zero() {
        return U256::ZERO;
    }
    let num = match amount
        .widening_mul(price)
        .checked_mul(U512::from(scale_out))
    {
        Some(v) => v,
        None => return U256::ZERO,
    };
    let denom = U512::from(q18()) * U512::from(scale_in);
    U256::uint_try_from(num / denom).unwrap_or(U256::ZERO)
}

/// Q18 price of a trade: `amount_out * 10^dec_in * 10^18 /
/// (amount_in * 10^dec_out)`.
pub fn price_q18(amount_in: U256, amount_out: U256, dec_in: u8, dec_out: u8) -> U256 {
    let scale_in = pow10(dec_in);
    let scale_out = pow10(dec_out);
    if amount_in.is_zero() || scale_in.is_zero() || scale_out.is_zero() {
        return U256::ZERO;
    }
    let num = match amount_out
        .widening_mul(scale_in)
        .checked_mul(U512::from(q18()))
    {
        Some(v) => v,
        None => return U256::ZERO,
    };
    let denom = match U512::from(amount_in).checked_mul(U512::from(scale_out)) {
        Some(v) => v,
        None => return U256::ZERO,
    };
    U256::uint_try_from(num / denom).unwrap_or(U256::ZERO)
}
