//! Routing Error Taxonomy
//!
//! Every failure surfaced by the engine maps to a stable string code that
//! API layers and clients key on. Codes never change once published;
//! retry classification is derived from the code, not the message.

use alloy::primitives::Address;
use thiserror::Error;

/// Result type alias for routing operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors produced by the routing engine.
#[derive(Error, Debug)]
pub enum RouterError {
    // ── Caller errors (non-retryable) ────────────────────────────────
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("unsupported token: {0}")]
    UnsupportedToken(Address),

    // ── Routing failures ─────────────────────────────────────────────
    #[error("no route found from {from} to {to}")]
    NoRouteFound { from: Address, to: Address },

    #[error("insufficient liquidity in pool {0}")]
    InsufficientLiquidity(Address),

    #[error("price impact too high: {0} bps")]
    PriceImpactTooHigh(u16),

    // ── Transport failures (retryable) ───────────────────────────────
    #[error("rpc error: {0}")]
    RpcError(String),

    #[error("rpc timeout: {0}")]
    RpcTimeout(String),

    #[error("network error: {0}")]
    NetworkError(String),

    // ── Downstream contract failures ─────────────────────────────────
    #[error("contract error: {0}")]
    ContractError(String),

    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("insufficient allowance")]
    InsufficientAllowance,

    // ── Quote lifecycle (owned by the outer layer, informational here) ─
    #[error("quote not found")]
    QuoteNotFound,

    #[error("quote expired")]
    QuoteExpired,

    #[error("quote mismatch: {0}")]
    QuoteMismatch(String),

    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    // ── Programmer errors ────────────────────────────────────────────
    #[error("missing config: {0}")]
    MissingConfig(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl RouterError {
    /// The stable string code for this error. These strings are part of the
    /// public API contract and must never change.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::InvalidRequest(_) => "invalid_request",
            RouterError::InvalidAddress(_) => "invalid_address",
            RouterError::InvalidAmount(_) => "invalid_amount",
            RouterError::UnsupportedChain(_) => "unsupported_chain",
            RouterError::UnsupportedToken(_) => "unsupported_token",
            RouterError::NoRouteFound { .. } => "no_route_found",
            RouterError::InsufficientLiquidity(_) => "insufficient_liquidity",
            RouterError::PriceImpactTooHigh(_) => "price_impact_too_high",
            RouterError::RpcError(_) => "rpc_error",
            RouterError::RpcTimeout(_) => "rpc_timeout",
            RouterError::NetworkError(_) => "network_error",
            RouterError::ContractError(_) => "contract_error",
            RouterError::ExecutionReverted(_) => "execution_reverted",
            RouterError::InsufficientBalance => "insufficient_balance",
            RouterError::InsufficientAllowance => "insufficient_allowance",
            RouterError::QuoteNotFound => "quote_not_found",
            RouterError::QuoteExpired => "quote_expired",
            RouterError::QuoteMismatch(_) => "quote_mismatch",
            RouterError::SimulationFailed(_) => "simulation_failed",
            RouterError::MissingConfig(_) => "missing_config",
            RouterError::InvalidConfig(_) => "invalid_config",
            RouterError::Internal(_) => "internal_error",
            RouterError::NotImplemented(_) => "not_implemented",
        }
    }

    /// Whether a caller may retry the identical request and reasonably
    /// expect a different outcome. `no_route_found` is retryable because a
    /// block advance can surface new liquidity.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::NoRouteFound { .. }
                | RouterError::RpcError(_)
                | RouterError::RpcTimeout(_)
                | RouterError::NetworkError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            RouterError::NoRouteFound {
                from: Address::ZERO,
                to: Address::ZERO
            }
            .code(),
            "no_route_found"
        );
        assert_eq!(RouterError::RpcTimeout("x".into()).code(), "rpc_timeout");
        assert_eq!(
            RouterError::InvalidAmount("0".into()).code(),
            "invalid_amount"
        );
        assert_eq!(
            RouterError::UnsupportedChain("foo".into()).code(),
            "unsupported_chain"
        );
        assert_eq!(RouterError::NotImplemented("x").code(), "not_implemented");
    }

    #[test]
    fn test_retry_classification() {
        assert!(RouterError::RpcError("boom".into()).is_retryable());
        assert!(RouterError::RpcTimeout("slow".into()).is_retryable());
        assert!(RouterError::NetworkError("dns".into()).is_retryable());
        assert!(RouterError::NoRouteFound {
            from: Address::ZERO,
            to: Address::ZERO
        }
        .is_retryable());

        assert!(!RouterError::InvalidAmount("-1".into()).is_retryable());
        assert!(!RouterError::ContractError("revert".into()).is_retryable());
        assert!(!RouterError::ExecutionReverted("out".into()).is_retryable());
        assert!(!RouterError::MissingConfig("quoter".into()).is_retryable());
    }
}
