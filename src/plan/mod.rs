//! Calldata Assembler
//!
//! Serializes a winning quote into one atomic executor call: pulls,
//! scoped approvals, per-hop router calldata with dynamic balance
//! injection offsets, and the flush list. Interior hop inputs are only
//! known at dispatch time (they equal the executor's balance of the
//! hop's input token), so every hop beyond the first carries an
//! `injectToken`/`injectOffset` pair pointing at the `amountIn` word of
//! its calldata.

use crate::amm::fixed_point::mul_div;
use crate::config::{ChainConfig, DexConfig};
use crate::contracts::{
    ISwapExecutor, ISwapRouter, ISwapRouter02, IUniswapV2Router02, IWrappedNative,
};
use crate::error::{Result, RouterError};
use crate::types::{
    ExecutorPlan, InnerCall, PoolSnapshot, PoolVersion, PriceQuote, TokenApproval, TokenPull,
};
use alloy::primitives::{
    aliases::{U160, U24},
    Address, Bytes, U256,
};
use alloy::sol_types::SolCall;

/// `amountIn` word offsets inside each hop calldata layout.
///
/// v2 `swapExactTokensForTokens`: 4-byte selector, `amountIn` is the
/// first argument head.
pub const V2_SWAP_INJECT_OFFSET: u64 = 4;
/// v3 standard `exactInputSingle`: selector + 5 head words (tokenIn,
/// tokenOut, fee, recipient, deadline).
pub const V3_STANDARD_INJECT_OFFSET: u64 = 164;
/// v3 router02 `exactInputSingle`: selector + 4 head words (no
/// deadline).
pub const V3_ROUTER02_INJECT_OFFSET: u64 = 132;
/// Wrapped-native `withdraw(uint256)`: the amount is the only argument.
pub const WITHDRAW_INJECT_OFFSET: u64 = 4;

/// Floor on the per-leg slippage tolerance of split legs, so one leg
/// does not revert the whole trade on a small price move.
const SPLIT_LEG_SLIPPAGE_FLOOR_BPS: u16 = 100;

/// Upper clamp on any slippage value used inside quote construction.
/// The API boundary allows up to 5000 bps, but min-out floors derived
/// from a quote never tolerate more than this.
const QUOTE_SLIPPAGE_CAP_BPS: u16 = 1_000;

/// Inputs to plan assembly. `deadline` is an absolute unix timestamp.
pub struct PlanRequest<'a> {
    pub chain: &'a ChainConfig,
    pub quote: &'a PriceQuote,
    pub amount_out_min: U256,
    pub recipient: Address,
    pub slippage_bps: u16,
    pub deadline: u64,
    pub use_native_input: bool,
    pub use_native_output: bool,
    pub interhop_buffer_bps: u16,
}

/// Build the executor plan for a quote (single route or split).
pub fn build_swap_plan(req: &PlanRequest) -> Result<ExecutorPlan> {
    let quote = req.quote;
    if quote.sources.is_empty() {
        return Err(RouterError::InvalidRequest("quote has no hops".into()));
    }
    let input_token = quote
        .route_addresses
        .first()
        .copied()
        .ok_or_else(|| RouterError::InvalidRequest("quote has no route".into()))?;

    let mut pulls = Vec::new();
    let mut approvals: Vec<TokenApproval> = Vec::new();
    let mut calls = Vec::new();
    let mut flush: Vec<Address> = Vec::new();

    if req.use_native_input {
        // The executor receives native value in the outer call and wraps
        // it up front; no pull is emitted.
        calls.push(InnerCall {
            target: req.chain.wrapped_native,
            value: quote.amount_in,
            data: IWrappedNative::depositCall {}.abi_encode().into(),
            inject_token: Address::ZERO,
            inject_offset: 0,
        });
        push_unique(&mut flush, req.chain.wrapped_native);
    } else {
        pulls.push(TokenPull {
            token: input_token,
            amount: quote.amount_in,
        });
        push_unique(&mut flush, input_token);
    }

    match &quote.splits {
        Some(legs) => {
            let leg_slippage = req
                .slippage_bps
                .max(SPLIT_LEG_SLIPPAGE_FLOOR_BPS)
                .min(QUOTE_SLIPPAGE_CAP_BPS);
            for leg in legs {
                let leg_min_out = mul_div(
                    leg.quote.amount_out,
                    U256::from(10_000u64 - u64::from(leg_slippage)),
                    U256::from(10_000u64),
                );
                append_leg(
                    req,
                    &leg.quote,
                    leg_min_out,
                    &mut approvals,
                    &mut calls,
                    &mut flush,
                )?;
            }
        }
        None => {
            append_leg(
                req,
                quote,
                req.amount_out_min,
                &mut approvals,
                &mut calls,
                &mut flush,
            )?;
        }
    }

    if req.use_native_output {
        // Unwrap whatever wrapped-native balance accumulated; the amount
        // word is injected at dispatch.
        calls.push(InnerCall {
            target: req.chain.wrapped_native,
            value: U256::ZERO,
            data: IWrappedNative::withdrawCall { amount: U256::ZERO }
                .abi_encode()
                .into(),
            inject_token: req.chain.wrapped_native,
            inject_offset: WITHDRAW_INJECT_OFFSET,
        });
        push_unique(&mut flush, req.chain.wrapped_native);
    }

    Ok(ExecutorPlan {
        pulls,
        approvals,
        calls,
        tokens_to_flush: flush,
    })
}

/// Append one leg's hops: approvals, calldata and injection metadata.
fn append_leg(
    req: &PlanRequest,
    leg: &PriceQuote,
    leg_min_out: U256,
    approvals: &mut Vec<TokenApproval>,
    calls: &mut Vec<InnerCall>,
    flush: &mut Vec<Address>,
) -> Result<()> {
    let hops = leg.sources.len();
    let mut rolling = leg.amount_in;

    for (i, source) in leg.sources.iter().enumerate() {
        let dex = req.chain.find_dex(&source.dex_id).ok_or_else(|| {
            RouterError::MissingConfig(format!("dex {} not configured", source.dex_id))
        })?;
        let hop_in_token = leg.route_addresses[i];
        let hop_out_token = leg.route_addresses[i + 1];
        let is_last = i + 1 == hops;

        // Build-time amount: capped by what actually rolled in, then
        // haircut on interior hops against upstream rounding. The
        // executor replaces it with the live balance at dispatch.
        let mut hop_in = source.amount_in.min(rolling);
        if i > 0 {
            hop_in -= mul_div(
                hop_in,
                U256::from(req.interhop_buffer_bps),
                U256::from(10_000u64),
            );
        }
        let scaled_expected_out = mul_div(source.amount_out, hop_in, source.amount_in);

        let hop_min_out = if is_last {
            leg_min_out
        } else {
            // Interior hops take a proportional share of the leg floor.
            mul_div(scaled_expected_out, leg_min_out, leg.amount_out)
        };

        let hop_recipient = if is_last && !req.use_native_output {
            req.recipient
        } else {
            req.chain.executor
        };

        let approval_amount = if i == 0 { hop_in } else { U256::MAX };
        merge_approval(
            approvals,
            TokenApproval {
                token: hop_in_token,
                spender: dex.router,
                amount: approval_amount,
                revoke_after: true,
            },
        );

        let (data, inject_offset) = encode_hop(
            dex,
            &source.snapshot,
            hop_in_token,
            hop_out_token,
            hop_in,
            hop_min_out,
            hop_recipient,
            req.deadline,
        );
        let (inject_token, inject_offset) = if i == 0 {
            (Address::ZERO, 0)
        } else {
            (hop_in_token, inject_offset)
        };
        calls.push(InnerCall {
            target: dex.router,
            value: U256::ZERO,
            data,
            inject_token,
            inject_offset,
        });

        push_unique(flush, hop_in_token);
        if hop_recipient == req.chain.executor {
            push_unique(flush, hop_out_token);
        }
        rolling = scaled_expected_out;
    }
    Ok(())
}

/// Encode one hop's router calldata and report where its `amountIn`
/// word sits.
#[allow(clippy::too_many_arguments)]
fn encode_hop(
    dex: &DexConfig,
    snapshot: &PoolSnapshot,
    token_in: Address,
    token_out: Address,
    amount_in: U256,
    amount_out_min: U256,
    recipient: Address,
    deadline: u64,
) -> (Bytes, u64) {
    match snapshot.version() {
        PoolVersion::V2 => {
            let data = IUniswapV2Router02::swapExactTokensForTokensCall {
                amountIn: amount_in,
                amountOutMin: amount_out_min,
                path: vec![token_in, token_out],
                to: recipient,
                deadline: U256::from(deadline),
            }
            .abi_encode();
            (data.into(), V2_SWAP_INJECT_OFFSET)
        }
        PoolVersion::V3 => {
            let fee = match snapshot {
                PoolSnapshot::V3 { fee, .. } => *fee,
                PoolSnapshot::V2 { .. } => 0,
            };
            if dex.use_router02 {
                let data = ISwapRouter02::exactInputSingleCall {
                    params: ISwapRouter02::ExactInputSingleParams {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        fee: U24::from(fee),
                        recipient,
                        amountIn: amount_in,
                        amountOutMinimum: amount_out_min,
                        sqrtPriceLimitX96: U160::ZERO,
                    },
                }
                .abi_encode();
                (data.into(), V3_ROUTER02_INJECT_OFFSET)
            } else {
                let data = ISwapRouter::exactInputSingleCall {
                    params: ISwapRouter::ExactInputSingleParams {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        fee: U24::from(fee),
                        recipient,
                        deadline: U256::from(deadline),
                        amountIn: amount_in,
                        amountOutMinimum: amount_out_min,
                        sqrtPriceLimitX96: U160::ZERO,
                    },
                }
                .abi_encode();
                (data.into(), V3_STANDARD_INJECT_OFFSET)
            }
        }
    }
}

/// Merge an approval into the set by `(token, spender)`, summing amounts
/// and saturating at `U256::MAX`.
fn merge_approval(approvals: &mut Vec<TokenApproval>, next: TokenApproval) {
    if let Some(existing) = approvals
        .iter_mut()
        .find(|a| a.token == next.token && a.spender == next.spender)
    {
        existing.amount = existing.amount.saturating_add(next.amount);
        existing.revoke_after = existing.revoke_after || next.revoke_after;
    } else {
        approvals.push(next);
    }
}

fn push_unique(list: &mut Vec<Address>, address: Address) {
    if !list.contains(&address) {
        list.push(address);
    }
}

/// ABI-encode the plan as the executor's `execute` calldata.
pub fn encode_execute(plan: &ExecutorPlan) -> Bytes {
    ISwapExecutor::executeCall {
        pulls: plan
            .pulls
            .iter()
            .map(|p| ISwapExecutor::Pull {
                token: p.token,
                amount: p.amount,
            })
            .collect(),
        approvals: plan
            .approvals
            .iter()
            .map(|a| ISwapExecutor::Approval {
                token: a.token,
                spender: a.spender,
                amount: a.amount,
                revokeAfter: a.revoke_after,
            })
            .collect(),
        calls: plan
            .calls
            .iter()
            .map(|c| ISwapExecutor::Call {
                target: c.target,
                value: c.value,
                data: c.data.clone(),
                injectToken: c.inject_token,
                injectOffset: c.inject_offset,
            })
            .collect(),
        tokensToFlush: plan.tokens_to_flush.clone(),
    }
    .abi_encode()
    .into()
}
