//! Multicall3 Batching
//!
//! Encodes a list of sub-calls into a single Multicall3 `aggregate3`
//! payload and decodes the per-call results. All batched reads in the
//! engine (factory lookups, reserve/slot0 reads, token metadata, quoter
//! calls) go through this one round-trip primitive.

use crate::contracts::IMulticall3;
use crate::error::{Result, RouterError};
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::{SolCall, SolValue};

/// One sub-call inside an aggregate3 batch.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub target: Address,
    pub calldata: Bytes,
    /// When true the batch succeeds even if this sub-call reverts; the
    /// failure is reported in the matching [`CallOutcome`].
    pub allow_failure: bool,
}

impl CallRequest {
    pub fn allowing_failure(target: Address, calldata: Vec<u8>) -> Self {
        Self {
            target,
            calldata: calldata.into(),
            allow_failure: true,
        }
    }
}

/// Result of one sub-call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub success: bool,
    pub data: Bytes,
}

impl CallOutcome {
    /// Return data only when the sub-call succeeded and produced output.
    pub fn ok_data(&self) -> Option<&[u8]> {
        if self.success && !self.data.is_empty() {
            Some(self.data.as_ref())
        } else {
            None
        }
    }
}

/// Error(string) selector — a structured revert with a reason
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Panic(uint256) selector — arithmetic overflow, bad array access, ...
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Decode a revert payload into a printable reason, when it follows one
/// of the two standard revert encodings.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() > 4 && data[..4] == ERROR_STRING_SELECTOR {
        if let Ok(reason) = String::abi_decode(&data[4..]) {
            return Some(reason);
        }
    }
    if data.len() > 4 && data[..4] == PANIC_SELECTOR {
        if let Ok(code) = alloy::primitives::U256::abi_decode(&data[4..]) {
            return Some(format!("panic 0x{code:x}"));
        }
    }
    None
}

/// Build the `aggregate3` calldata for a batch.
pub fn encode_aggregate3(calls: &[CallRequest]) -> Bytes {
    let wrapped: Vec<IMulticall3::Call3> = calls
        .iter()
        .map(|c| IMulticall3::Call3 {
            target: c.target,
            allowFailure: c.allow_failure,
            callData: c.calldata.clone(),
        })
        .collect();
    IMulticall3::aggregate3Call { calls: wrapped }
        .abi_encode()
        .into()
}

/// Decode an `aggregate3` response into per-call outcomes.
pub fn decode_aggregate3(data: &[u8]) -> Result<Vec<CallOutcome>> {
    let returned = IMulticall3::aggregate3Call::abi_decode_returns(data)
        .map_err(|e| RouterError::RpcError(format!("aggregate3 decode failed: {e}")))?;
    Ok(returned
        .into_iter()
        .map(|r| CallOutcome {
            success: r.success,
            data: r.returnData,
        })
        .collect())
}
