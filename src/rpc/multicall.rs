//! Aggregate-call client: packs many read-only contract calls into one
//! `aggregate((address,bytes)[])` round-trip and decodes per-call returns.
//!
//! A single RPC failure fails the whole batch; retry policy belongs to the
//! caller. Chain gas limits cap how many calls fit in one aggregate, so the
//! typed helpers also come in a chunked flavor (adapters use 80-200 per
//! chunk depending on call weight).

use alloy_primitives::Address;
use alloy_sol_types::{sol, SolCall};
use anyhow::{Context, Result};

use super::client::RpcClient;

sol! {
    /// Multicall2-compatible aggregator surface.
    interface IMulticall {
        struct Call {
            address target;
            bytes callData;
        }

        function aggregate(Call[] memory calls) public returns (uint256 blockNumber, bytes[] memory returnData);
    }
}

/// One logical call: target plus pre-encoded input bytes.
#[derive(Debug, Clone)]
pub struct Call {
    pub target: Address,
    pub calldata: Vec<u8>,
}

/// Decoded aggregate outcome, per-call bytes in request order.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub block_number: u64,
    pub return_data: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Multicall {
    rpc: RpcClient,
    address: Address,
}

impl Multicall {
    pub fn new(rpc: RpcClient, address: Address) -> Self {
        Self { rpc, address }
    }

    /// Execute every call in one aggregate round-trip.
    ///
    /// Empty input returns an empty outcome without touching the network.
    pub async fn aggregate(&self, calls: &[Call]) -> Result<AggregateOutcome> {
        if calls.is_empty() {
            return Ok(AggregateOutcome {
                block_number: 0,
                return_data: Vec::new(),
            });
        }

        let wrapped: Vec<IMulticall::Call> = calls
            .iter()
            .map(|c| IMulticall::Call {
                target: c.target,
                callData: c.calldata.clone().into(),
            })
            .collect();

        let calldata = IMulticall::aggregateCall { calls: wrapped }.abi_encode();
        let raw = self
            .rpc
            .eth_call(self.address, &calldata)
            .await
            .context("aggregate call failed")?;

        let decoded = IMulticall::aggregateCall::abi_decode_returns(&raw)
            .context("failed to decode aggregate return")?;

        anyhow::ensure!(
            decoded.returnData.len() == calls.len(),
            "aggregate returned {} results for {} calls",
            decoded.returnData.len(),
            calls.len()
        );

        Ok(AggregateOutcome {
            block_number: u64::try_from(decoded.blockNumber).unwrap_or(u64::MAX),
            return_data: decoded.returnData.into_iter().map(|b| b.to_vec()).collect(),
        })
    }

    /// Homogeneous typed batch against one target: encode, aggregate, decode.
    pub async fn call_batch<C: SolCall>(
        &self,
        target: Address,
        calls: &[C],
    ) -> Result<Vec<C::Return>> {
        let wrapped: Vec<Call> = calls
            .iter()
            .map(|c| Call {
                target,
                calldata: c.abi_encode(),
            })
            .collect();

        let outcome = self.aggregate(&wrapped).await?;
        outcome
            .return_data
            .iter()
            .map(|raw| C::abi_decode_returns(raw).context("failed to decode batched return"))
            .collect()
    }

    /// Same as [`call_batch`](Self::call_batch) but split into chunks of
    /// `chunk_size` aggregates, outputs concatenated in order.
    pub async fn call_batch_chunked<C: SolCall>(
        &self,
        target: Address,
        calls: &[C],
        chunk_size: usize,
    ) -> Result<Vec<C::Return>> {
        let mut outputs = Vec::with_capacity(calls.len());
        for chunk in calls.chunks(chunk_size.max(1)) {
            outputs.extend(self.call_batch(target, chunk).await?);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use alloy_sol_types::SolValue;

    #[test]
    fn aggregate_calldata_round_trips() {
        let call = IMulticall::aggregateCall {
            calls: vec![IMulticall::Call {
                target: Address::ZERO,
                callData: vec![0xab, 0xcd].into(),
            }],
        };
        let encoded = call.abi_encode();
        // 4-byte selector then ABI body.
        assert_eq!(&encoded[..4], &IMulticall::aggregateCall::SELECTOR);
        let decoded = IMulticall::aggregateCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded.calls.len(), 1);
        assert_eq!(decoded.calls[0].callData.as_ref(), &[0xab, 0xcd]);
    }

    #[test]
    fn aggregate_return_shape_decodes() {
        // (blockNumber, returnData[]) encoded the way the contract would.
        let encoded = (U256::from(123u64), vec![vec![0u8; 32], vec![1u8; 32]]).abi_encode_params();
        let decoded = IMulticall::aggregateCall::abi_decode_returns(&encoded).unwrap();
        assert_eq!(decoded.blockNumber, U256::from(123u64));
        assert_eq!(decoded.returnData.len(), 2);
    }
}
