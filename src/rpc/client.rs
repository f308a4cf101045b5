//! Thin JSON-RPC client for read-only contract calls.

use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<serde_json::Value>,
}

/// HTTP JSON-RPC channel. One instance per process; cheap to clone.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    rpc_url: String,
}

impl RpcClient {
    pub fn new(rpc_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, rpc_url })
    }

    /// `eth_call` against `to` with raw calldata; returns the raw return bytes.
    pub async fn eth_call(&self, to: Address, calldata: &[u8]) -> Result<Vec<u8>> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{
                "to": format!("{to}"),
                "data": format!("0x{}", hex::encode(calldata)),
            }, "latest"],
            "id": 1
        });

        let response: JsonRpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .context("RPC request failed")?
            .json()
            .await
            .context("failed to parse RPC response")?;

        if let Some(err) = response.error {
            return Err(anyhow::anyhow!("RPC error: {err:?}"));
        }

        let result = response
            .result
            .context("no result in RPC response")?;

        hex::decode(result.trim_start_matches("0x")).context("failed to decode hex response")
    }
}
