//! JSON-RPC client for the chain-data provider
//!
//! Only the two calls the core needs: `eth_getLogs` over an inclusive block
//! range and `eth_blockNumber`. No retries here; backoff and range-shrinking
//! are deliberately the caller's policy.

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, VoucherError};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// A raw log record as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<B256>,
}

#[derive(Clone)]
pub struct RpcClient {
    endpoint: String,
    client: reqwest::Client,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?,
        })
    }

    async fn call<T>(&self, method: &str, params: serde_json::Value) -> Result<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let rpc_response: RpcResponse<T> = response.json().await?;

        if let Some(err) = rpc_response.error {
            return Err(VoucherError::Rpc(format!("{} (code {})", err.message, err.code)));
        }

        rpc_response
            .result
            .ok_or_else(|| VoucherError::Rpc(format!("{method} returned no result")))
    }

    /// Current chain tip height.
    pub async fn block_number(&self) -> Result<u64> {
        let tip: U64 = self.call("eth_blockNumber", serde_json::json!([])).await?;
        Ok(tip.to::<u64>())
    }

    /// Logs emitted by `address` over the inclusive block range.
    ///
    /// Providers cap the range they will serve; a rejection for that reason
    /// surfaces as `RangeTooLarge` so the caller can shrink and re-query.
    pub async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        let params = serde_json::json!([{
            "address": format!("0x{}", hex::encode(address)),
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
        }]);

        self.call("eth_getLogs", params)
            .await
            .map_err(|e| match e {
                VoucherError::Rpc(message) if is_range_rejection(&message) => {
                    VoucherError::RangeTooLarge {
                        from_block,
                        to_block,
                        message,
                    }
                }
                other => other,
            })
    }
}

/// Provider wording for "you asked for too many blocks" varies; match the
/// phrasings seen in the wild plus the quasi-standard -32005 code.
fn is_range_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("code -32005")
        || lower.contains("block range")
        || lower.contains("range is too")
        || lower.contains("too many")
        || lower.contains("limit exceeded")
}
