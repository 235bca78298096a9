//! Ethereum JSON-RPC access: the HTTP transport used for `eth_call`,
//! `eth_getBlockByHash` and `eth_getTransactionReceipt`, plus the manual
//! ABI decode helpers in [`abi`] and the WebSocket subscription transport
//! in [`ws`].

pub mod abi;
pub mod ws;

use std::sync::RwLock;

use ethers::types::Address;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("node returned a JSON-RPC error for {method}: {message}")]
    RpcError { method: &'static str, message: String },
    #[error("unexpected response shape decoding {0}")]
    UnexpectedAbiShape(&'static str),
    #[error("malformed JSON-RPC response for {0}")]
    MalformedResponse(&'static str),
    #[error("ABI decode error: {0}")]
    Abi(#[from] ethers::abi::Error),
}

/// A block header, only the field the processor needs.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BlockHeader {
    pub timestamp: String,
}

/// A transaction receipt, only the fields the processor needs.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub gas_used: String,
    pub effective_gas_price: String,
}

/// A thin JSON-RPC-over-HTTP client. Each call builds its own envelope and
/// does not retry internally; retry/backoff policy lives in the caller,
/// since the right response to "block not found" differs from the right
/// response to "receipt not found". The underlying `reqwest::Client` sits
/// behind a lock so [`Self::reset_session`] can be called from a shared
/// reference — the processor resets it in place on a transport error
/// rather than owning a fresh `RpcClient`.
#[derive(Debug)]
pub struct RpcClient {
    http: RwLock<reqwest::Client>,
    rpc_uri: Url,
}

impl RpcClient {
    pub fn new(rpc_uri: Url) -> Self {
        Self {
            http: RwLock::new(reqwest::Client::new()),
            rpc_uri,
        }
    }

    /// Swaps in a fresh `reqwest::Client`, as part of the caller's
    /// reset-the-session failure policy for transport-level errors.
    pub fn reset_session(&self) {
        *self.http.write().unwrap() = reqwest::Client::new();
    }

    #[instrument(level = "debug", skip(self, params))]
    async fn call(&self, method: &'static str, params: Value) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let http = self.http.read().unwrap().clone();
        let response = http
            .post(self.rpc_uri.clone())
            .json(&body)
            .send()
            .await
            .map_err(|source| ChainError::Transport { method, source })?;

        let payload: Value = response
            .json()
            .await
            .map_err(|source| ChainError::Transport { method, source })?;

        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            warn!(method, message, "node returned a JSON-RPC error");
            return Err(ChainError::RpcError { method, message });
        }

        Ok(payload
            .get("result")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// `eth_call({to, data}, "latest")`.
    pub async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let data_hex = format!("0x{}", hex::encode(data));
        let params = json!([
            { "to": format!("{to:?}"), "data": data_hex },
            "latest",
        ]);
        let result = self.call("eth_call", params).await?;
        let hex_str = result
            .as_str()
            .ok_or(ChainError::MalformedResponse("eth_call"))?;
        hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|_| ChainError::MalformedResponse("eth_call"))
    }

    /// `eth_getBlockByHash(hash, false)`. `None` on `result == null`.
    pub async fn eth_get_block_by_hash(
        &self,
        block_hash: &str,
    ) -> Result<Option<BlockHeader>, ChainError> {
        let params = json!([block_hash, false]);
        let result = self.call("eth_getBlockByHash", params).await?;
        deserialize_or_null(result, "eth_getBlockByHash")
    }

    /// `eth_getTransactionReceipt(hash)`. `None` on `result == null`.
    pub async fn eth_get_transaction_receipt(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let params = json!([transaction_hash]);
        let result = self.call("eth_getTransactionReceipt", params).await?;
        deserialize_or_null(result, "eth_getTransactionReceipt")
    }
}

fn deserialize_or_null<T: DeserializeOwned>(
    value: Value,
    context: &'static str,
) -> Result<Option<T>, ChainError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|_| ChainError::MalformedResponse(context))
}
