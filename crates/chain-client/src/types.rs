// chain-client/src/types.rs
use ethers_core::types::{Address, Bytes, H256, U256, U64};
use serde::{Deserialize, Serialize};

use crate::{RpcError, RpcResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: serde_json::Value,
}

impl RpcRequest {
    pub fn new(method: &str, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: serde_json::json!(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorResponse>,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Unwrap the envelope into the typed result or the node's error
    pub fn into_result<T: serde::de::DeserializeOwned>(self) -> RpcResult<T> {
        if let Some(error) = self.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
        let value = self.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

/// Event log attached to a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

/// Receipt as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_number: Option<U64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    pub gas_used: U256,
    /// Absent on pre-Byzantium nodes
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_counter: Option<U64>,
}

impl NodeReceipt {
    /// Status code, `None` when the node predates Byzantium receipts
    pub fn status_code(&self) -> Option<u64> {
        self.status.map(|s| s.as_u64())
    }

    /// Only an explicit status 1 counts as success
    pub fn succeeded(&self) -> bool {
        self.status_code() == Some(1)
    }
}
