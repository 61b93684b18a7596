// chain-client/src/lib.rs

//! Chain access boundary for the deployment layer
//!
//! This crate provides:
//! - The `ChainClient` trait every node backend implements
//! - JSON-RPC wire types (receipts, logs, request/response envelopes)
//! - EVM ruleset detection (`EvmVersion`)
//! - Reset signalling for resettable test chains
//! - A thin HTTP JSON-RPC backend

pub mod client;
pub mod evm;
pub mod http;
pub mod signal;
pub mod types;

pub use client::ChainClient;
pub use evm::EvmVersion;
pub use http::HttpChainClient;
pub use signal::{ResetNotifier, ResetSignal};
pub use types::*;

/// Result type for chain access
pub type RpcResult<T> = Result<T, RpcError>;

/// Transport and node failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported by this node: {0}")]
    Unsupported(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl RpcError {
    /// Node-side rejection with the generic server error code
    pub fn rejected(message: impl Into<String>) -> Self {
        RpcError::Node {
            code: -32000,
            message: message.into(),
        }
    }

    /// Whether the node refused because execution itself failed
    /// (revert, invalid opcode, out of gas) rather than the request
    pub fn is_execution_failure(&self) -> bool {
        match self {
            RpcError::Node { code, message } => {
                *code == 3
                    || message.contains("execution reverted")
                    || message.contains("VM Exception")
            }
            _ => false,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            RpcError::Transport(_) => -32603,
            RpcError::Node { code, .. } => *code,
            RpcError::InvalidParams(_) => -32602,
            RpcError::Decode(_) => -32700,
            RpcError::Unsupported(_) => -32601,
            RpcError::Timeout(_) => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::rejected("nonce too low").code(), -32000);
        assert_eq!(RpcError::Unsupported("evm_revert".into()).code(), -32601);
        assert_eq!(
            RpcError::Node { code: 3, message: "execution reverted".into() }.code(),
            3
        );
    }

    #[test]
    fn test_execution_failure_detection() {
        assert!(RpcError::Node { code: 3, message: "execution reverted".into() }
            .is_execution_failure());
        assert!(RpcError::rejected("VM Exception while processing transaction: revert")
            .is_execution_failure());
        assert!(!RpcError::rejected("nonce too low").is_execution_failure());
        assert!(!RpcError::Transport("connection refused".into()).is_execution_failure());
    }

    #[test]
    fn test_error_display() {
        let err = RpcError::rejected("insufficient funds");
        assert_eq!(err.to_string(), "Node error -32000: insufficient funds");
    }
}
