// devchain/src/lib.rs

//! In-process development chain
//!
//! This crate provides a local chain for deployment tests:
//! - Deterministic funded accounts
//! - Signed transaction validation (chain id, nonce, intrinsic gas, funds)
//! - Execution on revm under the configured hardfork
//! - Automine or manual block production
//! - Snapshot, revert and reset with rollback notification

pub mod chain;
pub mod evm;
pub mod fixtures;
pub mod state;

pub use chain::{DevAccount, LocalChain, LocalChainConfig};
pub use evm::{decode_revert_reason, Executor};
pub use state::ChainState;

use chain_client::RpcError;
use ethers_core::types::U256;

/// Result type for development chain operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors raised by the development chain
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("insufficient funds for gas * price + value: required {required}, available {available}")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("nonce too low: expected {expected}, got {got}")]
    NonceTooLow { expected: u64, got: u64 },

    #[error("nonce too high: expected {expected}, got {got}")]
    NonceTooHigh { expected: u64, got: u64 },

    #[error("invalid chain id: expected {expected}, got {got}")]
    ChainIdMismatch { expected: u64, got: u64 },

    #[error("intrinsic gas too low: gas limit {limit}")]
    IntrinsicGas { limit: u64 },

    #[error("exceeds block gas limit: {limit} > {block_limit}")]
    ExceedsBlockGasLimit { limit: U256, block_limit: u64 },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("VM Exception while processing transaction: {0}")]
    Execution(String),

    #[error("unknown snapshot {0}")]
    UnknownSnapshot(u64),

    #[error("state error: {0}")]
    State(String),
}

impl From<ChainError> for RpcError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Execution(_) => RpcError::Node {
                code: 3,
                message: err.to_string(),
            },
            ChainError::UnknownSnapshot(_) | ChainError::InvalidTransaction(_) => {
                RpcError::InvalidParams(err.to_string())
            }
            other => RpcError::rejected(other.to_string()),
        }
    }
}
