// deployer/src/lib.rs

//! Contract deployment and transaction lifecycle
//!
//! This crate provides:
//! - Layered gas price / gas limit resolution (explicit → settings → node)
//! - EVM ruleset compatibility checks against the connected node
//! - Per-account nonce tracking that survives chain resets
//! - Transaction assembly, signing, submission and receipt polling
//! - Mode-dependent revert handling (raise in scripts, receipt in consoles)

pub mod account;
pub mod builder;
pub mod contract;
pub mod evm;
pub mod gas;
pub mod network;
pub mod nonce;
pub mod outcome;
pub mod receipt;
pub mod settings;

pub use account::Account;
pub use builder::{PendingTransaction, ReceiptPolicy, TransactionBuilder, TxOverrides};
pub use contract::{ContractArtifact, DeployedContract};
pub use gas::{GasResolver, GasSource};
pub use network::Network;
pub use nonce::{NonceReservation, NonceTracker};
pub use outcome::{Deployment, ExecutionMode, Outcome, RevertPolicy, VirtualMachineError};
pub use receipt::TransactionReceipt;
pub use settings::{GasSetting, NetworkSettings, RevertingGasLimit, SharedSettings};

pub use chain_client::{ChainClient, EvmVersion, RpcError};

/// Result type for deployment operations
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while deploying or transacting
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Incompatible EVM version: node runs {node}, project targets {target}")]
    IncompatibleEvmVersion { node: EvmVersion, target: EvmVersion },

    #[error(transparent)]
    VirtualMachine(#[from] VirtualMachineError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

impl From<ethers_core::abi::Error> for DeployError {
    fn from(err: ethers_core::abi::Error) -> Self {
        DeployError::Abi(err.to_string())
    }
}

impl From<ethers_signers::WalletError> for DeployError {
    fn from(err: ethers_signers::WalletError) -> Self {
        DeployError::Signing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_errors_pass_through() {
        let err: DeployError = RpcError::rejected("nonce too low").into();
        assert_eq!(err.to_string(), "Node error -32000: nonce too low");
        assert!(matches!(err, DeployError::Rpc(_)));
    }

    #[test]
    fn test_incompatible_version_message() {
        let err = DeployError::IncompatibleEvmVersion {
            node: EvmVersion::Byzantium,
            target: EvmVersion::Istanbul,
        };
        assert_eq!(
            err.to_string(),
            "Incompatible EVM version: node runs byzantium, project targets istanbul"
        );
    }
}
