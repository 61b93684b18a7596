// deployer/src/outcome.rs

use crate::contract::DeployedContract;
use crate::receipt::TransactionReceipt;
use crate::DeployResult;
use ethers_core::types::{H256, U256};
use serde::{Deserialize, Serialize};

/// How the caller is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Scripts and tests
    #[default]
    Script,
    /// Interactive console
    Interactive,
}

/// What to do with a reverted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertPolicy {
    Raise,
    ReturnReceipt,
}

impl ExecutionMode {
    pub const fn revert_policy(self) -> RevertPolicy {
        match self {
            ExecutionMode::Script => RevertPolicy::Raise,
            ExecutionMode::Interactive => RevertPolicy::ReturnReceipt,
        }
    }
}

/// A transaction mined with status 0
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "VM Exception while processing transaction {tx_hash:?}: {}",
    .revert_reason.as_deref().unwrap_or("revert")
)]
pub struct VirtualMachineError {
    pub tx_hash: H256,
    pub revert_reason: Option<String>,
    pub program_counter: Option<u64>,
    pub gas_used: U256,
    /// Receipt of the reverted transaction
    pub receipt: Box<TransactionReceipt>,
}

impl From<TransactionReceipt> for VirtualMachineError {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            revert_reason: receipt.revert_reason.clone(),
            program_counter: receipt.program_counter,
            gas_used: receipt.gas_used,
            receipt: Box::new(receipt),
        }
    }
}

/// Successful result, or a reverted receipt returned for inspection
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Completed(T),
    Reverted(TransactionReceipt),
}

/// Result of a deployment
pub type Deployment = Outcome<DeployedContract>;

impl<T> Outcome<T> {
    pub fn is_reverted(&self) -> bool {
        matches!(self, Outcome::Reverted(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Reverted(_) => None,
        }
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Reverted(_) => None,
        }
    }

    pub fn reverted(&self) -> Option<&TransactionReceipt> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Reverted(receipt) => Some(receipt),
        }
    }
}

impl Outcome<TransactionReceipt> {
    pub fn into_receipt(self) -> TransactionReceipt {
        match self {
            Outcome::Completed(receipt) | Outcome::Reverted(receipt) => receipt,
        }
    }
}

impl Deployment {
    pub fn contract(&self) -> Option<&DeployedContract> {
        self.completed()
    }

    /// Deployment receipt, whichever way it went
    pub fn receipt(&self) -> &TransactionReceipt {
        match self {
            Outcome::Completed(contract) => contract.tx(),
            Outcome::Reverted(receipt) => receipt,
        }
    }
}

/// Decide what a mined transaction turns into.
///
/// Status 1 always goes through `on_success`. Status 0 raises
/// [`VirtualMachineError`] or comes back as [`Outcome::Reverted`],
/// according to `mode`'s revert policy.
pub fn resolve<T>(
    receipt: TransactionReceipt,
    mode: ExecutionMode,
    on_success: impl FnOnce(TransactionReceipt) -> DeployResult<T>,
) -> DeployResult<Outcome<T>> {
    if receipt.is_success() {
        return on_success(receipt).map(Outcome::Completed);
    }

    tracing::info!(
        "Transaction {:?} reverted: {}",
        receipt.tx_hash,
        receipt.revert_reason.as_deref().unwrap_or("no reason given")
    );
    match mode.revert_policy() {
        RevertPolicy::Raise => Err(VirtualMachineError::from(receipt).into()),
        RevertPolicy::ReturnReceipt => Ok(Outcome::Reverted(receipt)),
    }
}
