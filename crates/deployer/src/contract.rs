// deployer/src/contract.rs

use crate::account::Account;
use crate::builder::{PendingTransaction, TxOverrides};
use crate::network::Network;
use crate::outcome;
use crate::receipt::TransactionReceipt;
use crate::{DeployError, DeployResult};
use chain_client::EvmVersion;
use ethers_core::abi::{Abi, Token};
use ethers_core::types::{Address, Bytes, TransactionRequest};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: String,
    abi: Abi,
    bytecode: String,
    #[serde(default)]
    compiler: Option<CompilerInfo>,
}

#[derive(Deserialize)]
struct CompilerInfo {
    #[serde(default)]
    evm_version: Option<EvmVersion>,
}

/// Compiled contract ready for deployment
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: Abi,
    /// Creation code
    pub bytecode: Bytes,
    /// Ruleset the contract was compiled for
    pub evm_version: Option<EvmVersion>,
}

impl ContractArtifact {
    pub fn from_json(json: &str) -> DeployResult<Self> {
        let file: ArtifactFile =
            serde_json::from_str(json).map_err(|e| DeployError::Artifact(e.to_string()))?;
        Self::from_file_contents(file)
    }

    pub fn from_value(value: serde_json::Value) -> DeployResult<Self> {
        let file: ArtifactFile =
            serde_json::from_value(value).map_err(|e| DeployError::Artifact(e.to_string()))?;
        Self::from_file_contents(file)
    }

    /// Load a build artifact (`contractName`, `abi`, `bytecode`, optional
    /// `compiler.evm_version`)
    pub fn from_file(path: impl AsRef<Path>) -> DeployResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DeployError::Artifact(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    fn from_file_contents(file: ArtifactFile) -> DeployResult<Self> {
        let hex_code = file.bytecode.trim();
        let hex_code = hex_code.strip_prefix("0x").unwrap_or(hex_code);
        let bytecode = hex::decode(hex_code).map_err(|e| {
            DeployError::Artifact(format!("{} bytecode is not hex: {}", file.contract_name, e))
        })?;
        if bytecode.is_empty() {
            return Err(DeployError::Artifact(format!(
                "{} has no bytecode (abstract contract or interface?)",
                file.contract_name
            )));
        }

        Ok(Self {
            name: file.contract_name,
            abi: file.abi,
            bytecode: Bytes::from(bytecode),
            evm_version: file.compiler.and_then(|c| c.evm_version),
        })
    }

    /// Creation code followed by the encoded constructor arguments
    pub fn deployment_data(&self, args: &[Token]) -> DeployResult<Bytes> {
        match &self.abi.constructor {
            Some(constructor) => Ok(constructor
                .encode_input(self.bytecode.to_vec(), args)?
                .into()),
            None if args.is_empty() => Ok(self.bytecode.clone()),
            None => Err(DeployError::Abi(format!(
                "{} has no constructor but {} arguments were given",
                self.name,
                args.len()
            ))),
        }
    }
}

/// Contract live on chain, bound to its ABI and network
#[derive(Clone)]
pub struct DeployedContract {
    name: String,
    address: Address,
    abi: Abi,
    tx: TransactionReceipt,
    network: Network,
}

impl fmt::Debug for DeployedContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployedContract")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("tx", &self.tx.tx_hash)
            .finish()
    }
}

impl DeployedContract {
    pub(crate) fn new(
        name: String,
        address: Address,
        abi: Abi,
        tx: TransactionReceipt,
        network: Network,
    ) -> Self {
        Self {
            name,
            address,
            abi,
            tx,
            network,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Deployment receipt
    pub fn tx(&self) -> &TransactionReceipt {
        &self.tx
    }

    /// Calldata for `function(args)`
    pub fn encode_input(&self, function: &str, args: &[Token]) -> DeployResult<Bytes> {
        let function = self.abi.function(function)?;
        Ok(function.encode_input(args)?.into())
    }

    /// Read-only call, decoded with the function's outputs
    pub async fn call(&self, function: &str, args: &[Token]) -> DeployResult<Vec<Token>> {
        let abi_function = self.abi.function(function)?;
        let request = TransactionRequest::new()
            .to(self.address)
            .data(abi_function.encode_input(args)?);
        let output = self.network.client().call(&request).await?;
        Ok(abi_function.decode_output(&output)?)
    }

    /// State-changing call from `account`, with the network's revert policy
    pub async fn transact(
        &self,
        account: &Account,
        function: &str,
        args: &[Token],
        overrides: TxOverrides,
    ) -> DeployResult<TransactionReceipt> {
        let data = self.encode_input(function, args)?;
        let receipt = account
            .execute(PendingTransaction::call(self.address, data), overrides)
            .await?;
        Ok(outcome::resolve(receipt, self.network.mode(), Ok)?.into_receipt())
    }
}
