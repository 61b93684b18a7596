// deployer/src/account.rs

use crate::builder::{PendingTransaction, TxOverrides};
use crate::contract::{ContractArtifact, DeployedContract};
use crate::network::Network;
use crate::outcome::{self, Deployment};
use crate::receipt::TransactionReceipt;
use crate::{DeployError, DeployResult};
use ethers_core::abi::Token;
use ethers_core::types::{Address, H256, U256};
use ethers_signers::{LocalWallet, Signer};
use std::fmt;

/// A local signing key bound to a network
#[derive(Clone)]
pub struct Account {
    address: Address,
    wallet: LocalWallet,
    network: Network,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("network", &self.network.name())
            .finish()
    }
}

impl Account {
    pub(crate) fn new(secret: H256, network: Network) -> DeployResult<Self> {
        let wallet = LocalWallet::from_bytes(secret.as_bytes())?.with_chain_id(network.chain_id());
        Ok(Self {
            address: wallet.address(),
            wallet,
            network,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Nonce the next transaction from this account will use
    pub async fn nonce(&self) -> DeployResult<u64> {
        Ok(self.network.nonces().current(self.address).await?)
    }

    pub async fn balance(&self) -> DeployResult<U256> {
        Ok(self.network.client().balance(self.address).await?)
    }

    /// Deploy `artifact` with constructor `args`.
    ///
    /// A reverted deployment raises [`crate::VirtualMachineError`] in script
    /// mode and comes back as [`crate::Outcome::Reverted`] in interactive
    /// mode.
    pub async fn deploy(
        &self,
        artifact: &ContractArtifact,
        args: &[Token],
        overrides: TxOverrides,
    ) -> DeployResult<Deployment> {
        let data = artifact.deployment_data(args)?;
        let target = artifact
            .evm_version
            .unwrap_or_else(|| self.network.target_evm_version());
        tracing::info!("Deploying {} from {:?}", artifact.name, self.address);

        let receipt = self
            .network
            .builder()
            .execute(&self.wallet, PendingTransaction::deployment(data), overrides, target)
            .await?;

        outcome::resolve(receipt, self.network.mode(), |receipt| {
            let address = receipt.contract_address.ok_or_else(|| {
                DeployError::Artifact(format!(
                    "{} deployment succeeded without a contract address",
                    artifact.name
                ))
            })?;
            tracing::info!("{} deployed at {:?}", artifact.name, address);
            Ok(DeployedContract::new(
                artifact.name.clone(),
                address,
                artifact.abi.clone(),
                receipt,
                self.network.clone(),
            ))
        })
    }

    /// Send `value` wei to `to`
    pub async fn transfer(
        &self,
        to: Address,
        value: U256,
        overrides: TxOverrides,
    ) -> DeployResult<TransactionReceipt> {
        let receipt = self
            .execute(PendingTransaction::transfer(to, value), overrides)
            .await?;
        Ok(outcome::resolve(receipt, self.network.mode(), Ok)?.into_receipt())
    }

    /// Sign and send `pending`, returning the mined receipt whatever its status
    pub async fn execute(
        &self,
        pending: PendingTransaction,
        overrides: TxOverrides,
    ) -> DeployResult<TransactionReceipt> {
        self.network
            .builder()
            .execute(
                &self.wallet,
                pending,
                overrides,
                self.network.target_evm_version(),
            )
            .await
    }
}
