// deployer/src/network.rs

use crate::account::Account;
use crate::builder::{ReceiptPolicy, TransactionBuilder};
use crate::gas::GasResolver;
use crate::nonce::NonceTracker;
use crate::outcome::ExecutionMode;
use crate::settings::SharedSettings;
use crate::DeployResult;
use chain_client::{ChainClient, EvmVersion};
use ethers_core::types::H256;
use std::fmt;
use std::sync::Arc;

/// A connected chain and everything shared by its accounts
#[derive(Clone)]
pub struct Network {
    name: String,
    client: Arc<dyn ChainClient>,
    settings: SharedSettings,
    nonces: Arc<NonceTracker>,
    mode: ExecutionMode,
    target: EvmVersion,
    receipts: ReceiptPolicy,
    chain_id: u64,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("chain_id", &self.chain_id)
            .field("mode", &self.mode)
            .field("target", &self.target)
            .finish()
    }
}

impl Network {
    /// Connect to `client`, learning its chain id
    pub async fn connect(
        name: impl Into<String>,
        client: Arc<dyn ChainClient>,
        settings: SharedSettings,
    ) -> DeployResult<Self> {
        let name = name.into();
        let chain_id = client.chain_id().await?;
        tracing::info!("Connected to network '{}' (chain id {})", name, chain_id);

        Ok(Self {
            name,
            nonces: Arc::new(NonceTracker::new(client.clone())),
            client,
            settings,
            mode: ExecutionMode::default(),
            target: EvmVersion::Istanbul,
            receipts: ReceiptPolicy::default(),
            chain_id,
        })
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Ruleset contracts are compiled for unless their artifact says otherwise
    pub fn with_target_evm_version(mut self, target: EvmVersion) -> Self {
        self.target = target;
        self
    }

    pub fn with_receipt_policy(mut self, receipts: ReceiptPolicy) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn target_evm_version(&self) -> EvmVersion {
        self.target
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn nonces(&self) -> &Arc<NonceTracker> {
        &self.nonces
    }

    pub fn gas(&self) -> GasResolver {
        GasResolver::new(self.client.clone(), self.settings.clone())
    }

    pub fn builder(&self) -> TransactionBuilder {
        TransactionBuilder::new(
            self.client.clone(),
            self.gas(),
            self.nonces.clone(),
            self.receipts,
            self.chain_id,
        )
    }

    /// Account signing with the secp256k1 key `secret`
    pub fn account(&self, secret: H256) -> DeployResult<Account> {
        Account::new(secret, self.clone())
    }

    /// Roll the chain back to its initial state
    pub async fn reset(&self) -> DeployResult<()> {
        self.client.reset().await?;
        tracing::info!("Network '{}' reset", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::NetworkSettings;
    use crate::GasSetting;
    use async_trait::async_trait;
    use chain_client::{NodeReceipt, RpcError, RpcResult};
    use devchain::{LocalChain, LocalChainConfig};
    use ethers_core::types::{Address, Bytes, TransactionRequest, U256};

    #[tokio::test]
    async fn test_connect_learns_chain_id() {
        let chain = Arc::new(LocalChain::new(LocalChainConfig {
            chain_id: 31337,
            ..Default::default()
        }));
        let network = Network::connect("development", chain, SharedSettings::default())
            .await
            .unwrap()
            .with_mode(ExecutionMode::Interactive)
            .with_target_evm_version(EvmVersion::Byzantium);

        assert_eq!(network.chain_id(), 31337);
        assert_eq!(network.name(), "development");
        assert_eq!(network.mode(), ExecutionMode::Interactive);
        assert_eq!(network.target_evm_version(), EvmVersion::Byzantium);
    }

    #[tokio::test]
    async fn test_settings_are_shared_by_clones() {
        let chain = Arc::new(LocalChain::default());
        let network = Network::connect(
            "development",
            chain,
            SharedSettings::new(NetworkSettings::default()),
        )
        .await
        .unwrap();
        let other = network.clone();

        other.settings().set_gas_price(GasSetting::fixed(50u64)).await;
        assert_eq!(network.gas().gas_price(None).await.unwrap(), U256::from(50));
    }

    #[tokio::test]
    async fn test_reset_reaches_the_chain() {
        let chain = Arc::new(LocalChain::default());
        let network = Network::connect("development", chain.clone(), SharedSettings::default())
            .await
            .unwrap();

        let account = network.account(chain.accounts()[0].secret).unwrap();
        account
            .transfer(Address::repeat_byte(7), U256::from(1), Default::default())
            .await
            .unwrap();
        assert_eq!(chain.block_number().await, 1);
        assert_eq!(account.nonce().await.unwrap(), 1);

        network.reset().await.unwrap();
        assert_eq!(chain.block_number().await, 0);
        assert_eq!(account.nonce().await.unwrap(), 0);
    }

    struct PlainNode;

    #[async_trait]
    impl ChainClient for PlainNode {
        async fn chain_id(&self) -> RpcResult<u64> {
            Ok(1)
        }
        async fn gas_price(&self) -> RpcResult<U256> {
            Ok(1.into())
        }
        async fn estimate_gas(&self, _: &TransactionRequest) -> RpcResult<U256> {
            Ok(21_000.into())
        }
        async fn transaction_count(&self, _: Address) -> RpcResult<U256> {
            Ok(0.into())
        }
        async fn balance(&self, _: Address) -> RpcResult<U256> {
            Ok(0.into())
        }
        async fn block_gas_limit(&self) -> RpcResult<U256> {
            Ok(30_000_000.into())
        }
        async fn send_raw_transaction(&self, _: Bytes) -> RpcResult<H256> {
            Err(RpcError::Unsupported("eth_sendRawTransaction".into()))
        }
        async fn transaction_receipt(&self, _: H256) -> RpcResult<Option<NodeReceipt>> {
            Ok(None)
        }
        async fn call(&self, _: &TransactionRequest) -> RpcResult<Bytes> {
            Ok(Bytes::default())
        }
        async fn client_version(&self) -> RpcResult<String> {
            Ok("Geth/v1.13.0-stable/linux-amd64/go1.21".into())
        }
    }

    #[tokio::test]
    async fn test_reset_unsupported_on_plain_nodes() {
        let network = Network::connect("mainnet", Arc::new(PlainNode), SharedSettings::default())
            .await
            .unwrap();

        assert!(matches!(
            network.reset().await,
            Err(crate::DeployError::Rpc(RpcError::Unsupported(_)))
        ));
    }
}
