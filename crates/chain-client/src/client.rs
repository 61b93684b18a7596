// chain-client/src/client.rs

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, TransactionRequest, H256, U256};

use crate::{EvmVersion, NodeReceipt, ResetSignal, RpcError, RpcResult};

/// Node access used by the deployment layer.
///
/// One connection is shared by every account; implementations must be
/// safe to call concurrently.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> RpcResult<u64>;

    /// Current gas price suggested by the node
    async fn gas_price(&self) -> RpcResult<U256>;

    /// Gas required to execute `tx` against the latest state
    async fn estimate_gas(&self, tx: &TransactionRequest) -> RpcResult<U256>;

    /// Number of transactions sent from `address`
    async fn transaction_count(&self, address: Address) -> RpcResult<U256>;

    async fn balance(&self, address: Address) -> RpcResult<U256>;

    /// Gas limit of the latest block
    async fn block_gas_limit(&self) -> RpcResult<U256>;

    /// Submit a signed, RLP-encoded transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> RpcResult<H256>;

    /// Receipt for `hash`, or `None` while the transaction is pending
    async fn transaction_receipt(&self, hash: H256) -> RpcResult<Option<NodeReceipt>>;

    /// Read-only execution against the latest state
    async fn call(&self, tx: &TransactionRequest) -> RpcResult<Bytes>;

    async fn client_version(&self) -> RpcResult<String>;

    /// Ruleset the node enforces, if it can be determined
    async fn evm_version(&self) -> RpcResult<Option<EvmVersion>> {
        let version = self.client_version().await?;
        Ok(EvmVersion::from_client_version(&version))
    }

    /// Roll the chain back to its initial state (test chains only)
    async fn reset(&self) -> RpcResult<()> {
        Err(RpcError::Unsupported("reset".into()))
    }

    /// Rollback notifications for this chain
    fn reset_signal(&self) -> ResetSignal {
        ResetSignal::never()
    }
}
