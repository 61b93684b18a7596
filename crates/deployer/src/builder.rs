// deployer/src/builder.rs

use crate::evm;
use crate::gas::GasResolver;
use crate::nonce::NonceTracker;
use crate::receipt::{Signed, TransactionReceipt};
use crate::DeployResult;
use chain_client::{ChainClient, EvmVersion, NodeReceipt, RpcError, RpcResult};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers_signers::{LocalWallet, Signer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What to send, before pricing and nonce assignment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTransaction {
    /// `None` creates a contract
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
}

impl PendingTransaction {
    pub fn deployment(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to: Some(to),
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to: Some(to),
            value,
            ..Default::default()
        }
    }
}

/// Per-call values that take precedence over settings and node defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOverrides {
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
    /// Replaces the pending transaction's value
    pub value: Option<U256>,
}

impl TxOverrides {
    pub fn gas_price(mut self, gas_price: impl Into<U256>) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    pub fn gas_limit(mut self, gas_limit: impl Into<U256>) -> Self {
        self.gas_limit = Some(gas_limit.into());
        self
    }

    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Receipt polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptPolicy {
    /// First wait between polls
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Upper bound for the doubling wait
    #[serde(with = "millis")]
    pub max_interval: Duration,
    /// Give up after this long; `None` waits indefinitely
    #[serde(with = "optional_millis", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            timeout: None,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Prices, signs, submits and confirms transactions.
///
/// Stages: building → priced → nonced → submitted → confirmed. Any RPC
/// failure aborts the transaction where it happens and is returned as is.
#[derive(Clone)]
pub struct TransactionBuilder {
    client: Arc<dyn ChainClient>,
    gas: GasResolver,
    nonces: Arc<NonceTracker>,
    receipts: ReceiptPolicy,
    chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(
        client: Arc<dyn ChainClient>,
        gas: GasResolver,
        nonces: Arc<NonceTracker>,
        receipts: ReceiptPolicy,
        chain_id: u64,
    ) -> Self {
        Self {
            client,
            gas,
            nonces,
            receipts,
            chain_id,
        }
    }

    /// Send `pending` from `wallet` and wait for it to be mined.
    ///
    /// The node's EVM ruleset is checked against `target` before anything
    /// else. The account's nonce only advances once the node accepts the
    /// transaction.
    pub async fn execute(
        &self,
        wallet: &LocalWallet,
        pending: PendingTransaction,
        overrides: TxOverrides,
        target: EvmVersion,
    ) -> DeployResult<TransactionReceipt> {
        let from = wallet.address();
        tracing::debug!("Building transaction from {:?}", from);
        evm::verify(self.client.as_ref(), target).await?;

        let value = overrides.value.unwrap_or(pending.value);
        let gas_price = self.gas.gas_price(overrides.gas_price).await?;
        let mut request = TransactionRequest::new()
            .from(from)
            .value(value)
            .data(pending.data)
            .gas_price(gas_price);
        if let Some(to) = pending.to {
            request = request.to(to);
        }
        let gas_limit = self.gas.gas_limit(overrides.gas_limit, &request).await?;
        tracing::debug!("Priced: gas price {}, gas limit {}", gas_price, gas_limit);

        let reservation = self.nonces.reserve(from).await?;
        let nonce = reservation.nonce();
        tracing::debug!("Nonced: {:?} uses nonce {}", from, nonce);

        let tx: TypedTransaction = request
            .gas(gas_limit)
            .nonce(nonce)
            .chain_id(self.chain_id)
            .into();
        let signature = wallet.sign_transaction_sync(&tx)?;
        let hash = self.client.send_raw_transaction(tx.rlp_signed(&signature)).await?;
        reservation.commit();
        tracing::info!("Submitted {:?} (nonce {})", hash, nonce);

        let node = self.wait_for_receipt(hash).await?;
        let receipt = TransactionReceipt::new(
            node,
            Signed {
                nonce,
                value,
                gas_price,
                gas_limit,
            },
        );
        tracing::info!(
            "Confirmed {:?} in block {:?}: status {}, gas used {}",
            receipt.tx_hash,
            receipt.block_number,
            receipt.status,
            receipt.gas_used
        );
        Ok(receipt)
    }

    /// Poll for the receipt of `hash`, doubling the wait each time
    pub async fn wait_for_receipt(&self, hash: H256) -> RpcResult<NodeReceipt> {
        let started = Instant::now();
        let mut interval = self.receipts.poll_interval;

        loop {
            if let Some(receipt) = self.client.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            if let Some(timeout) = self.receipts.timeout {
                if started.elapsed() >= timeout {
                    return Err(RpcError::Timeout(format!("receipt of {:?}", hash)));
                }
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(self.receipts.max_interval);
        }
    }
}
