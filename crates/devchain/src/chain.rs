// devchain/src/chain.rs

use crate::evm::{Executed, Executor, Message};
use crate::state::ChainState;
use crate::{ChainError, ChainResult};
use async_trait::async_trait;
use chain_client::{ChainClient, EvmVersion, NodeReceipt, ResetNotifier, ResetSignal, RpcResult};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{
    Address, Bytes, NameOrAddress, Signature, TransactionRequest, H256, U256, U64,
};
use ethers_core::utils::{keccak256, parse_ether, rlp};
use ethers_signers::{LocalWallet, Signer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Development chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalChainConfig {
    pub chain_id: u64,
    /// Price reported by `eth_gasPrice`, in wei
    pub gas_price: U256,
    pub block_gas_limit: u64,
    /// Ruleset the chain enforces
    pub hardfork: EvmVersion,
    /// Number of funded accounts
    pub accounts: usize,
    /// Initial balance of each funded account, in wei
    pub account_balance: U256,
    /// Seed the account secrets are derived from
    pub mnemonic: String,
    /// Mine every transaction into its own block on arrival
    pub automine: bool,
}

impl Default for LocalChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            gas_price: U256::from(20_000_000_000u64),
            block_gas_limit: 12_000_000,
            hardfork: EvmVersion::Istanbul,
            accounts: 10,
            account_balance: parse_ether(100).unwrap_or_default(),
            mnemonic: "test test test test test test test test test test test junk".into(),
            automine: true,
        }
    }
}

/// Funded account created at genesis
#[derive(Debug, Clone)]
pub struct DevAccount {
    pub address: Address,
    pub secret: H256,
}

#[derive(Debug, Clone)]
struct PendingTransaction {
    hash: H256,
    message: Message,
}

/// Everything a snapshot restores
#[derive(Debug, Clone)]
struct ChainData {
    state: ChainState,
    block_number: u64,
    pending: Vec<PendingTransaction>,
    receipts: HashMap<H256, NodeReceipt>,
}

struct Inner {
    data: ChainData,
    genesis: ChainData,
    snapshots: BTreeMap<u64, ChainData>,
    next_snapshot: u64,
    automine: bool,
}

/// Simulated chain implementing [`ChainClient`] in-process
pub struct LocalChain {
    config: LocalChainConfig,
    executor: Executor,
    accounts: Vec<DevAccount>,
    inner: RwLock<Inner>,
    resets: ResetNotifier,
}

impl LocalChain {
    pub fn new(config: LocalChainConfig) -> Self {
        let accounts = derive_accounts(&config.mnemonic, config.accounts);

        let mut state = ChainState::new();
        for account in &accounts {
            state.set_balance(account.address, config.account_balance);
        }

        let genesis = ChainData {
            state,
            block_number: 0,
            pending: Vec::new(),
            receipts: HashMap::new(),
        };

        tracing::info!(
            "DevChain started: chain id {}, hardfork {}, {} accounts",
            config.chain_id,
            config.hardfork,
            accounts.len()
        );

        Self {
            executor: Executor::new(config.chain_id, config.hardfork, config.block_gas_limit),
            inner: RwLock::new(Inner {
                data: genesis.clone(),
                genesis,
                snapshots: BTreeMap::new(),
                next_snapshot: 1,
                automine: config.automine,
            }),
            accounts,
            config,
            resets: ResetNotifier::new(),
        }
    }

    pub fn config(&self) -> &LocalChainConfig {
        &self.config
    }

    pub fn accounts(&self) -> &[DevAccount] {
        &self.accounts
    }

    pub fn hardfork(&self) -> EvmVersion {
        self.config.hardfork
    }

    /// Command line equivalent of this chain's configuration
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "--chain-id".to_string(),
            self.config.chain_id.to_string(),
            "--gas-limit".to_string(),
            self.config.block_gas_limit.to_string(),
            "-k".to_string(),
            self.config.hardfork.name().to_string(),
        ]
    }

    pub async fn block_number(&self) -> u64 {
        self.inner.read().await.data.block_number
    }

    pub async fn set_automine(&self, automine: bool) {
        self.inner.write().await.automine = automine;
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.read().await.data.pending.len()
    }

    pub async fn code(&self, address: Address) -> Bytes {
        self.inner.read().await.data.state.code(&address)
    }

    /// Mine all pending transactions, one block each. Returns the number mined.
    pub async fn mine(&self) -> usize {
        let mut inner = self.inner.write().await;
        let pending = std::mem::take(&mut inner.data.pending);
        let mut mined = 0;
        for tx in pending {
            let block_number = inner.data.block_number + 1;
            match self.executor.execute(&inner.data.state, &tx.message, block_number) {
                Ok(executed) => {
                    self.record(&mut inner.data, tx.hash, &tx.message, executed);
                    mined += 1;
                }
                Err(e) => tracing::warn!("Dropped {:?}: {}", tx.hash, e),
            }
        }
        mined
    }

    /// Record the current state, returning the snapshot id
    pub async fn snapshot(&self) -> u64 {
        let mut inner = self.inner.write().await;
        let id = inner.next_snapshot;
        inner.next_snapshot += 1;
        let data = inner.data.clone();
        inner.snapshots.insert(id, data);
        tracing::debug!("Snapshot {} at block {}", id, inner.data.block_number);
        id
    }

    /// Restore snapshot `id`, discarding it and every later snapshot
    pub async fn revert(&self, id: u64) -> ChainResult<()> {
        let mut inner = self.inner.write().await;
        let data = inner
            .snapshots
            .remove(&id)
            .ok_or(ChainError::UnknownSnapshot(id))?;
        inner.snapshots.retain(|snapshot, _| *snapshot < id);
        inner.data = data;
        drop(inner);

        tracing::info!("Reverted to snapshot {}", id);
        self.resets.notify();
        Ok(())
    }

    /// Return to genesis
    pub async fn reset_chain(&self) {
        let mut inner = self.inner.write().await;
        inner.data = inner.genesis.clone();
        inner.snapshots.clear();
        drop(inner);

        tracing::info!("Chain reset to genesis");
        self.resets.notify();
    }

    fn decode(&self, raw: &[u8]) -> ChainResult<(H256, Message)> {
        let rlp = rlp::Rlp::new(raw);
        let (tx, signature): (TypedTransaction, Signature) = TypedTransaction::decode_signed(&rlp)
            .map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;

        let from = signature
            .recover(tx.sighash())
            .map_err(|e| ChainError::InvalidTransaction(e.to_string()))?;

        if let Some(chain_id) = tx.chain_id() {
            if chain_id.as_u64() != self.config.chain_id {
                return Err(ChainError::ChainIdMismatch {
                    expected: self.config.chain_id,
                    got: chain_id.as_u64(),
                });
            }
        }

        let nonce = tx.nonce().copied().unwrap_or_default();
        if nonce > U256::from(u64::MAX) {
            return Err(ChainError::InvalidTransaction("nonce overflow".into()));
        }

        let gas = tx.gas().copied().unwrap_or_default();
        if gas > U256::from(self.config.block_gas_limit) {
            return Err(ChainError::ExceedsBlockGasLimit {
                limit: gas,
                block_limit: self.config.block_gas_limit,
            });
        }

        let message = Message {
            from,
            to: recipient(tx.to())?,
            value: tx.value().copied().unwrap_or_default(),
            data: tx.data().cloned().unwrap_or_default(),
            gas_limit: gas.as_u64(),
            gas_price: tx.gas_price().unwrap_or_default(),
            nonce: Some(nonce.as_u64()),
        };

        Ok((tx.hash(&signature), message))
    }

    /// Validate nonce and funds against current state plus queued transactions
    fn admit(&self, data: &ChainData, message: &Message) -> ChainResult<()> {
        let queued = data
            .pending
            .iter()
            .filter(|pending| pending.message.from == message.from)
            .count() as u64;
        let expected = data.state.nonce(&message.from) + queued;
        let nonce = message.nonce.unwrap_or(expected);

        if nonce < expected {
            return Err(ChainError::NonceTooLow { expected, got: nonce });
        }
        if nonce > expected {
            return Err(ChainError::NonceTooHigh { expected, got: nonce });
        }

        let required = U256::from(message.gas_limit)
            .checked_mul(message.gas_price)
            .and_then(|fee| fee.checked_add(message.value))
            .ok_or_else(|| ChainError::InvalidTransaction("fee overflow".into()))?;
        let available = data.state.balance(&message.from);
        if available < required {
            return Err(ChainError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Commit an executed transaction in a new block and store its receipt
    fn record(&self, data: &mut ChainData, hash: H256, message: &Message, executed: Executed) {
        data.block_number += 1;

        let receipt = NodeReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(data.block_number)),
            from: message.from,
            to: message.to,
            contract_address: executed.contract_address(),
            gas_used: U256::from(executed.gas_used()),
            status: Some(U64::from(executed.is_success() as u64)),
            logs: executed.logs(),
            revert_reason: executed.failure_reason(),
            program_counter: None,
        };
        data.state.commit(executed.changes);

        tracing::debug!(
            "Mined {:?} in block {} (status {:?}, gas used {})",
            hash,
            data.block_number,
            receipt.status_code(),
            receipt.gas_used
        );
        data.receipts.insert(hash, receipt);
    }

    /// Message for `eth_call` / `eth_estimateGas`, capped at the block gas limit
    fn call_message(&self, tx: &TransactionRequest) -> ChainResult<Message> {
        Ok(Message {
            from: tx.from.unwrap_or_default(),
            to: recipient(tx.to.as_ref())?,
            value: tx.value.unwrap_or_default(),
            data: tx.data.clone().unwrap_or_default(),
            gas_limit: tx
                .gas
                .map(|gas| gas.min(U256::from(self.config.block_gas_limit)).as_u64())
                .unwrap_or(self.config.block_gas_limit),
            gas_price: U256::zero(),
            nonce: None,
        })
    }

    /// Latest state and the number of the block a new transaction would land in
    async fn head(&self) -> (ChainState, u64) {
        let inner = self.inner.read().await;
        (inner.data.state.clone(), inner.data.block_number + 1)
    }

    fn succeeds(&self, state: &ChainState, message: &Message, block_number: u64) -> bool {
        self.executor
            .execute(state, message, block_number)
            .map(|executed| executed.is_success())
            .unwrap_or(false)
    }
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::new(LocalChainConfig::default())
    }
}

#[async_trait]
impl ChainClient for LocalChain {
    async fn chain_id(&self) -> RpcResult<u64> {
        Ok(self.config.chain_id)
    }

    async fn gas_price(&self) -> RpcResult<U256> {
        Ok(self.config.gas_price)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> RpcResult<U256> {
        let (state, block_number) = self.head().await;
        let mut message = self.call_message(tx)?;
        let cap = message.gas_limit;

        let executed = self
            .executor
            .execute(&state, &message, block_number)?
            .into_result()?;

        // Gas before refunds is usually enough. SSTORE refuses to run with
        // no more than the call stipend left, so search upwards otherwise.
        let mut low = executed.peak_gas();
        message.gas_limit = low;
        if self.succeeds(&state, &message, block_number) {
            return Ok(U256::from(low));
        }

        let mut high = cap;
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            message.gas_limit = mid;
            if self.succeeds(&state, &message, block_number) {
                high = mid;
            } else {
                low = mid;
            }
        }
        Ok(U256::from(high))
    }

    async fn transaction_count(&self, address: Address) -> RpcResult<U256> {
        let inner = self.inner.read().await;
        Ok(U256::from(inner.data.state.nonce(&address)))
    }

    async fn balance(&self, address: Address) -> RpcResult<U256> {
        let inner = self.inner.read().await;
        Ok(inner.data.state.balance(&address))
    }

    async fn block_gas_limit(&self) -> RpcResult<U256> {
        Ok(U256::from(self.config.block_gas_limit))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RpcResult<H256> {
        let (hash, message) = self.decode(&raw)?;

        let mut inner = self.inner.write().await;
        self.admit(&inner.data, &message)?;

        let block_number = inner.data.block_number + 1;
        if inner.automine {
            let executed = self
                .executor
                .execute(&inner.data.state, &message, block_number)?;
            tracing::debug!("Accepted {:?} from {:?}", hash, message.from);
            self.record(&mut inner.data, hash, &message, executed);
        } else {
            // Queued transactions ahead of this one have not bumped the nonce yet
            let preflight = Message {
                nonce: None,
                ..message.clone()
            };
            self.executor
                .execute(&inner.data.state, &preflight, block_number)?;
            tracing::debug!("Queued {:?} from {:?}", hash, message.from);
            inner.data.pending.push(PendingTransaction { hash, message });
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> RpcResult<Option<NodeReceipt>> {
        let inner = self.inner.read().await;
        Ok(inner.data.receipts.get(&hash).cloned())
    }

    async fn call(&self, tx: &TransactionRequest) -> RpcResult<Bytes> {
        let (state, block_number) = self.head().await;
        let message = self.call_message(tx)?;
        let executed = self
            .executor
            .execute(&state, &message, block_number)?
            .into_result()?;
        Ok(executed.output())
    }

    async fn client_version(&self) -> RpcResult<String> {
        Ok(format!(
            "DevChain/v{}/{}",
            env!("CARGO_PKG_VERSION"),
            self.config.hardfork.name()
        ))
    }

    async fn evm_version(&self) -> RpcResult<Option<EvmVersion>> {
        Ok(EvmVersion::from_launch_args(&self.launch_args()))
    }

    async fn reset(&self) -> RpcResult<()> {
        self.reset_chain().await;
        Ok(())
    }

    fn reset_signal(&self) -> ResetSignal {
        self.resets.subscribe()
    }
}

fn recipient(to: Option<&NameOrAddress>) -> ChainResult<Option<Address>> {
    match to {
        None => Ok(None),
        Some(NameOrAddress::Address(address)) => Ok(Some(*address)),
        Some(NameOrAddress::Name(name)) => Err(ChainError::InvalidTransaction(format!(
            "ENS names are not supported: {}",
            name
        ))),
    }
}

/// Deterministic accounts: secret `i` is keccak256 of `"{mnemonic}/{i}"`
fn derive_accounts(mnemonic: &str, count: usize) -> Vec<DevAccount> {
    let mut accounts = Vec::with_capacity(count);
    let mut index = 0u64;
    while accounts.len() < count {
        let secret = H256::from(keccak256(format!("{}/{}", mnemonic, index)));
        index += 1;
        // Skip the rare hash that is not a valid secp256k1 scalar
        if let Ok(wallet) = LocalWallet::from_bytes(secret.as_bytes()) {
            accounts.push(DevAccount {
                address: wallet.address(),
                secret,
            });
        }
    }
    accounts
}
