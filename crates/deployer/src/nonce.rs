// deployer/src/nonce.rs

use chain_client::{ChainClient, ResetSignal, RpcError, RpcResult};
use ethers_core::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    /// Next nonce to hand out, if known
    next: Option<u64>,
    /// Reset epoch `next` was learned in
    epoch: u64,
}

/// Per-account nonce cache kept in step with the chain.
///
/// Each account has its own slot; a reservation holds the slot's lock until
/// it is committed or dropped, so two submissions from one account never
/// share a nonce. Cached values from before a chain rollback are discarded.
pub struct NonceTracker {
    client: Arc<dyn ChainClient>,
    signal: ResetSignal,
    slots: Mutex<HashMap<Address, Arc<Mutex<Slot>>>>,
}

impl NonceTracker {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        let signal = client.reset_signal();
        Self {
            client,
            signal,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, address: Address) -> Arc<Mutex<Slot>> {
        self.slots.lock().await.entry(address).or_default().clone()
    }

    /// Lock `address`'s slot and return the nonce its next transaction uses
    pub async fn reserve(&self, address: Address) -> RpcResult<NonceReservation> {
        let mut slot = self.slot(address).await.lock_owned().await;
        let epoch = self.signal.epoch();

        let nonce = match slot.next {
            Some(next) if slot.epoch == epoch => next,
            cached => {
                let count = self.client.transaction_count(address).await?;
                let nonce = to_nonce(count)?;
                if cached.is_some() {
                    tracing::debug!("Chain was reset, nonce of {:?} resynced to {}", address, nonce);
                }
                nonce
            }
        };

        slot.next = Some(nonce);
        slot.epoch = epoch;
        Ok(NonceReservation {
            address,
            nonce,
            slot,
        })
    }

    /// Nonce the next transaction from `address` would use
    pub async fn current(&self, address: Address) -> RpcResult<u64> {
        Ok(self.reserve(address).await?.nonce())
    }

    /// Forget every cached nonce
    pub async fn invalidate(&self) {
        self.slots.lock().await.clear();
    }
}

fn to_nonce(count: U256) -> RpcResult<u64> {
    if count > U256::from(u64::MAX) {
        return Err(RpcError::Decode(format!("Nonce {} out of range", count)));
    }
    Ok(count.as_u64())
}

/// Exclusive claim on an account's next nonce
pub struct NonceReservation {
    address: Address,
    nonce: u64,
    slot: OwnedMutexGuard<Slot>,
}

impl NonceReservation {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Record that the transaction was accepted by the node
    pub fn commit(mut self) {
        self.slot.next = Some(self.nonce + 1);
        tracing::trace!("Nonce of {:?} advanced to {}", self.address, self.nonce + 1);
    }
}
