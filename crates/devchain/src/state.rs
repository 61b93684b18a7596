// devchain/src/state.rs

use crate::evm::{from_u256, to_address, to_u256};
use ethers_core::types::{Address, Bytes, U256};
use ethers_core::utils::get_contract_address;
use revm::db::{CacheDB, DatabaseCommit, EmptyDB, InMemoryDB};
use revm::primitives::{AccountInfo, State, KECCAK_EMPTY};
use std::fmt;

/// World state of the development chain
#[derive(Clone)]
pub struct ChainState {
    db: InMemoryDB,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            db: CacheDB::new(EmptyDB::default()),
        }
    }
}

impl fmt::Debug for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainState")
            .field("accounts", &self.db.accounts.len())
            .finish()
    }
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn db(&self) -> &InMemoryDB {
        &self.db
    }

    fn info(&self, address: &Address) -> Option<&AccountInfo> {
        self.db
            .accounts
            .get(&to_address(*address))
            .map(|account| &account.info)
    }

    pub fn balance(&self, address: &Address) -> U256 {
        self.info(address)
            .map(|info| from_u256(info.balance))
            .unwrap_or_default()
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        let mut info = self.info(&address).cloned().unwrap_or_default();
        info.balance = to_u256(balance);
        self.db.insert_account_info(to_address(address), info);
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.info(address).map(|info| info.nonce).unwrap_or(0)
    }

    /// Deployed runtime code, empty for externally owned accounts
    pub fn code(&self, address: &Address) -> Bytes {
        let Some(info) = self.info(address) else {
            return Bytes::default();
        };
        if info.code_hash == KECCAK_EMPTY {
            return Bytes::default();
        }
        info.code
            .as_ref()
            .or_else(|| self.db.contracts.get(&info.code_hash))
            .map(|code| Bytes::from(code.original_bytes().to_vec()))
            .unwrap_or_default()
    }

    /// Check if address is a contract
    pub fn is_contract(&self, address: &Address) -> bool {
        !self.code(address).is_empty()
    }

    /// Apply the account changes of an executed transaction
    pub fn commit(&mut self, changes: State) {
        self.db.commit(changes);
    }

    /// Address a CREATE from `deployer` at `nonce` lands on
    pub fn create_address(deployer: &Address, nonce: u64) -> Address {
        get_contract_address(*deployer, nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_untouched_account_is_empty() {
        let state = ChainState::new();

        assert_eq!(state.balance(&address(1)), U256::zero());
        assert_eq!(state.nonce(&address(1)), 0);
        assert!(state.code(&address(1)).is_empty());
        assert!(!state.is_contract(&address(1)));
    }

    #[test]
    fn test_set_balance_keeps_other_fields() {
        let mut state = ChainState::new();
        state.set_balance(address(1), U256::from(1000));
        state.set_balance(address(1), U256::from(700));

        assert_eq!(state.balance(&address(1)), U256::from(700));
        assert_eq!(state.nonce(&address(1)), 0);
    }

    #[test]
    fn test_clones_are_independent() {
        let mut state = ChainState::new();
        state.set_balance(address(1), U256::from(10));

        let snapshot = state.clone();
        state.set_balance(address(1), U256::from(20));

        assert_eq!(snapshot.balance(&address(1)), U256::from(10));
        assert_eq!(state.balance(&address(1)), U256::from(20));
    }

    #[test]
    fn test_create_address_depends_on_nonce() {
        let deployer = address(7);

        let first = ChainState::create_address(&deployer, 0);
        let second = ChainState::create_address(&deployer, 1);

        assert_ne!(first, second);
        assert_eq!(first, ChainState::create_address(&deployer, 0));
    }
}
