// deployer/src/receipt.rs

use chain_client::{NodeReceipt, ReceiptLog};
use ethers_core::types::{Address, H256, U256};
use serde::Serialize;

/// Final record of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReceipt {
    pub tx_hash: H256,
    pub sender: Address,
    pub receiver: Option<Address>,
    /// Set only when a deployment succeeded
    pub contract_address: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas_price: U256,
    /// Gas budget the transaction was signed with
    pub gas_limit: U256,
    pub gas_used: U256,
    /// 1 on success, 0 when reverted
    pub status: u64,
    pub logs: Vec<ReceiptLog>,
    pub block_number: Option<u64>,
    pub revert_reason: Option<String>,
    pub program_counter: Option<u64>,
}

/// Transaction parameters fixed at signing time
#[derive(Debug, Clone, Copy)]
pub(crate) struct Signed {
    pub nonce: u64,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
}

impl TransactionReceipt {
    pub(crate) fn new(node: NodeReceipt, signed: Signed) -> Self {
        let status = infer_status(&node, signed.gas_limit);
        Self {
            tx_hash: node.transaction_hash,
            sender: node.from,
            receiver: node.to,
            contract_address: if status == 1 { node.contract_address } else { None },
            nonce: signed.nonce,
            value: signed.value,
            gas_price: signed.gas_price,
            gas_limit: signed.gas_limit,
            gas_used: node.gas_used,
            status,
            logs: node.logs,
            block_number: node.block_number.map(|n| n.as_u64()),
            revert_reason: node.revert_reason,
            program_counter: node.program_counter.map(|pc| pc.as_u64()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 1
    }

    /// Amount debited from the sender for gas
    pub fn fee(&self) -> U256 {
        self.gas_used.saturating_mul(self.gas_price)
    }
}

/// Receipts from pre-Byzantium nodes carry no status. A transaction that
/// used its whole gas budget there is taken as failed (out of gas or an
/// invalid opcode), anything else as successful.
fn infer_status(node: &NodeReceipt, gas_limit: U256) -> u64 {
    match node.status_code() {
        Some(status) => status,
        None if node.gas_used >= gas_limit => 0,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::U64;

    fn node_receipt(status: u64) -> NodeReceipt {
        NodeReceipt {
            transaction_hash: H256::repeat_byte(1),
            block_number: Some(U64::from(3)),
            from: Address::repeat_byte(2),
            to: None,
            contract_address: Some(Address::repeat_byte(3)),
            gas_used: U256::from(90_000),
            status: Some(U64::from(status)),
            logs: Vec::new(),
            revert_reason: None,
            program_counter: None,
        }
    }

    fn signed(gas_price: u64) -> Signed {
        Signed {
            nonce: 4,
            value: U256::zero(),
            gas_price: U256::from(gas_price),
            gas_limit: U256::from(100_000),
        }
    }

    #[test]
    fn test_fee_is_gas_used_times_price() {
        let receipt = TransactionReceipt::new(node_receipt(1), signed(50));

        assert!(receipt.is_success());
        assert_eq!(receipt.fee(), U256::from(50 * 90_000));
        assert_eq!(receipt.nonce, 4);
        assert_eq!(receipt.block_number, Some(3));
    }

    #[test]
    fn test_reverted_receipt_has_no_contract() {
        let receipt = TransactionReceipt::new(node_receipt(0), signed(0));

        assert!(!receipt.is_success());
        assert_eq!(receipt.contract_address, None);
        assert_eq!(receipt.fee(), U256::zero());
    }

    #[test]
    fn test_status_less_receipt_that_used_all_gas_failed() {
        let mut node = node_receipt(1);
        node.status = None;
        node.gas_used = U256::from(100_000);

        let receipt = TransactionReceipt::new(node, signed(1));
        assert_eq!(receipt.status, 0);
        assert_eq!(receipt.contract_address, None);
    }

    #[test]
    fn test_status_less_receipt_under_budget_succeeded() {
        let mut node = node_receipt(0);
        node.status = None;

        let receipt = TransactionReceipt::new(node, signed(1));
        assert!(receipt.is_success());
        assert_eq!(receipt.contract_address, Some(Address::repeat_byte(3)));
    }
}
