// devchain/src/evm.rs

//! Transaction execution on revm

use crate::fixtures::ERROR_SELECTOR;
use crate::state::ChainState;
use crate::{ChainError, ChainResult};
use chain_client::{EvmVersion, ReceiptLog};
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use revm::primitives::{
    self as rp, CreateScheme, EVMError, Env, ExecutionResult, Halt, InvalidTransaction, Output,
    ResultAndState, SpecId, TransactTo,
};

/// Transaction fields after decoding and sender recovery
#[derive(Debug, Clone)]
pub struct Message {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: U256,
    /// `None` skips the nonce check (calls, estimates, queued transactions)
    pub nonce: Option<u64>,
}

/// revm ruleset for a chain hardfork
pub fn spec_id(version: EvmVersion) -> SpecId {
    match version {
        EvmVersion::Homestead => SpecId::HOMESTEAD,
        EvmVersion::TangerineWhistle => SpecId::TANGERINE,
        EvmVersion::SpuriousDragon => SpecId::SPURIOUS_DRAGON,
        EvmVersion::Byzantium => SpecId::BYZANTIUM,
        EvmVersion::Constantinople => SpecId::CONSTANTINOPLE,
        EvmVersion::Petersburg => SpecId::PETERSBURG,
        EvmVersion::Istanbul => SpecId::ISTANBUL,
        EvmVersion::Berlin => SpecId::BERLIN,
        EvmVersion::London => SpecId::LONDON,
        EvmVersion::Paris => SpecId::MERGE,
        EvmVersion::Shanghai => SpecId::SHANGHAI,
        EvmVersion::Cancun => SpecId::CANCUN,
    }
}

/// Runs messages against a copy of chain state
#[derive(Debug, Clone)]
pub struct Executor {
    chain_id: u64,
    spec: SpecId,
    block_gas_limit: u64,
}

impl Executor {
    pub fn new(chain_id: u64, hardfork: EvmVersion, block_gas_limit: u64) -> Self {
        Self {
            chain_id,
            spec: spec_id(hardfork),
            block_gas_limit,
        }
    }

    fn env(&self, message: &Message, block_number: u64) -> Env {
        let mut env = Env::default();
        env.cfg.chain_id = self.chain_id;
        env.cfg.spec_id = self.spec;

        env.block.number = rp::U256::from(block_number);
        env.block.timestamp = rp::U256::from(block_number);
        env.block.gas_limit = rp::U256::from(self.block_gas_limit);
        env.block.basefee = rp::U256::ZERO;

        env.tx.caller = to_address(message.from);
        env.tx.gas_limit = message.gas_limit;
        env.tx.gas_price = to_u256(message.gas_price);
        env.tx.transact_to = match message.to {
            Some(to) => TransactTo::Call(to_address(to)),
            None => TransactTo::Create(CreateScheme::Create),
        };
        env.tx.value = to_u256(message.value);
        env.tx.data = rp::Bytes::from(message.data.to_vec());
        env.tx.chain_id = Some(self.chain_id);
        env.tx.nonce = message.nonce;
        env
    }

    /// Execute `message` in block `block_number` without touching `state`.
    ///
    /// Errors are transactions the EVM refuses to run at all; a revert or
    /// exceptional halt is a successful execution with a failed result.
    pub fn execute(
        &self,
        state: &ChainState,
        message: &Message,
        block_number: u64,
    ) -> ChainResult<Executed> {
        let mut evm = revm::EVM::new();
        evm.env = self.env(message, block_number);
        evm.database(state.db().clone());

        let ResultAndState {
            result,
            state: changes,
        } = evm
            .transact()
            .map_err(|e| rejection(e, message.gas_limit))?;

        Ok(Executed { result, changes })
    }
}

fn rejection<E: std::fmt::Debug>(err: EVMError<E>, gas_limit: u64) -> ChainError {
    match err {
        EVMError::Transaction(InvalidTransaction::CallGasCostMoreThanGasLimit) => {
            ChainError::IntrinsicGas { limit: gas_limit }
        }
        EVMError::Transaction(reason) => ChainError::InvalidTransaction(format!("{:?}", reason)),
        other => ChainError::State(format!("{:?}", other)),
    }
}

/// Result of a message plus the state changes it would commit
#[derive(Debug)]
pub struct Executed {
    pub result: ExecutionResult,
    pub changes: rp::State,
}

impl Executed {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ExecutionResult::Success { .. })
    }

    /// Gas charged to the sender, after refunds
    pub fn gas_used(&self) -> u64 {
        match &self.result {
            ExecutionResult::Success { gas_used, .. }
            | ExecutionResult::Revert { gas_used, .. }
            | ExecutionResult::Halt { gas_used, .. } => *gas_used,
        }
    }

    /// Gas consumed before refunds are applied
    pub fn peak_gas(&self) -> u64 {
        match &self.result {
            ExecutionResult::Success {
                gas_used,
                gas_refunded,
                ..
            } => gas_used + gas_refunded,
            _ => self.gas_used(),
        }
    }

    /// Return data, or revert data for a reverted call
    pub fn output(&self) -> Bytes {
        let output = match &self.result {
            ExecutionResult::Success { output, .. } => match output {
                Output::Call(data) => data,
                Output::Create(data, _) => data,
            },
            ExecutionResult::Revert { output, .. } => output,
            ExecutionResult::Halt { .. } => return Bytes::default(),
        };
        Bytes::from(output.to_vec())
    }

    pub fn contract_address(&self) -> Option<Address> {
        match &self.result {
            ExecutionResult::Success {
                output: Output::Create(_, Some(address)),
                ..
            } => Some(from_address(*address)),
            _ => None,
        }
    }

    pub fn logs(&self) -> Vec<ReceiptLog> {
        match &self.result {
            ExecutionResult::Success { logs, .. } => logs
                .iter()
                .map(|log| ReceiptLog {
                    address: from_address(log.address),
                    topics: log
                        .topics
                        .iter()
                        .map(|topic| H256::from_slice(topic.as_slice()))
                        .collect(),
                    data: Bytes::from(log.data.to_vec()),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Reason recorded on a failed receipt
    pub fn failure_reason(&self) -> Option<String> {
        match &self.result {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Revert { output, .. } => decode_revert_reason(output),
            ExecutionResult::Halt { reason, .. } => Some(describe_halt(reason)),
        }
    }

    /// Turn a failed execution into the error a call or estimate reports
    pub fn into_result(self) -> ChainResult<Self> {
        let error = match &self.result {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Revert { output, .. } => Some(match decode_revert_reason(output) {
                Some(reason) => format!("revert {}", reason),
                None => "revert".to_string(),
            }),
            ExecutionResult::Halt { reason, .. } => Some(describe_halt(reason)),
        };
        match error {
            Some(error) => Err(ChainError::Execution(error)),
            None => Ok(self),
        }
    }
}

fn describe_halt(reason: &Halt) -> String {
    match reason {
        Halt::OutOfGas(_) => "out of gas".to_string(),
        Halt::OpcodeNotFound | Halt::InvalidFEOpcode | Halt::NotActivated => {
            "invalid opcode".to_string()
        }
        Halt::InvalidJump => "invalid jump destination".to_string(),
        Halt::StackUnderflow => "stack underflow".to_string(),
        Halt::StackOverflow => "stack overflow".to_string(),
        other => format!("{:?}", other),
    }
}

/// Reason string from `Error(string)` revert data
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_SELECTOR {
        return None;
    }
    match abi::decode(&[ParamType::String], &data[4..]).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

pub(crate) fn to_address(address: Address) -> rp::Address {
    rp::Address::from(address.0)
}

pub(crate) fn from_address(address: rp::Address) -> Address {
    Address::from_slice(address.as_slice())
}

pub(crate) fn to_u256(value: U256) -> rp::U256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    rp::U256::from_be_bytes(bytes)
}

pub(crate) fn from_u256(value: rp::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn funded(address: Address) -> ChainState {
        let mut state = ChainState::new();
        state.set_balance(address, U256::exp10(20));
        state
    }

    fn create(from: Address, data: Vec<u8>, gas_limit: u64) -> Message {
        Message {
            from,
            to: None,
            value: U256::zero(),
            data: Bytes::from(data),
            gas_limit,
            gas_price: U256::one(),
            nonce: Some(0),
        }
    }

    #[test]
    fn test_conversions_preserve_values() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(from_address(to_address(address)), address);

        let value = U256::MAX - U256::from(12345);
        assert_eq!(from_u256(to_u256(value)), value);
    }

    #[test]
    fn test_spec_ids_follow_hardfork_order() {
        let specs: Vec<SpecId> = EvmVersion::ALL.iter().map(|v| spec_id(*v)).collect();
        assert!(specs.windows(2).all(|pair| (pair[0] as u8) < (pair[1] as u8)));
    }

    #[test]
    fn test_push0_is_gated_by_hardfork() {
        let from = Address::repeat_byte(1);
        let state = funded(from);
        let message = create(from, fixtures::shanghai_only().bytecode.to_vec(), 100_000);

        let istanbul = Executor::new(1337, EvmVersion::Istanbul, 12_000_000);
        let executed = istanbul.execute(&state, &message, 1).unwrap();
        assert!(!executed.is_success());
        assert_eq!(executed.gas_used(), 100_000);
        assert_eq!(executed.failure_reason().as_deref(), Some("invalid opcode"));

        let shanghai = Executor::new(1337, EvmVersion::Shanghai, 12_000_000);
        let executed = shanghai.execute(&state, &message, 1).unwrap();
        assert!(executed.is_success());
        assert_eq!(
            executed.contract_address(),
            Some(ChainState::create_address(&from, 0))
        );
    }

    #[test]
    fn test_revert_reason_is_decoded() {
        let from = Address::repeat_byte(1);
        let state = funded(from);
        let mut data = fixtures::tester().unwrap().bytecode.to_vec();
        data.extend(abi::encode(&[Token::Bool(false)]));

        let executor = Executor::new(1337, EvmVersion::Istanbul, 12_000_000);
        let executed = executor
            .execute(&state, &create(from, data, 500_000), 1)
            .unwrap();

        assert_eq!(
            executed.failure_reason().as_deref(),
            Some(fixtures::TESTER_REJECTED)
        );
        let err = executed.into_result().unwrap_err();
        assert!(err.to_string().contains(fixtures::TESTER_REJECTED));
    }

    #[test]
    fn test_intrinsic_gas_is_a_rejection() {
        let from = Address::repeat_byte(1);
        let state = funded(from);
        let executor = Executor::new(1337, EvmVersion::Istanbul, 12_000_000);

        let err = executor
            .execute(&state, &create(from, vec![0x00], 21_000), 1)
            .unwrap_err();
        assert!(matches!(err, ChainError::IntrinsicGas { limit: 21_000 }));
    }

    #[test]
    fn test_decode_revert_reason() {
        let payload = fixtures::revert_payload("boom");
        assert_eq!(decode_revert_reason(&payload).as_deref(), Some("boom"));
        assert_eq!(decode_revert_reason(&[0xde, 0xad]), None);
    }
}
