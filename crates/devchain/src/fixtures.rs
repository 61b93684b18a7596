// devchain/src/fixtures.rs

//! Hand-assembled contracts for exercising the chain without a compiler.

use crate::{ChainError, ChainResult};
use ethers_core::abi::{self, Token};
use ethers_core::types::{Bytes, U256};
use ethers_core::utils::{id, keccak256};
use revm::interpreter::opcode::{
    CALLDATALOAD, CODECOPY, CODESIZE, DIV, DUP1, EQ, JUMPDEST, JUMPI, LOG0, MLOAD,
    MSTORE, PUSH0, PUSH1, RETURN, REVERT, SLOAD, SSTORE, STOP, SUB,
};
use std::collections::HashMap;

/// Selector of `Error(string)`
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Reason the tester constructor reverts with when passed `false`
pub const TESTER_REJECTED: &str = "Tester: constructor rejected";

/// Reason `fail()` reverts with
pub const TESTER_FAILED: &str = "Tester: fail called";

/// Value the tester constructor stores
pub const TESTER_INITIAL_VALUE: u64 = 42;

/// Minimal assembler with forward-referencable jump labels
#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    labels: HashMap<&'static str, usize>,
    fixups: Vec<(usize, &'static str)>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(&mut self, op: u8) -> &mut Self {
        self.code.push(op);
        self
    }

    /// PUSHn of `bytes` (1 to 32 bytes, empty pushes a zero byte)
    pub fn push(&mut self, bytes: &[u8]) -> &mut Self {
        let bytes = match bytes.len() {
            0 => &[0u8][..],
            n if n > 32 => &bytes[n - 32..],
            _ => bytes,
        };
        self.code.push(PUSH1 + (bytes.len() as u8 - 1));
        self.code.extend_from_slice(bytes);
        self
    }

    /// Smallest PUSH holding `value`
    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        self.push(&bytes[first..])
    }

    /// PUSH2, regardless of magnitude
    pub fn push_u16(&mut self, value: u16) -> &mut Self {
        self.push(&value.to_be_bytes())
    }

    pub fn push_word(&mut self, word: U256) -> &mut Self {
        let mut bytes = [0u8; 32];
        word.to_big_endian(&mut bytes);
        self.push(&bytes)
    }

    /// PUSH2 of a label's offset, resolved by `assemble`
    pub fn push_label(&mut self, label: &'static str) -> &mut Self {
        self.code.push(PUSH1 + 1);
        self.fixups.push((self.code.len(), label));
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// Mark the current offset with a JUMPDEST
    pub fn label(&mut self, label: &'static str) -> &mut Self {
        self.labels.insert(label, self.code.len());
        self.op(JUMPDEST)
    }

    /// Write `data` to memory at `offset` in 32-byte words
    pub fn mstore_bytes(&mut self, offset: u64, data: &[u8]) -> &mut Self {
        for (i, chunk) in data.chunks(32).enumerate() {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            self.push(&word);
            self.push_u64(offset + 32 * i as u64);
            self.op(MSTORE);
        }
        self
    }

    /// Revert with an ABI-encoded `Error(string)`
    pub fn revert_with_reason(&mut self, reason: &str) -> &mut Self {
        let payload = revert_payload(reason);
        self.mstore_bytes(0, &payload);
        self.push_u64(payload.len() as u64);
        self.push_u64(0);
        self.op(REVERT)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn assemble(&self) -> ChainResult<Vec<u8>> {
        let mut code = self.code.clone();
        for (at, label) in &self.fixups {
            let target = self
                .labels
                .get(label)
                .ok_or_else(|| ChainError::State(format!("Undefined label {}", label)))?;
            let target = u16::try_from(*target)
                .map_err(|_| ChainError::State(format!("Label {} out of PUSH2 range", label)))?;
            code[*at..*at + 2].copy_from_slice(&target.to_be_bytes());
        }
        Ok(code)
    }
}

/// `Error(string)` revert data for `reason`
pub fn revert_payload(reason: &str) -> Vec<u8> {
    let mut payload = ERROR_SELECTOR.to_vec();
    payload.extend(abi::encode(&[Token::String(reason.to_string())]));
    payload
}

/// Compiled contract in build-artifact form
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: &'static str,
    pub abi: serde_json::Value,
    pub bytecode: Bytes,
    pub evm_version: Option<&'static str>,
}

impl Fixture {
    /// Build artifact JSON (`contractName`, `abi`, `bytecode`, `compiler`)
    pub fn artifact_json(&self) -> serde_json::Value {
        let mut artifact = serde_json::json!({
            "contractName": self.name,
            "abi": self.abi,
            "bytecode": self.bytecode.to_string(),
        });
        if let Some(evm_version) = self.evm_version {
            artifact["compiler"] = serde_json::json!({ "evm_version": evm_version });
        }
        artifact
    }
}

/// `Tester(bool ok)`: stores 42 when `ok`, reverts with [`TESTER_REJECTED`]
/// otherwise. Runtime exposes `value()`, `set(uint256)` (emitting
/// `ValueSet(uint256)`) and `fail()`.
pub fn tester() -> ChainResult<Fixture> {
    let runtime = tester_runtime()?;
    let mut bytecode = constructor(&runtime)?;
    bytecode.extend_from_slice(&runtime);

    Ok(Fixture {
        name: "Tester",
        abi: serde_json::json!([
            {
                "type": "constructor",
                "inputs": [{ "name": "ok", "type": "bool" }],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "value",
                "inputs": [],
                "outputs": [{ "name": "", "type": "uint256" }],
                "stateMutability": "view"
            },
            {
                "type": "function",
                "name": "set",
                "inputs": [{ "name": "newValue", "type": "uint256" }],
                "outputs": [],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "fail",
                "inputs": [],
                "outputs": [],
                "stateMutability": "nonpayable"
            },
            {
                "type": "event",
                "name": "ValueSet",
                "inputs": [{ "name": "newValue", "type": "uint256", "indexed": false }],
                "anonymous": false
            }
        ]),
        bytecode: Bytes::from(bytecode),
        evm_version: None,
    })
}

/// Contract whose init code uses PUSH0, compiled for Shanghai
pub fn shanghai_only() -> Fixture {
    Fixture {
        name: "ShanghaiOnly",
        abi: serde_json::json!([]),
        bytecode: Bytes::from(vec![PUSH0, PUSH0, RETURN]),
        evm_version: Some("shanghai"),
    }
}

/// Init code: read the trailing bool argument, revert on false, store the
/// initial value and return the runtime code appended after the init code.
fn constructor(runtime: &[u8]) -> ChainResult<Vec<u8>> {
    let runtime_len = u16::try_from(runtime.len())
        .map_err(|_| ChainError::State("Runtime code too large".into()))?;

    let build = |runtime_offset: u16| {
        let mut asm = Assembler::new();
        asm.push_u64(32)
            .push_u64(32)
            .op(CODESIZE)
            .op(SUB)
            .push_u64(0)
            .op(CODECOPY)
            .push_u64(0)
            .op(MLOAD)
            .push_label("deploy")
            .op(JUMPI)
            .revert_with_reason(TESTER_REJECTED)
            .label("deploy")
            .push_u64(TESTER_INITIAL_VALUE)
            .push_u64(0)
            .op(SSTORE)
            .push_u16(runtime_len)
            .push_u16(runtime_offset)
            .push_u64(0)
            .op(CODECOPY)
            .push_u16(runtime_len)
            .push_u64(0)
            .op(RETURN);
        asm.assemble()
    };

    // Fixed-width pushes keep the length independent of the offset
    let init_len = u16::try_from(build(0)?.len())
        .map_err(|_| ChainError::State("Init code too large".into()))?;
    build(init_len)
}

fn tester_runtime() -> ChainResult<Vec<u8>> {
    let value_set = keccak256("ValueSet(uint256)");
    let mut asm = Assembler::new();

    // selector = calldata[0..32] / 2**224
    asm.push_word(U256::one() << 224)
        .push_u64(0)
        .op(CALLDATALOAD)
        .op(DIV);
    for (signature, label) in [("value()", "value"), ("set(uint256)", "set"), ("fail()", "fail")] {
        asm.op(DUP1)
            .push(&id(signature))
            .op(EQ)
            .push_label(label)
            .op(JUMPI);
    }
    asm.push_u64(0).op(DUP1).op(REVERT);

    asm.label("value")
        .push_u64(0)
        .op(SLOAD)
        .push_u64(0)
        .op(MSTORE)
        .push_u64(32)
        .push_u64(0)
        .op(RETURN);

    asm.label("set")
        .push_u64(4)
        .op(CALLDATALOAD)
        .op(DUP1)
        .push_u64(0)
        .op(SSTORE)
        .push_u64(0)
        .op(MSTORE)
        .push(&value_set)
        .push_u64(32)
        .push_u64(0)
        .op(LOG0 + 1)
        .op(STOP);

    asm.label("fail").revert_with_reason(TESTER_FAILED);

    asm.assemble()
}
