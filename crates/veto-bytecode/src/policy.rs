//! `CompiledPolicy` and its constant pool (specification §3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

/// One entry in a compiled policy's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// UTF-8 string.
    String(String),
    /// Double-precision number.
    Number(f64),
    /// Boolean.
    Boolean(bool),
    /// `null`.
    Null,
    /// Homogeneous or heterogeneous array, for `in`/`not_in` right-hand
    /// sides.
    Array(Vec<Constant>),
    /// Object literal (only reachable through an `equals`/`not_equals`
    /// condition compared against a JSON object).
    Object(BTreeMap<String, Constant>),
    /// A regex pattern, screened at load time (C1) and compiled lazily at
    /// evaluation time by `CMP_MATCH`.
    Regex {
        /// Pattern source.
        source: String,
        /// Reserved for future flags (e.g. case-insensitivity); always
        /// empty today.
        flags: String,
    },
}

/// Bytecode + constant pool produced from a list of rules, ready for
/// repeated evaluation by the stack VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPolicy {
    /// Format version; always `1`.
    pub version: u32,
    /// Flat instruction stream, rules concatenated in input order.
    pub instructions: Vec<Instruction>,
    /// Deduplicated literal pool.
    pub constant_pool: Vec<Constant>,
    /// Deduplicated dotted argument paths (the `arguments.` prefix
    /// stripped), indexed by `LoadArg`.
    pub arg_keys: Vec<String>,
    /// Ids of every rule compiled into this policy, in compile order.
    pub rule_ids: Vec<String>,
    /// Milliseconds since the UNIX epoch when this policy was compiled.
    pub compiled_at: u64,
}

impl CompiledPolicy {
    /// Current format version.
    pub const FORMAT_VERSION: u32 = 1;
}
