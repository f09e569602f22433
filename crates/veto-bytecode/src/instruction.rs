//! The stack-VM instruction set (specification §4.6).
//!
//! `Add`, `Sub`, `Mul`, `Div`, `Neg`, and `Call` are not named in the
//! specification's opcode list, which only enumerates the opcodes needed
//! to compile legacy condition triples. They are added so the same VM can
//! also evaluate `Condition::Expression` trees, which the expression
//! grammar (§4.4) allows to contain arithmetic and built-in calls; see
//! `DESIGN.md`.

use serde::{Deserialize, Serialize};

/// A built-in function callable from an expression condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinFn {
    /// `len(x) -> number`
    Len,
    /// `lower(x) -> string`
    Lower,
    /// `upper(x) -> string`
    Upper,
    /// `abs(x) -> number`
    Abs,
    /// `min(a, b) -> number`
    Min,
    /// `max(a, b) -> number`
    Max,
    /// `starts_with(s, prefix) -> boolean`
    StartsWith,
    /// `ends_with(s, suffix) -> boolean`
    EndsWith,
}

impl BuiltinFn {
    /// Looks up a built-in by its expression-language name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Self::Len,
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            _ => return None,
        })
    }

    /// Fixed argument count the compiler must see at the call site.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Len | Self::Lower | Self::Upper | Self::Abs => 1,
            Self::Min | Self::Max | Self::StartsWith | Self::EndsWith => 2,
        }
    }
}

/// One instruction in a compiled policy's instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push the resolved value of `argKeys[idx]` from the arguments map.
    LoadArg(u32),
    /// Push `constantPool[idx]`.
    LoadConst(u32),
    /// Pop b, a; push `a == b`.
    CmpEq,
    /// Pop b, a; push `a != b`.
    CmpNeq,
    /// Pop b, a; push `a < b`.
    CmpLt,
    /// Pop b, a; push `a > b`.
    CmpGt,
    /// Pop b, a; push `a <= b`.
    CmpLte,
    /// Pop b, a; push `a >= b`.
    CmpGte,
    /// Pop pattern, subject; push whether subject matches pattern as regex.
    CmpMatch,
    /// Pop needle, haystack; push whether haystack contains needle.
    CmpContains,
    /// Pop prefix, subject; push whether subject starts with prefix.
    CmpStartsWith,
    /// Pop suffix, subject; push whether subject ends with suffix.
    CmpEndsWith,
    /// Pop array, value; push whether array contains value.
    CmpIn,
    /// Pop array, value; push whether array does not contain value.
    CmpNotIn,
    /// Pop b, a; push `truthy(a) && truthy(b)`.
    And,
    /// Pop b, a; push `truthy(a) || truthy(b)`.
    Or,
    /// Pop a; push `!truthy(a)`.
    Not,
    /// Pop b, a; push `a + b` (numeric add, or string concat if either
    /// operand is a string).
    Add,
    /// Pop b, a; push `a - b`.
    Sub,
    /// Pop b, a; push `a * b`.
    Mul,
    /// Pop b, a; push `a / b`. Total: division by zero yields IEEE 754
    /// +/-inf or NaN rather than a VM error, since there is no branch
    /// opcode to let `&&`/`||` truly short-circuit around it.
    Div,
    /// Pop a; push `-a`.
    Neg,
    /// Pop `f.arity()` arguments (in reverse push order) and push the
    /// result of the built-in call.
    Call(BuiltinFn),
    /// Record `constantPool[idx]` as the pending deny reason.
    SetReason(u32),
    /// Record `constantPool[idx]` as the pending rule id.
    SetRuleId(u32),
    /// Pop the top of stack; if truthy and `operand == 1`, halt evaluation
    /// immediately with `deny`. Operand `1` means `block`/`warn`, `0`
    /// means `allow`/`log`.
    EmitDecision(u8),
    /// Stop execution. If no deny was emitted, the policy allows.
    Halt,
}
