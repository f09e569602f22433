//! The bounded stack VM that evaluates a [`CompiledPolicy`] against one
//! tool call's arguments (specification §4.6).

use regex::Regex;
use thiserror::Error;

use veto_core::error::{Classify, ErrorKind};
use veto_core::ids::monotonic_ns;
use veto_core::value::path::{resolve, ArgPath};
use veto_core::value::{values_equal, Value};

use crate::instruction::{BuiltinFn, Instruction};
use crate::policy::{CompiledPolicy, Constant};

/// Maximum operand stack depth before a fatal VM error.
pub const MAX_STACK_DEPTH: usize = 256;
/// Maximum instructions executed in one evaluation before a fatal VM error.
pub const MAX_INSTRUCTIONS: u32 = 10_000;

/// The VM's final decision for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No deny-emitting rule matched before `HALT`.
    Allow,
    /// A deny-emitting rule matched; evaluation stopped early.
    Deny,
}

/// The result of evaluating a compiled policy against one arguments value.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    /// The aggregate decision.
    pub decision: Decision,
    /// Id of the rule that produced a `Deny`, if any.
    pub rule_id: Option<String>,
    /// The denying rule's reason text, if any.
    pub reason: Option<String>,
    /// Every rule id whose condition evaluated truthy, in evaluation
    /// order (including rules whose action did not itself deny).
    pub matched_rule_ids: Vec<String>,
    /// Wall-clock-independent evaluation latency.
    pub latency_ns: u128,
}

/// A fatal VM error. Per specification §4.6 this never degrades silently
/// to `allow`; it surfaces to the engine, which fails closed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    /// The operand stack exceeded [`MAX_STACK_DEPTH`].
    #[error("operand stack exceeded {max} entries (reached {depth})")]
    StackOverflow {
        /// Depth that would have been reached.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },
    /// More than [`MAX_INSTRUCTIONS`] were executed.
    #[error("instruction budget of {max} exceeded")]
    InstructionLimitExceeded {
        /// Configured maximum.
        max: u32,
    },
    /// An instruction popped an operand from an empty stack.
    #[error("operand stack underflow")]
    StackUnderflow,
    /// `LOAD_ARG` referenced an index outside the policy's `argKeys` table.
    #[error("reference to undefined argument key index {0}")]
    UnknownArgKey(u32),
    /// `LOAD_CONST`/`SET_REASON`/`SET_RULE_ID` referenced an index outside
    /// the policy's constant pool.
    #[error("reference to undefined constant pool index {0}")]
    UnknownConstant(u32),
    /// An `argKeys` entry was not a well-formed argument path.
    #[error("unresolvable argument path '{0}'")]
    InvalidArgPath(String),
    /// `CMP_MATCH`'s pattern operand was not a valid regex.
    #[error("invalid regex pattern '{0}': {1}")]
    InvalidRegex(String, String),
}

impl Classify for VmError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::VmLimit
    }
}

/// Evaluate `policy` against `arguments`, which must be a
/// [`Value::Object`] (or any value resolvable by the policy's argument
/// paths). Pure: the only observable non-determinism is the reported
/// latency, which never feeds back into the decision.
pub fn evaluate(policy: &CompiledPolicy, arguments: &Value) -> Result<EvalOutcome, VmError> {
    let start = monotonic_ns();
    let paths: Vec<ArgPath> = policy
        .arg_keys
        .iter()
        .map(|k| ArgPath::parse(k).map_err(|e| VmError::InvalidArgPath(e.to_string())))
        .collect::<Result<_, _>>()?;

    let mut stack: Vec<Value> = Vec::new();
    let mut pc = 0usize;
    let mut instructions_run = 0u32;
    let mut pending_reason: Option<String> = None;
    let mut pending_rule_id: Option<String> = None;
    let mut matched_rule_ids: Vec<String> = Vec::new();

    while pc < policy.instructions.len() {
        instructions_run += 1;
        if instructions_run > MAX_INSTRUCTIONS {
            return Err(VmError::InstructionLimitExceeded { max: MAX_INSTRUCTIONS });
        }
        let instr = policy.instructions[pc];
        pc += 1;

        match instr {
            Instruction::LoadArg(idx) => {
                let path = paths.get(idx as usize).ok_or(VmError::UnknownArgKey(idx))?;
                let value = resolve(arguments, path).cloned().unwrap_or(Value::Null);
                push(&mut stack, value)?;
            }
            Instruction::LoadConst(idx) => {
                let constant =
                    policy.constant_pool.get(idx as usize).ok_or(VmError::UnknownConstant(idx))?;
                push(&mut stack, constant_to_value(constant))?;
            }
            Instruction::CmpEq => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(values_equal(&a, &b)))?;
            }
            Instruction::CmpNeq => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(!values_equal(&a, &b)))?;
            }
            Instruction::CmpLt => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(a.to_num() < b.to_num()))?;
            }
            Instruction::CmpGt => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(a.to_num() > b.to_num()))?;
            }
            Instruction::CmpLte => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(a.to_num() <= b.to_num()))?;
            }
            Instruction::CmpGte => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(a.to_num() >= b.to_num()))?;
            }
            Instruction::CmpMatch => {
                let pattern = pop1(&mut stack)?;
                let subject = pop1(&mut stack)?;
                let pattern_src = display_value(&pattern);
                let re = Regex::new(&pattern_src)
                    .map_err(|e| VmError::InvalidRegex(pattern_src.clone(), e.to_string()))?;
                push(&mut stack, Value::Bool(re.is_match(&display_value(&subject))))?;
            }
            Instruction::CmpContains => {
                let (haystack, needle) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(value_contains(&haystack, &needle)))?;
            }
            Instruction::CmpStartsWith => {
                let (subject, prefix) = pop2(&mut stack)?;
                push(
                    &mut stack,
                    Value::Bool(subject.as_str().unwrap_or_default().starts_with(
                        prefix.as_str().unwrap_or_default(),
                    )),
                )?;
            }
            Instruction::CmpEndsWith => {
                let (subject, suffix) = pop2(&mut stack)?;
                push(
                    &mut stack,
                    Value::Bool(
                        subject.as_str().unwrap_or_default().ends_with(suffix.as_str().unwrap_or_default()),
                    ),
                )?;
            }
            Instruction::CmpIn => {
                let (value, array) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(value_contains(&array, &value)))?;
            }
            Instruction::CmpNotIn => {
                let (value, array) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(!value_contains(&array, &value)))?;
            }
            Instruction::And => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(a.truthy() && b.truthy()))?;
            }
            Instruction::Or => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Bool(a.truthy() || b.truthy()))?;
            }
            Instruction::Not => {
                let a = pop1(&mut stack)?;
                push(&mut stack, Value::Bool(!a.truthy()))?;
            }
            Instruction::Add => {
                let (a, b) = pop2(&mut stack)?;
                let result = if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
                    Value::String(format!("{a}{b}"))
                } else {
                    Value::Number(a.to_num() + b.to_num())
                };
                push(&mut stack, result)?;
            }
            Instruction::Sub => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Number(a.to_num() - b.to_num()))?;
            }
            Instruction::Mul => {
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Number(a.to_num() * b.to_num()))?;
            }
            Instruction::Div => {
                // Total: IEEE 754 division by zero yields +/-inf or NaN
                // rather than trapping. AND/OR have no branch opcode to
                // short-circuit on (see DESIGN.md), so a poisoned operand
                // must still produce *some* value instead of aborting the
                // whole evaluation out from under an otherwise-deciding
                // sibling operand.
                let (a, b) = pop2(&mut stack)?;
                push(&mut stack, Value::Number(a.to_num() / b.to_num()))?;
            }
            Instruction::Neg => {
                let a = pop1(&mut stack)?;
                push(&mut stack, Value::Number(-a.to_num()))?;
            }
            Instruction::Call(builtin) => {
                let result = call_builtin(builtin, &mut stack)?;
                push(&mut stack, result)?;
            }
            Instruction::SetReason(idx) => {
                let constant =
                    policy.constant_pool.get(idx as usize).ok_or(VmError::UnknownConstant(idx))?;
                pending_reason = Some(display_constant(constant));
            }
            Instruction::SetRuleId(idx) => {
                let constant =
                    policy.constant_pool.get(idx as usize).ok_or(VmError::UnknownConstant(idx))?;
                pending_rule_id = Some(display_constant(constant));
            }
            Instruction::EmitDecision(operand) => {
                let top = pop1(&mut stack)?;
                if top.truthy() {
                    if let Some(id) = &pending_rule_id {
                        matched_rule_ids.push(id.clone());
                    }
                    if operand == 1 {
                        return Ok(EvalOutcome {
                            decision: Decision::Deny,
                            rule_id: pending_rule_id,
                            reason: pending_reason,
                            matched_rule_ids,
                            latency_ns: monotonic_ns() - start,
                        });
                    }
                }
            }
            Instruction::Halt => break,
        }
    }

    Ok(EvalOutcome {
        decision: Decision::Allow,
        rule_id: None,
        reason: None,
        matched_rule_ids,
        latency_ns: monotonic_ns() - start,
    })
}

fn push(stack: &mut Vec<Value>, value: Value) -> Result<(), VmError> {
    if stack.len() >= MAX_STACK_DEPTH {
        return Err(VmError::StackOverflow { depth: stack.len() + 1, max: MAX_STACK_DEPTH });
    }
    stack.push(value);
    Ok(())
}

fn pop1(stack: &mut Vec<Value>) -> Result<Value, VmError> {
    stack.pop().ok_or(VmError::StackUnderflow)
}

/// Pops the top two operands, returning `(second-from-top, top)` i.e.
/// `(a, b)` in push order for a binary op compiled as `push(a); push(b)`.
fn pop2(stack: &mut Vec<Value>) -> Result<(Value, Value), VmError> {
    let b = pop1(stack)?;
    let a = pop1(stack)?;
    Ok((a, b))
}

fn value_contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

fn display_value(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

fn constant_to_value(constant: &Constant) -> Value {
    match constant {
        Constant::String(s) => Value::String(s.clone()),
        Constant::Number(n) => Value::Number(*n),
        Constant::Boolean(b) => Value::Bool(*b),
        Constant::Null => Value::Null,
        Constant::Array(items) => Value::Array(items.iter().map(constant_to_value).collect()),
        Constant::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), constant_to_value(v))).collect())
        }
        Constant::Regex { source, .. } => Value::String(source.clone()),
    }
}

fn display_constant(constant: &Constant) -> String {
    match constant {
        Constant::String(s) => s.clone(),
        other => constant_to_value(other).to_string(),
    }
}

fn call_builtin(builtin: BuiltinFn, stack: &mut Vec<Value>) -> Result<Value, VmError> {
    Ok(match builtin {
        BuiltinFn::Len => {
            let a = pop1(stack)?;
            let len = match a {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                _ => 0,
            };
            Value::Number(len as f64)
        }
        BuiltinFn::Lower => {
            let a = pop1(stack)?;
            Value::String(a.as_str().unwrap_or_default().to_lowercase())
        }
        BuiltinFn::Upper => {
            let a = pop1(stack)?;
            Value::String(a.as_str().unwrap_or_default().to_uppercase())
        }
        BuiltinFn::Abs => {
            let a = pop1(stack)?;
            Value::Number(a.to_num().abs())
        }
        BuiltinFn::Min => {
            let (a, b) = pop2(stack)?;
            Value::Number(a.to_num().min(b.to_num()))
        }
        BuiltinFn::Max => {
            let (a, b) = pop2(stack)?;
            Value::Number(a.to_num().max(b.to_num()))
        }
        BuiltinFn::StartsWith => {
            let (subject, prefix) = pop2(stack)?;
            Value::Bool(subject.as_str().unwrap_or_default().starts_with(prefix.as_str().unwrap_or_default()))
        }
        BuiltinFn::EndsWith => {
            let (subject, suffix) = pop2(stack)?;
            Value::Bool(subject.as_str().unwrap_or_default().ends_with(suffix.as_str().unwrap_or_default()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use veto_rules::{Action, Condition, Operator, Rule, Severity};

    fn args(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn etc_rule() -> Rule {
        Rule {
            id: "block-etc".into(),
            name: "Block /etc reads".into(),
            description: Some("path under /etc is off limits".into()),
            enabled: true,
            severity: Severity::High,
            action: Action::Block,
            tools: vec!["read_file".into()],
            conditions: vec![Condition::Triple {
                field: "arguments.path".into(),
                operator: Operator::StartsWith,
                value: serde_json::json!("/etc"),
            }],
            condition_groups: vec![],
        }
    }

    #[test]
    fn denies_when_triple_condition_holds() {
        let policy = crate::compiler::compile(&[etc_rule()]).unwrap();
        let arguments = args(vec![("path", Value::String("/etc/passwd".into()))]);
        let outcome = evaluate(&policy, &arguments).unwrap();
        assert_eq!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.rule_id.as_deref(), Some("block-etc"));
        assert_eq!(outcome.reason.as_deref(), Some("path under /etc is off limits"));
    }

    #[test]
    fn allows_when_triple_condition_fails() {
        let policy = crate::compiler::compile(&[etc_rule()]).unwrap();
        let arguments = args(vec![("path", Value::String("/home/user/file".into()))]);
        let outcome = evaluate(&policy, &arguments).unwrap();
        assert_eq!(outcome.decision, Decision::Allow);
    }

    #[test]
    fn evaluates_expression_condition() {
        let mut rule = etc_rule();
        rule.conditions =
            vec![Condition::Expression { expression: "amount > 1000 && currency == \"USD\"".into() }];
        let policy = crate::compiler::compile(&[rule]).unwrap();
        let arguments =
            args(vec![("amount", Value::Number(5000.0)), ("currency", Value::String("USD".into()))]);
        let outcome = evaluate(&policy, &arguments).unwrap();
        assert_eq!(outcome.decision, Decision::Deny);
    }

    #[test]
    fn missing_argument_resolves_to_null_and_is_falsy() {
        let policy = crate::compiler::compile(&[etc_rule()]).unwrap();
        let outcome = evaluate(&policy, &Value::Object(BTreeMap::new())).unwrap();
        assert_eq!(outcome.decision, Decision::Allow);
    }

    #[test]
    fn division_by_zero_is_total_not_a_vm_error() {
        let mut rule = etc_rule();
        rule.conditions = vec![Condition::Expression { expression: "(amount / 0) > 1".into() }];
        let policy = crate::compiler::compile(&[rule]).unwrap();
        let arguments = args(vec![("amount", Value::Number(10.0))]);
        // 10 / 0 == +inf, and +inf > 1 is true, so the rule still matches.
        let outcome = evaluate(&policy, &arguments).unwrap();
        assert_eq!(outcome.decision, Decision::Deny);
    }

    /// A poisoned right-hand operand (division by zero) must not abort
    /// evaluation out from under a left-hand operand that already
    /// determines the `&&` result, even though the VM evaluates both
    /// operands eagerly and has no branch opcode to truly short-circuit.
    #[test]
    fn eager_and_tolerates_poisoned_rhs_when_lhs_decides() {
        let mut rule = etc_rule();
        rule.conditions =
            vec![Condition::Expression { expression: "amount > 5 && (1 / divisor) > 0".into() }];
        let policy = crate::compiler::compile(&[rule]).unwrap();
        let arguments =
            args(vec![("amount", Value::Number(1.0)), ("divisor", Value::Number(0.0))]);
        let outcome = evaluate(&policy, &arguments).unwrap();
        assert_eq!(outcome.decision, Decision::Allow);
    }

    #[test]
    fn instruction_limit_is_enforced() {
        let mut instructions = vec![Instruction::LoadConst(0)];
        instructions.extend(std::iter::repeat(Instruction::Not).take(MAX_INSTRUCTIONS as usize + 1));
        instructions.push(Instruction::Halt);
        let policy = CompiledPolicy {
            version: CompiledPolicy::FORMAT_VERSION,
            instructions,
            constant_pool: vec![Constant::Boolean(true)],
            arg_keys: vec![],
            rule_ids: vec![],
            compiled_at: 0,
        };
        let result = evaluate(&policy, &Value::Object(BTreeMap::new()));
        assert!(matches!(result, Err(VmError::InstructionLimitExceeded { .. })));
    }

    #[test]
    fn stack_overflow_is_enforced() {
        let instructions =
            std::iter::repeat(Instruction::LoadConst(0)).take(MAX_STACK_DEPTH + 1).collect();
        let policy = CompiledPolicy {
            version: CompiledPolicy::FORMAT_VERSION,
            instructions,
            constant_pool: vec![Constant::Number(1.0)],
            arg_keys: vec![],
            rule_ids: vec![],
            compiled_at: 0,
        };
        let result = evaluate(&policy, &Value::Object(BTreeMap::new()));
        assert!(matches!(result, Err(VmError::StackOverflow { .. })));
    }
}
