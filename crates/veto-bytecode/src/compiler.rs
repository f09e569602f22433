//! Rule-list → bytecode compiler (specification §4.5).

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use thiserror::Error;

use veto_core::error::{Classify, ErrorKind};
use veto_core::value::path::ArgPath;
use veto_rules::{Condition, Operator, Rule};

use crate::instruction::{BuiltinFn, Instruction};
use crate::policy::{CompiledPolicy, Constant};

/// A failure while compiling a rule list into bytecode.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// An expression condition's source failed to parse.
    #[error("rule '{rule_id}': {source}")]
    Expression {
        /// Id of the rule whose expression failed.
        rule_id: String,
        /// Underlying parse error.
        #[source]
        source: veto_expr::ParseError,
    },
    /// An expression condition called an unknown function.
    #[error("rule '{rule_id}': unknown function '{function}'")]
    UnknownFunction {
        /// Id of the offending rule.
        rule_id: String,
        /// Function name.
        function: String,
    },
    /// An expression condition called a built-in with the wrong arity.
    #[error("rule '{rule_id}': '{function}' expects {expected} argument(s), found {found}")]
    Arity {
        /// Id of the offending rule.
        rule_id: String,
        /// Function name.
        function: String,
        /// Expected argument count.
        expected: usize,
        /// Argument count found at the call site.
        found: usize,
    },
    /// A legacy condition triple's field path could not be parsed.
    #[error("rule '{rule_id}': invalid field path '{field}': {message}")]
    InvalidPath {
        /// Id of the offending rule.
        rule_id: String,
        /// Raw field path text.
        field: String,
        /// Parse failure detail.
        message: String,
    },
    /// A legacy condition triple's value did not match what its operator
    /// requires. The loader (C3) should already reject this at load time;
    /// this variant exists so the compiler never panics on malformed
    /// input it receives directly (e.g. from a test or another caller).
    #[error("rule '{rule_id}': operator {operator:?} requires a {expected} value")]
    TypeMismatch {
        /// Id of the offending rule.
        rule_id: String,
        /// Operator whose value was the wrong type.
        operator: Operator,
        /// Expected JSON type, as a human-readable label.
        expected: &'static str,
    },
    /// An expression condition's type checker reported a fatal issue
    /// (an operation that cannot possibly succeed, e.g. indexing into a
    /// non-array argument or a structurally wrong operand type).
    #[error("rule '{rule_id}': {message}")]
    TypeCheck {
        /// Id of the offending rule.
        rule_id: String,
        /// The type checker's error message.
        message: String,
    },
}

impl Classify for CompileError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Expression { .. } => ErrorKind::ExpressionParse,
            Self::UnknownFunction { .. } | Self::Arity { .. } => ErrorKind::TypeCheck,
            Self::InvalidPath { .. } | Self::TypeMismatch { .. } => ErrorKind::Schema,
            Self::TypeCheck { .. } => ErrorKind::TypeCheck,
        }
    }
}

struct Compiler {
    arg_keys: Vec<String>,
    arg_index: HashMap<String, u32>,
    constants: Vec<Constant>,
    instructions: Vec<Instruction>,
    rule_ids: Vec<String>,
}

impl Compiler {
    fn new() -> Self {
        Self {
            arg_keys: Vec::new(),
            arg_index: HashMap::new(),
            constants: Vec::new(),
            instructions: Vec::new(),
            rule_ids: Vec::new(),
        }
    }

    fn arg_key(&mut self, canonical: String) -> u32 {
        if let Some(idx) = self.arg_index.get(&canonical) {
            return *idx;
        }
        let idx = self.arg_keys.len() as u32;
        self.arg_index.insert(canonical.clone(), idx);
        self.arg_keys.push(canonical);
        idx
    }

    fn constant(&mut self, value: Constant) -> u32 {
        if let Some(idx) = self.constants.iter().position(|c| c == &value) {
            return idx as u32;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(value);
        idx
    }

    fn load_path(&mut self, rule_id: &str, field: &str) -> Result<(), CompileError> {
        let path = ArgPath::parse(field).map_err(|e| CompileError::InvalidPath {
            rule_id: rule_id.to_string(),
            field: field.to_string(),
            message: e.to_string(),
        })?;
        let idx = self.arg_key(path.canonical());
        self.instructions.push(Instruction::LoadArg(idx));
        Ok(())
    }

    fn compile_triple(
        &mut self,
        rule_id: &str,
        field: &str,
        operator: Operator,
        value: &JsonValue,
    ) -> Result<(), CompileError> {
        self.load_path(rule_id, field)?;
        match operator {
            Operator::Matches => {
                let source = value
                    .as_str()
                    .ok_or_else(|| CompileError::TypeMismatch {
                        rule_id: rule_id.to_string(),
                        operator,
                        expected: "string",
                    })?
                    .to_string();
                let idx = self.constant(Constant::Regex { source, flags: String::new() });
                self.instructions.push(Instruction::LoadConst(idx));
                self.instructions.push(Instruction::CmpMatch);
            }
            Operator::In | Operator::NotIn => {
                let items = value
                    .as_array()
                    .ok_or_else(|| CompileError::TypeMismatch {
                        rule_id: rule_id.to_string(),
                        operator,
                        expected: "array",
                    })?
                    .iter()
                    .map(json_to_constant)
                    .collect();
                let idx = self.constant(Constant::Array(items));
                self.instructions.push(Instruction::LoadConst(idx));
                self.instructions.push(if matches!(operator, Operator::In) {
                    Instruction::CmpIn
                } else {
                    Instruction::CmpNotIn
                });
            }
            _ => {
                let idx = self.constant(json_to_constant(value));
                self.instructions.push(Instruction::LoadConst(idx));
                self.instructions.push(match operator {
                    Operator::Equals => Instruction::CmpEq,
                    Operator::NotEquals => Instruction::CmpNeq,
                    Operator::Contains => Instruction::CmpContains,
                    Operator::NotContains => {
                        self.instructions.push(Instruction::CmpContains);
                        Instruction::Not
                    }
                    Operator::StartsWith => Instruction::CmpStartsWith,
                    Operator::EndsWith => Instruction::CmpEndsWith,
                    Operator::GreaterThan => Instruction::CmpGt,
                    Operator::LessThan => Instruction::CmpLt,
                    Operator::Matches | Operator::In | Operator::NotIn => unreachable!(),
                });
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, rule_id: &str, expr: &veto_expr::Expr) -> Result<(), CompileError> {
        use veto_expr::{BinOp, Expr, Literal, UnOp};
        match expr {
            Expr::Literal(lit) => {
                let c = match lit {
                    Literal::Number(n) => Constant::Number(*n),
                    Literal::String(s) => Constant::String(s.clone()),
                    Literal::Bool(b) => Constant::Boolean(*b),
                    Literal::Null => Constant::Null,
                };
                let idx = self.constant(c);
                self.instructions.push(Instruction::LoadConst(idx));
            }
            Expr::Path(path) => {
                let idx = self.arg_key(path.canonical());
                self.instructions.push(Instruction::LoadArg(idx));
            }
            Expr::Call(name, args) => {
                let builtin = BuiltinFn::by_name(name).ok_or_else(|| CompileError::UnknownFunction {
                    rule_id: rule_id.to_string(),
                    function: name.clone(),
                })?;
                if args.len() != builtin.arity() {
                    return Err(CompileError::Arity {
                        rule_id: rule_id.to_string(),
                        function: name.clone(),
                        expected: builtin.arity(),
                        found: args.len(),
                    });
                }
                for arg in args {
                    self.compile_expr(rule_id, arg)?;
                }
                self.instructions.push(Instruction::Call(builtin));
            }
            Expr::Unary(op, inner) => {
                self.compile_expr(rule_id, inner)?;
                self.instructions.push(match op {
                    UnOp::Not => Instruction::Not,
                    UnOp::Neg => Instruction::Neg,
                });
            }
            Expr::Binary(op, lhs, rhs) => {
                self.compile_expr(rule_id, lhs)?;
                self.compile_expr(rule_id, rhs)?;
                self.instructions.push(match op {
                    BinOp::Or => Instruction::Or,
                    BinOp::And => Instruction::And,
                    BinOp::Eq => Instruction::CmpEq,
                    BinOp::Ne => Instruction::CmpNeq,
                    BinOp::Lt => Instruction::CmpLt,
                    BinOp::Gt => Instruction::CmpGt,
                    BinOp::Le => Instruction::CmpLte,
                    BinOp::Ge => Instruction::CmpGte,
                    BinOp::In => Instruction::CmpIn,
                    BinOp::NotIn => Instruction::CmpNotIn,
                    BinOp::Contains => Instruction::CmpContains,
                    BinOp::Matches => Instruction::CmpMatch,
                    BinOp::Add => Instruction::Add,
                    BinOp::Sub => Instruction::Sub,
                    BinOp::Mul => Instruction::Mul,
                    BinOp::Div => Instruction::Div,
                });
            }
        }
        Ok(())
    }

    fn compile_condition(&mut self, rule_id: &str, cond: &Condition) -> Result<(), CompileError> {
        match cond {
            Condition::Triple { field, operator, value } => {
                self.compile_triple(rule_id, field, *operator, value)
            }
            Condition::Expression { expression } => {
                let expr = veto_expr::parse(expression).map_err(|source| CompileError::Expression {
                    rule_id: rule_id.to_string(),
                    source,
                })?;
                // No per-tool argument schema is modeled yet (see DESIGN.md),
                // so this only catches issues visible from the expression's
                // own literals and operators — still enough to reject e.g.
                // `"x" in 5` before it reaches the VM.
                let (_, issues) = veto_expr::type_check(&expr, None);
                if let Some(fatal) = issues.into_iter().find(|i| i.severity == veto_expr::Severity::Error) {
                    return Err(CompileError::TypeCheck { rule_id: rule_id.to_string(), message: fatal.message });
                }
                self.compile_expr(rule_id, &expr)
            }
        }
    }

    fn compile_group(&mut self, rule_id: &str, group: &[Condition]) -> Result<(), CompileError> {
        let Some((first, rest)) = group.split_first() else {
            // An empty AND-group is vacuously true. The loader rejects
            // these at validation time; guard here too since the compiler
            // is a public entry point callers can invoke directly.
            let idx = self.constant(Constant::Boolean(true));
            self.instructions.push(Instruction::LoadConst(idx));
            return Ok(());
        };
        self.compile_condition(rule_id, first)?;
        for cond in rest {
            self.compile_condition(rule_id, cond)?;
            self.instructions.push(Instruction::And);
        }
        Ok(())
    }

    fn compile_rule(&mut self, rule: &Rule) -> Result<(), CompileError> {
        let reason_text = rule.description.clone().unwrap_or_else(|| rule.name.clone());
        let reason_idx = self.constant(Constant::String(reason_text));
        let rule_id_idx = self.constant(Constant::String(rule.id.clone()));
        self.instructions.push(Instruction::SetReason(reason_idx));
        self.instructions.push(Instruction::SetRuleId(rule_id_idx));

        if rule.has_any_condition() {
            let groups = rule.condition_groups_view();
            self.compile_group(&rule.id, groups[0])?;
            for group in &groups[1..] {
                self.compile_group(&rule.id, group)?;
                self.instructions.push(Instruction::Or);
            }
        } else {
            let idx = self.constant(Constant::Boolean(true));
            self.instructions.push(Instruction::LoadConst(idx));
        }

        let operand = u8::from(rule.action.emits_deny());
        self.instructions.push(Instruction::EmitDecision(operand));
        self.rule_ids.push(rule.id.clone());
        Ok(())
    }
}

fn json_to_constant(value: &JsonValue) -> Constant {
    match value {
        JsonValue::Null => Constant::Null,
        JsonValue::Bool(b) => Constant::Boolean(*b),
        JsonValue::Number(n) => Constant::Number(n.as_f64().unwrap_or(0.0)),
        JsonValue::String(s) => Constant::String(s.clone()),
        JsonValue::Array(items) => Constant::Array(items.iter().map(json_to_constant).collect()),
        JsonValue::Object(map) => {
            Constant::Object(map.iter().map(|(k, v)| (k.clone(), json_to_constant(v))).collect())
        }
    }
}

/// Compile `rules` (already normalized by C3) into one [`CompiledPolicy`],
/// in rule order. Disabled rules are skipped. Constants and argument keys
/// are deduplicated across the whole list.
pub fn compile(rules: &[Rule]) -> Result<CompiledPolicy, CompileError> {
    let mut compiler = Compiler::new();
    for rule in rules.iter().filter(|r| r.enabled) {
        compiler.compile_rule(rule)?;
    }
    compiler.instructions.push(Instruction::Halt);
    Ok(CompiledPolicy {
        version: CompiledPolicy::FORMAT_VERSION,
        instructions: compiler.instructions,
        constant_pool: compiler.constants,
        arg_keys: compiler.arg_keys,
        rule_ids: compiler.rule_ids,
        compiled_at: veto_core::ids::now_ms(),
    })
}
