//! Type checker: walks an expression AST against an optional argument
//! schema, recording `error` for operations that cannot possibly succeed
//! and `warning` for likely mistakes (specification §4.4).

use std::collections::HashMap;

use veto_core::value::path::Segment;

use crate::ast::{BinOp, Expr, Literal};

/// Inferred or declared type of an expression or schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// Numeric.
    Number,
    /// String.
    String,
    /// Boolean.
    Boolean,
    /// Array.
    Array,
    /// Object/map.
    Object,
    /// Not statically known (e.g. an identifier absent from the schema).
    Unknown,
}

/// Severity of a type-checker finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Likely mistake; does not fail the rule.
    Warning,
    /// Illegal operation; fails the rule.
    Error,
}

/// A single type-checker finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Warning or error.
    pub severity: Severity,
    /// Human-readable explanation.
    pub message: String,
}

/// An optional declared shape for the tool's arguments, keyed by the
/// argument's top-level name.
pub type Schema = HashMap<String, Type>;

const BUILTIN_RETURN_TYPES: &[(&str, Type)] = &[
    ("len", Type::Number),
    ("lower", Type::String),
    ("upper", Type::String),
    ("abs", Type::Number),
    ("min", Type::Number),
    ("max", Type::Number),
    ("starts_with", Type::Boolean),
    ("ends_with", Type::Boolean),
];

fn builtin_return_type(name: &str) -> Option<Type> {
    BUILTIN_RETURN_TYPES.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
}

/// Type-check `expr` against `schema` (absent schema means every path is
/// [`Type::Unknown`]). Returns the inferred type of the whole expression
/// plus every issue recorded while walking it.
#[must_use]
pub fn type_check(expr: &Expr, schema: Option<&Schema>) -> (Type, Vec<Issue>) {
    let mut issues = Vec::new();
    let ty = walk(expr, schema, &mut issues);
    (ty, issues)
}

fn walk(expr: &Expr, schema: Option<&Schema>, issues: &mut Vec<Issue>) -> Type {
    match expr {
        Expr::Literal(lit) => match lit {
            Literal::Number(_) => Type::Number,
            Literal::String(_) => Type::String,
            Literal::Bool(_) => Type::Boolean,
            Literal::Null => Type::Unknown,
        },
        Expr::Path(path) => {
            let Some(Segment::Field(head)) = path.segments().first() else {
                return Type::Unknown;
            };
            let base_ty = schema.and_then(|s| s.get(head)).copied();
            let has_index_or_wildcard =
                path.segments().iter().any(|s| matches!(s, Segment::Index(_) | Segment::Wildcard));
            if has_index_or_wildcard {
                match base_ty {
                    Some(Type::Array) | None | Some(Type::Unknown) => {}
                    Some(other) => {
                        issues.push(Issue {
                            severity: Severity::Error,
                            message: format!(
                                "indexing into non-array argument '{head}' (declared as {other:?})"
                            ),
                        });
                    }
                }
            }
            match base_ty {
                Some(t) => t,
                None => {
                    issues.push(Issue {
                        severity: Severity::Warning,
                        message: format!("argument '{head}' is not declared in the tool schema"),
                    });
                    Type::Unknown
                }
            }
        }
        Expr::Call(name, args) => {
            for arg in args {
                walk(arg, schema, issues);
            }
            match builtin_return_type(name) {
                Some(t) => t,
                None => {
                    issues.push(Issue {
                        severity: Severity::Error,
                        message: format!("call to unknown function '{name}'"),
                    });
                    Type::Unknown
                }
            }
        }
        Expr::Unary(_, inner) => {
            walk(inner, schema, issues);
            Type::Boolean
        }
        Expr::Binary(op, lhs, rhs) => {
            let lt = walk(lhs, schema, issues);
            let rt = walk(rhs, schema, issues);
            match op {
                BinOp::And | BinOp::Or => Type::Boolean,
                BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Gt
                | BinOp::Le
                | BinOp::Ge
                | BinOp::In
                | BinOp::NotIn
                | BinOp::Contains
                | BinOp::Matches => {
                    check_binop_operands(*op, lt, rt, issues);
                    Type::Boolean
                }
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => Type::Number,
            }
        }
    }
}

fn check_binop_operands(op: BinOp, lt: Type, rt: Type, issues: &mut Vec<Issue>) {
    let unknown = |t: Type| matches!(t, Type::Unknown);
    match op {
        BinOp::In | BinOp::NotIn => {
            if !unknown(rt) && rt != Type::Array {
                issues.push(Issue {
                    severity: Severity::Error,
                    message: format!("{op:?} requires an array right-hand side, found {rt:?}"),
                });
            }
        }
        BinOp::Contains => {
            if !unknown(lt) && lt != Type::String && lt != Type::Array {
                issues.push(Issue {
                    severity: Severity::Error,
                    message: format!(
                        "contains requires a string or array left-hand side, found {lt:?}"
                    ),
                });
            }
        }
        BinOp::Matches => {
            if !unknown(lt) && lt != Type::String {
                issues.push(Issue {
                    severity: Severity::Warning,
                    message: format!("matches is typically applied to a string, found {lt:?}"),
                });
            }
            if !unknown(rt) && rt != Type::String {
                issues.push(Issue {
                    severity: Severity::Error,
                    message: format!("matches requires a string pattern, found {rt:?}"),
                });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn comparisons_yield_boolean() {
        let expr = parse("amount > 1000").unwrap();
        let (ty, issues) = type_check(&expr, None);
        assert_eq!(ty, Type::Boolean);
        assert!(issues.iter().any(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn known_schema_suppresses_warning() {
        let mut schema = Schema::new();
        schema.insert("amount".into(), Type::Number);
        let expr = parse("amount > 1000").unwrap();
        let (_, issues) = type_check(&expr, Some(&schema));
        assert!(issues.is_empty());
    }

    #[test]
    fn unknown_function_is_an_error() {
        let expr = parse("nonexistent(1)").unwrap();
        let (_, issues) = type_check(&expr, None);
        assert!(issues.iter().any(|i| i.severity == Severity::Error));
    }

    #[test]
    fn in_requires_array_rhs() {
        let mut schema = Schema::new();
        schema.insert("role".into(), Type::String);
        let expr = parse(r#"role in "not-an-array""#).unwrap();
        let (_, issues) = type_check(&expr, Some(&schema));
        assert!(issues.iter().any(|i| i.severity == Severity::Error));
    }

    #[test]
    fn indexing_non_array_is_an_error() {
        let mut schema = Schema::new();
        schema.insert("name".into(), Type::String);
        let expr = parse("name[0]").unwrap();
        let (_, issues) = type_check(&expr, Some(&schema));
        assert!(issues.iter().any(|i| i.severity == Severity::Error));
    }
}
