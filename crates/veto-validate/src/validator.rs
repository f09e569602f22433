//! The deterministic constraint validator (specification §4.7).

use regex::Regex;
use veto_core::value::path::{resolve, ArgPath};
use veto_core::value::Value;

use crate::model::ArgumentConstraint;

/// Outcome of a single argument's constraint check, for the explanation
/// trace (C12).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintReport {
    /// The constraint's argument path.
    pub argument: String,
    /// `true` if the argument satisfied the constraint.
    pub passed: bool,
    /// Human-readable detail: the failure reason, or a pass confirmation.
    pub message: String,
}

/// The aggregate decision across every constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Every enabled constraint passed (or was skipped).
    Allow,
    /// At least one enabled constraint failed.
    Deny,
}

/// Result of validating one arguments value against a list of constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// The aggregate decision.
    pub decision: Decision,
    /// The first failing constraint's reason, if any.
    pub reason: Option<String>,
    /// Per-argument pass/fail reports, in constraint order, up to and
    /// including the first failure.
    pub reports: Vec<ConstraintReport>,
}

/// Validate `arguments` against `constraints`, in order. The first
/// disabled constraint is skipped; for an enabled constraint, a missing
/// value denies when `required` and otherwise skips the remaining checks.
/// Among present values, checks run in this order: numeric bounds, string
/// length, string regex, string enum, array item count. The first failure
/// stops validation and produces `deny`.
#[must_use]
pub fn validate(constraints: &[ArgumentConstraint], arguments: &Value) -> ValidationOutcome {
    let mut reports = Vec::new();

    for constraint in constraints {
        if !constraint.enabled {
            continue;
        }

        let value = resolve_argument(arguments, &constraint.argument);
        let Some(value) = value else {
            if constraint.required {
                let message = format!(
                    "Required argument '{}' is missing",
                    ArgPath::strip_arguments_prefix(&constraint.argument)
                );
                reports.push(ConstraintReport {
                    argument: constraint.argument.clone(),
                    passed: false,
                    message: message.clone(),
                });
                return ValidationOutcome { decision: Decision::Deny, reason: Some(message), reports };
            }
            continue;
        };

        match check_value(constraint, value) {
            Some(failure) => {
                reports.push(ConstraintReport {
                    argument: constraint.argument.clone(),
                    passed: false,
                    message: failure.clone(),
                });
                return ValidationOutcome { decision: Decision::Deny, reason: Some(failure), reports };
            }
            None => {
                reports.push(ConstraintReport {
                    argument: constraint.argument.clone(),
                    passed: true,
                    message: "satisfied all configured checks".to_string(),
                });
            }
        }
    }

    ValidationOutcome { decision: Decision::Allow, reason: None, reports }
}

fn resolve_argument<'a>(arguments: &'a Value, path: &str) -> Option<&'a Value> {
    let parsed = ArgPath::parse(path).ok()?;
    resolve(arguments, &parsed)
}

fn check_value(constraint: &ArgumentConstraint, value: &Value) -> Option<String> {
    if constraint.not_null && value.is_null() {
        return Some(format!("argument '{}' must not be null", constraint.argument));
    }

    if constraint.minimum.is_some()
        || constraint.maximum.is_some()
        || constraint.exclusive_minimum.is_some()
        || constraint.exclusive_maximum.is_some()
    {
        let n = value.to_num();
        if let Some(min) = constraint.minimum {
            if n < min {
                return Some(format!("value {n} must be >= {min}"));
            }
        }
        if let Some(max) = constraint.maximum {
            if n > max {
                return Some(format!("value {n} must be <= {max}"));
            }
        }
        if let Some(min) = constraint.exclusive_minimum {
            if n <= min {
                return Some(format!("value {n} must be > {min}"));
            }
        }
        if let Some(max) = constraint.exclusive_maximum {
            if n >= max {
                return Some(format!("value {n} must be < {max}"));
            }
        }
    }

    if constraint.min_length.is_some() || constraint.max_length.is_some() {
        match value.as_str() {
            Some(s) => {
                let len = s.chars().count();
                if let Some(min) = constraint.min_length {
                    if len < min {
                        return Some(format!(
                            "argument '{}' length {len} is below the minimum of {min}",
                            constraint.argument
                        ));
                    }
                }
                if let Some(max) = constraint.max_length {
                    if len > max {
                        return Some(format!(
                            "argument '{}' length {len} exceeds the maximum of {max}",
                            constraint.argument
                        ));
                    }
                }
            }
            None => {
                return Some(format!("argument '{}' must be a string", constraint.argument));
            }
        }
    }

    if let Some(pattern) = &constraint.regex {
        match value.as_str() {
            Some(s) => {
                if let Err(unsafe_pattern) = veto_regex::screen(pattern) {
                    return Some(format!(
                        "argument '{}' regex constraint is unsafe: {unsafe_pattern}",
                        constraint.argument
                    ));
                }
                match Regex::new(pattern) {
                    Ok(re) if re.is_match(s) => {}
                    Ok(_) => {
                        return Some(format!(
                            "argument '{}' does not match the required pattern",
                            constraint.argument
                        ));
                    }
                    Err(e) => {
                        return Some(format!(
                            "argument '{}' regex constraint is invalid: {e}",
                            constraint.argument
                        ));
                    }
                }
            }
            None => return Some(format!("argument '{}' must be a string", constraint.argument)),
        }
    }

    if let Some(allowed) = &constraint.enum_values {
        let value_json: serde_json::Value = value.clone().into();
        if !allowed.contains(&value_json) {
            return Some(format!(
                "argument '{}' value is not one of the allowed values",
                constraint.argument
            ));
        }
    }

    if constraint.min_items.is_some() || constraint.max_items.is_some() {
        match value.as_array() {
            Some(items) => {
                let len = items.len();
                if let Some(min) = constraint.min_items {
                    if len < min {
                        return Some(format!(
                            "argument '{}' has {len} item(s), below the minimum of {min}",
                            constraint.argument
                        ));
                    }
                }
                if let Some(max) = constraint.max_items {
                    if len > max {
                        return Some(format!(
                            "argument '{}' has {len} item(s), above the maximum of {max}",
                            constraint.argument
                        ));
                    }
                }
            }
            None => return Some(format!("argument '{}' must be an array", constraint.argument)),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn args(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn denies_missing_required_argument() {
        let mut c = ArgumentConstraint::new("arguments.count");
        c.required = true;
        let outcome = validate(&[c], &Value::Object(BTreeMap::new()));
        assert_eq!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.reason.unwrap(), "Required argument 'count' is missing");
    }

    /// End-to-end scenario 4: `{argument:"count", minimum:1, maximum:10,
    /// required:true}` against `{count:0}`.
    #[test]
    fn below_minimum_reason_matches_literal_wording() {
        let mut c = ArgumentConstraint::new("arguments.count");
        c.required = true;
        c.minimum = Some(1.0);
        c.maximum = Some(10.0);
        let outcome = validate(&[c], &args(vec![("count", Value::Number(0.0))]));
        assert_eq!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.reason.unwrap(), "value 0 must be >= 1");
    }

    #[test]
    fn enforces_exclusive_bounds() {
        let mut c = ArgumentConstraint::new("arguments.amount");
        c.exclusive_minimum = Some(0.0);
        let outcome = validate(&[c], &args(vec![("amount", Value::Number(0.0))]));
        assert_eq!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.reason.unwrap(), "value 0 must be > 0");
    }

    #[test]
    fn skips_missing_optional_argument() {
        let mut c = ArgumentConstraint::new("arguments.amount");
        c.minimum = Some(10.0);
        let outcome = validate(&[c], &Value::Object(BTreeMap::new()));
        assert_eq!(outcome.decision, Decision::Allow);
    }

    #[test]
    fn enforces_numeric_bounds() {
        let mut c = ArgumentConstraint::new("arguments.amount");
        c.minimum = Some(0.0);
        c.maximum = Some(1000.0);
        let outcome = validate(&[c], &args(vec![("amount", Value::Number(5000.0))]));
        assert_eq!(outcome.decision, Decision::Deny);
        assert_eq!(outcome.reason.unwrap(), "value 5000 must be <= 1000");
    }

    #[test]
    fn enforces_string_length_before_regex() {
        let mut c = ArgumentConstraint::new("arguments.name");
        c.min_length = Some(5);
        c.regex = Some("^[a-z]+$".into());
        let outcome = validate(&[c], &args(vec![("name", Value::String("ab".into()))]));
        assert_eq!(outcome.decision, Decision::Deny);
        assert!(outcome.reason.unwrap().contains("below the minimum"));
    }

    #[test]
    fn rejects_unsafe_regex_constraint() {
        let mut c = ArgumentConstraint::new("arguments.name");
        c.regex = Some("(a+)+".into());
        let outcome = validate(&[c], &args(vec![("name", Value::String("aaa".into()))]));
        assert_eq!(outcome.decision, Decision::Deny);
        assert!(outcome.reason.unwrap().contains("unsafe"));
    }

    #[test]
    fn enforces_enum_membership() {
        let mut c = ArgumentConstraint::new("arguments.role");
        c.enum_values = Some(vec![serde_json::json!("admin"), serde_json::json!("owner")]);
        let outcome = validate(&[c], &args(vec![("role", Value::String("guest".into()))]));
        assert_eq!(outcome.decision, Decision::Deny);
    }

    #[test]
    fn enforces_array_item_count() {
        let mut c = ArgumentConstraint::new("arguments.tags");
        c.max_items = Some(2);
        let value = args(vec![(
            "tags",
            Value::Array(vec![
                Value::String("a".into()),
                Value::String("b".into()),
                Value::String("c".into()),
            ]),
        )]);
        let outcome = validate(&[c], &value);
        assert_eq!(outcome.decision, Decision::Deny);
        assert!(outcome.reason.unwrap().contains("maximum"));
    }

    #[test]
    fn disabled_constraint_is_never_checked() {
        let mut c = ArgumentConstraint::new("arguments.amount");
        c.enabled = false;
        c.required = true;
        let outcome = validate(&[c], &Value::Object(BTreeMap::new()));
        assert_eq!(outcome.decision, Decision::Allow);
    }

    #[test]
    fn all_passing_constraints_allow() {
        let mut c = ArgumentConstraint::new("arguments.amount");
        c.minimum = Some(0.0);
        c.maximum = Some(100.0);
        let outcome = validate(&[c], &args(vec![("amount", Value::Number(50.0))]));
        assert_eq!(outcome.decision, Decision::Allow);
        assert!(outcome.reports[0].passed);
    }
}
