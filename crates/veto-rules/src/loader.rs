//! Rule document loading: parse, validate, screen `matches` patterns,
//! assign-id-uniqueness check, and normalize (specification §4.3).

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value as JsonValue;

use crate::error::LoaderError;
use crate::model::{Condition, Operator, Rule, RuleSet};
use crate::normalize::normalize;

/// Source encoding of a rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// YAML (`.yaml`/`.yml`).
    Yaml,
    /// JSON (`.json`).
    Json,
}

impl Encoding {
    /// Infer encoding from a file extension; defaults to YAML, matching
    /// the loader's historical default format.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Load, validate, and normalize a rule document from disk.
pub fn load_rule_set_path(path: impl AsRef<Path>) -> Result<RuleSet, LoaderError> {
    let path = path.as_ref();
    let file = path.display().to_string();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| LoaderError::Io { file: file.clone(), message: e.to_string() })?;
    load_rule_set_str(&contents, Encoding::from_path(path), &file)
}

/// Load, validate, and normalize a rule document from an in-memory string.
/// `label` is used only for error messages (e.g. a synthetic file name).
pub fn load_rule_set_str(
    contents: &str,
    encoding: Encoding,
    label: &str,
) -> Result<RuleSet, LoaderError> {
    let parsed: RuleSet = match encoding {
        Encoding::Yaml => serde_yaml::from_str(contents)
            .map_err(|e| LoaderError::Parse { file: label.to_string(), message: e.to_string() })?,
        Encoding::Json => serde_json::from_str(contents)
            .map_err(|e| LoaderError::Parse { file: label.to_string(), message: e.to_string() })?,
    };
    validate(&parsed, label)?;
    Ok(normalize(parsed))
}

fn validate(rule_set: &RuleSet, file: &str) -> Result<(), LoaderError> {
    let mut seen_ids = HashSet::new();
    for rule in &rule_set.rules {
        if rule.id.trim().is_empty() {
            return Err(LoaderError::schema(file, None, "id", "rule id must be non-empty"));
        }
        if !seen_ids.insert(rule.id.clone()) {
            return Err(LoaderError::schema(
                file,
                Some(rule.id.clone()),
                "id",
                format!("duplicate rule id '{}'", rule.id),
            ));
        }
        if rule.name.trim().is_empty() {
            return Err(LoaderError::schema(
                file,
                Some(rule.id.clone()),
                "name",
                "rule name must be non-empty",
            ));
        }
        if !rule.has_any_condition() {
            return Err(LoaderError::schema(
                file,
                Some(rule.id.clone()),
                "conditions",
                "rule must have at least one condition or condition group",
            ));
        }
        for group in rule.condition_groups_view() {
            if group.is_empty() {
                return Err(LoaderError::schema(
                    file,
                    Some(rule.id.clone()),
                    "condition_groups",
                    "condition group must contain at least one condition",
                ));
            }
            for condition in group {
                validate_condition(condition, &rule.id, file)?;
            }
        }
    }
    Ok(())
}

fn validate_condition(condition: &Condition, rule_id: &str, file: &str) -> Result<(), LoaderError> {
    let Condition::Triple { field, operator, value } = condition else {
        return Ok(());
    };
    match operator {
        Operator::In | Operator::NotIn => {
            if !matches!(value, JsonValue::Array(_)) {
                return Err(LoaderError::schema(
                    file,
                    Some(rule_id.to_string()),
                    field.clone(),
                    format!("operator {operator:?} requires an array value"),
                ));
            }
        }
        Operator::GreaterThan | Operator::LessThan => {
            if !matches!(value, JsonValue::Number(_)) {
                return Err(LoaderError::schema(
                    file,
                    Some(rule_id.to_string()),
                    field.clone(),
                    format!("operator {operator:?} requires a numeric value"),
                ));
            }
        }
        Operator::Contains | Operator::NotContains | Operator::StartsWith | Operator::EndsWith => {
            if !matches!(value, JsonValue::String(_) | JsonValue::Array(_)) {
                return Err(LoaderError::schema(
                    file,
                    Some(rule_id.to_string()),
                    field.clone(),
                    format!("operator {operator:?} requires a string or array value"),
                ));
            }
        }
        Operator::Matches => {
            let JsonValue::String(pattern) = value else {
                return Err(LoaderError::schema(
                    file,
                    Some(rule_id.to_string()),
                    field.clone(),
                    "operator matches requires a string pattern",
                ));
            };
            veto_regex::screen(pattern).map_err(|source| LoaderError::RegexUnsafe {
                file: file.to_string(),
                rule_id: rule_id.to_string(),
                field: field.clone(),
                source,
            })?;
        }
        Operator::Equals | Operator::NotEquals => {}
    }
    Ok(())
}
