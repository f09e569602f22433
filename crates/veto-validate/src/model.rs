//! `ArgumentConstraint`: a per-argument shape policy (specification §3).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A deterministic shape policy applied to one argument path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentConstraint {
    /// Dotted argument path, conventionally prefixed with `arguments.`.
    pub argument: String,
    /// Whether this constraint is enforced at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The argument must be present.
    #[serde(default)]
    pub required: bool,
    /// The argument, if present, must not be JSON `null`.
    #[serde(default)]
    pub not_null: bool,
    /// Inclusive numeric lower bound (`>=`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive numeric upper bound (`<=`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Exclusive numeric lower bound (`>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    /// Exclusive numeric upper bound (`<`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    /// Minimum string length, in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length, in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// A ReDoS-screened pattern the string must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// The value must equal one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<JsonValue>>,
    /// Minimum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    /// Maximum array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

const fn default_true() -> bool {
    true
}

impl ArgumentConstraint {
    /// A constraint with only `argument` set and every other field at its
    /// default (enabled, nothing required, no bounds).
    #[must_use]
    pub fn new(argument: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            enabled: true,
            required: false,
            not_null: false,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            min_length: None,
            max_length: None,
            regex: None,
            enum_values: None,
            min_items: None,
            max_items: None,
        }
    }
}
