//! Rule, `RuleSet`, condition, and enum types — the declarative rule
//! language's data model (specification §3).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Rule severity. Ordered so that `Critical > High > Medium > Low > Info`
/// via the derived [`Ord`] impl, matching declaration order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lowest severity.
    Info,
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
    /// Highest severity.
    Critical,
}

/// Action a matching rule takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Deny the tool call.
    Block,
    /// Advisory deny: compiled as a deny-equivalent emission, but tagged
    /// for callers who want to treat it as non-blocking (see `DESIGN.md`).
    Warn,
    /// Record a match without affecting the decision.
    Log,
    /// Explicitly permit the tool call.
    Allow,
}

impl Action {
    /// Whether this action, if its rule's conditions hold, should cause
    /// `EMIT_DECISION` to be compiled with the "deny" operand.
    #[must_use]
    pub const fn emits_deny(self) -> bool {
        matches!(self, Self::Block | Self::Warn)
    }
}

/// Comparison operator for a legacy condition triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// String/array containment.
    Contains,
    /// Negated containment.
    NotContains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Regex match (value must be a ReDoS-screened pattern string).
    Matches,
    /// Numeric `>`.
    GreaterThan,
    /// Numeric `<`.
    LessThan,
    /// Array membership.
    In,
    /// Negated array membership.
    NotIn,
}

/// A single predicate: either a legacy `(field, operator, value)` triple or
/// an inline boolean expression in the expression DSL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// `{ field, operator, value }`.
    Triple {
        /// Dotted argument path, conventionally prefixed with `arguments.`.
        field: String,
        /// Comparison operator.
        operator: Operator,
        /// Right-hand-side literal.
        value: JsonValue,
    },
    /// `{ expression: "<dsl source>" }`.
    Expression {
        /// Expression-language source text.
        expression: String,
    },
}

impl Condition {
    /// The sort key used by normalization: the field path for a triple, or
    /// the expression source itself (expressions have no field path).
    #[must_use]
    pub fn sort_key(&self) -> &str {
        match self {
            Self::Triple { field, .. } => field,
            Self::Expression { expression } => expression,
        }
    }
}

/// A named, scoped policy fragment evaluated against a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique kebab-case slug.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional longer-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the rule is active; disabled rules are skipped at compile
    /// time.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Severity, used for precedence ordering and normalization.
    pub severity: Severity,
    /// Action to take when the rule's conditions hold.
    pub action: Action,
    /// Tool names this rule applies to (lowercased, sorted after
    /// normalization). Empty means "all tools".
    #[serde(default)]
    pub tools: Vec<String>,
    /// AND-group of conditions. Mutually inclusive with `condition_groups`
    /// (a rule needs at least one of the two to be non-empty).
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// OR-of-AND-groups. When both `conditions` and `condition_groups` are
    /// present, `conditions` is treated as one more AND-group in the OR.
    #[serde(default)]
    pub condition_groups: Vec<Vec<Condition>>,
}

const fn default_true() -> bool {
    true
}

impl Rule {
    /// All AND-groups this rule matches against, normalizing the
    /// `conditions`/`condition_groups` split into a single OR-of-AND-groups
    /// view for the bytecode compiler.
    #[must_use]
    pub fn condition_groups_view(&self) -> Vec<&[Condition]> {
        let mut groups: Vec<&[Condition]> = Vec::new();
        if !self.conditions.is_empty() {
            groups.push(&self.conditions);
        }
        for g in &self.condition_groups {
            groups.push(g);
        }
        groups
    }

    /// Whether this rule has at least one condition or condition group, per
    /// the invariant in specification §3.
    #[must_use]
    pub fn has_any_condition(&self) -> bool {
        !self.conditions.is_empty() || self.condition_groups.iter().any(|g| !g.is_empty())
    }
}

/// `{ version, name, description?, rules[] }` — the top-level rule
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Schema version of the document (e.g. `"1"`).
    pub version: String,
    /// Rule set name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The rules themselves.
    pub rules: Vec<Rule>,
}
