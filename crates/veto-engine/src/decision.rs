//! The decision taxonomy shared by every validator and the aggregated
//! engine result (specification §4.11, §1).

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Kind of decision a validator (or the engine as a whole) can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Permit the tool call unchanged.
    Allow,
    /// Block the tool call.
    Deny,
    /// Defer to a human approval step before proceeding.
    RequireApproval,
    /// Reserved extension point: proceed with `final_arguments` instead
    /// of the original arguments. No shipped validator currently emits
    /// this; it short-circuits like `Deny`.
    Modify,
}

impl DecisionKind {
    /// Whether this kind short-circuits validator execution (specification
    /// §4.11: "short-circuit on first deny or modify").
    #[must_use]
    pub const fn short_circuits(self) -> bool {
        matches!(self, Self::Deny | Self::Modify | Self::RequireApproval)
    }
}

/// A single decision: the kind, an optional human-readable reason, and
/// optional structured metadata (e.g. the matching rule id).
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// The decision kind.
    pub kind: DecisionKind,
    /// Human-readable reason. Every deny should carry one.
    pub reason: Option<String>,
    /// Structured metadata, e.g. `{"rule_id": "..."}`.
    pub metadata: Option<JsonValue>,
    /// Reserved for `Modify`: the rewritten arguments to proceed with.
    pub final_arguments: Option<JsonValue>,
}

impl Decision {
    /// A plain `allow`, no reason.
    #[must_use]
    pub fn allow() -> Self {
        Self { kind: DecisionKind::Allow, reason: None, metadata: None, final_arguments: None }
    }

    /// A `deny` with `reason`.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { kind: DecisionKind::Deny, reason: Some(reason.into()), metadata: None, final_arguments: None }
    }

    /// A `deny` with `reason` and structured `metadata`.
    #[must_use]
    pub fn deny_with_metadata(reason: impl Into<String>, metadata: JsonValue) -> Self {
        Self { kind: DecisionKind::Deny, reason: Some(reason.into()), metadata: Some(metadata), final_arguments: None }
    }

    /// A `require_approval` with `reason`.
    #[must_use]
    pub fn require_approval(reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::RequireApproval,
            reason: Some(reason.into()),
            metadata: None,
            final_arguments: None,
        }
    }
}
