//! A [`Validator`] that enforces per-argument shape constraints via
//! `veto-validate`, independent of the bytecode policy.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use veto_validate::{self, ArgumentConstraint};

use crate::decision::Decision;
use crate::validator::{ValidationContext, Validator};

/// Resolves the argument constraints registered for one tool.
pub trait ConstraintSource: Send + Sync {
    /// Returns the constraint list for `tool_name`, if any are
    /// registered.
    fn constraints_for(&self, tool_name: &str) -> Option<Arc<Vec<ArgumentConstraint>>>;
}

/// A [`ConstraintSource`] backed by a static in-memory map, useful for
/// tests and simple deployments that don't need hot reload.
#[derive(Debug, Clone, Default)]
pub struct StaticConstraintSource(pub HashMap<String, Arc<Vec<ArgumentConstraint>>>);

impl ConstraintSource for StaticConstraintSource {
    fn constraints_for(&self, tool_name: &str) -> Option<Arc<Vec<ArgumentConstraint>>> {
        self.0.get(tool_name).cloned()
    }
}

/// Runs the deterministic constraint checks (specification §4.7) for a
/// tool's registered argument shape policy.
pub struct ConstraintValidator {
    name: String,
    priority: i32,
    constraints: Arc<dyn ConstraintSource>,
}

impl ConstraintValidator {
    /// A new constraint validator at the given `priority`.
    #[must_use]
    pub fn new(priority: i32, constraints: Arc<dyn ConstraintSource>) -> Self {
        Self { name: "constraints".to_string(), priority, constraints }
    }
}

#[async_trait]
impl Validator for ConstraintValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn validate(&self, ctx: &ValidationContext) -> Decision {
        let Some(constraints) = self.constraints.constraints_for(&ctx.tool_name) else {
            return Decision::allow();
        };

        let outcome = veto_validate::validate(&constraints, &ctx.arguments);
        match outcome.decision {
            veto_validate::Decision::Allow => Decision::allow(),
            veto_validate::Decision::Deny => Decision::deny_with_metadata(
                outcome.reason.unwrap_or_else(|| "argument constraint failed".to_string()),
                json!({ "reports": outcome.reports.iter().map(|r| r.message.clone()).collect::<Vec<_>>() }),
            ),
        }
    }
}
