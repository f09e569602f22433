//! The `Validator` trait and its invocation context (specification §4.11).

use async_trait::async_trait;
use veto_core::value::Value;

use crate::decision::Decision;

/// What a validator is given to decide on.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// The tool being called.
    pub tool_name: String,
    /// The proposed arguments.
    pub arguments: Value,
}

/// A named, prioritized, optionally tool-scoped check run by the
/// [`crate::ValidationEngine`]. Implementations must be cheap to
/// construct; any blocking I/O should go through `veto-breaker`.
#[async_trait]
pub trait Validator: Send + Sync {
    /// A stable name, used in `validatorResults` and the explanation
    /// trail.
    fn name(&self) -> &str;

    /// Ascending sort key; lower runs first.
    fn priority(&self) -> i32;

    /// If `Some`, this validator only runs for tool calls whose name is
    /// in the list.
    fn tool_filter(&self) -> Option<&[String]> {
        None
    }

    /// Whether this validator applies to `tool_name`.
    fn applies_to(&self, tool_name: &str) -> bool {
        match self.tool_filter() {
            Some(tools) => tools.iter().any(|t| t == tool_name),
            None => true,
        }
    }

    /// Decides on `ctx`. Implementations should not panic; any error
    /// condition should be surfaced as `Ok(Decision::deny(..))` where
    /// possible, though the engine also catches panics at the call site.
    async fn validate(&self, ctx: &ValidationContext) -> Decision;
}
