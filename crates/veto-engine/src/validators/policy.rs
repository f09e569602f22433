//! A [`Validator`] that evaluates a tool's compiled bytecode policy,
//! consulting the cache before falling back to compiling from a
//! caller-supplied rule source.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use veto_bytecode::{self, CompiledPolicy};
use veto_cache::PolicyCache;
use veto_rules::RuleSet;

use crate::decision::Decision;
use crate::validator::{ValidationContext, Validator};

/// Resolves the [`RuleSet`] governing one tool, used on a cache miss.
/// Implementations typically wrap an in-memory map populated at load
/// time by `veto-rules`, refreshed in the background by `veto-sync`.
pub trait RuleSource: Send + Sync {
    /// Returns the rule set for `tool_name`, if one is registered.
    fn rule_set_for(&self, tool_name: &str) -> Option<Arc<RuleSet>>;
}

/// Evaluates a tool's compiled policy against the call's arguments.
pub struct PolicyValidator {
    name: String,
    priority: i32,
    cache: Arc<PolicyCache>,
    rules: Arc<dyn RuleSource>,
}

impl PolicyValidator {
    /// A new policy validator at the given `priority`, backed by `cache`
    /// and falling back to `rules` on a miss.
    #[must_use]
    pub fn new(priority: i32, cache: Arc<PolicyCache>, rules: Arc<dyn RuleSource>) -> Self {
        Self { name: "policy".to_string(), priority, cache, rules }
    }

    fn compiled_policy(&self, tool_name: &str) -> Option<Arc<CompiledPolicy>> {
        if let Some(policy) = self.cache.get(tool_name) {
            return Some(policy);
        }
        let rule_set = self.rules.rule_set_for(tool_name)?;
        let compiled = veto_bytecode::compile(&rule_set.rules).ok()?;
        let compiled = Arc::new(compiled);
        self.cache.set(tool_name, Arc::clone(&compiled));
        Some(compiled)
    }
}

#[async_trait]
impl Validator for PolicyValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn validate(&self, ctx: &ValidationContext) -> Decision {
        let Some(policy) = self.compiled_policy(&ctx.tool_name) else {
            // No rules registered for this tool and no last-known-good
            // fallback: nothing to enforce, so this validator abstains.
            return match self.cache.last_known_good(&ctx.tool_name) {
                Some(policy) => evaluate(&policy, ctx),
                None => Decision::allow(),
            };
        };
        evaluate(&policy, ctx)
    }
}

fn evaluate(policy: &CompiledPolicy, ctx: &ValidationContext) -> Decision {
    match veto_bytecode::evaluate(policy, &ctx.arguments) {
        Ok(outcome) => match outcome.decision {
            veto_bytecode::Decision::Allow => Decision::allow(),
            veto_bytecode::Decision::Deny => Decision::deny_with_metadata(
                outcome.reason.unwrap_or_else(|| "denied by policy".to_string()),
                json!({ "rule_id": outcome.rule_id, "matched_rule_ids": outcome.matched_rule_ids }),
            ),
        },
        Err(e) => Decision::deny(format!("VM limit: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionKind;
    use std::num::NonZeroUsize;
    use veto_core::value::Value;
    use veto_rules::{Action, Condition, Operator, Rule, Severity};

    struct StaticRuleSource(Option<Arc<RuleSet>>);

    impl RuleSource for StaticRuleSource {
        fn rule_set_for(&self, _tool_name: &str) -> Option<Arc<RuleSet>> {
            self.0.clone()
        }
    }

    fn deny_large_amount_rule_set() -> RuleSet {
        RuleSet {
            version: "1".to_string(),
            name: "amount limits".to_string(),
            description: None,
            rules: vec![Rule {
                id: "deny-large-amount".to_string(),
                name: "Deny large amount".to_string(),
                description: None,
                enabled: true,
                severity: Severity::High,
                action: Action::Block,
                tools: vec![],
                conditions: vec![Condition::Triple {
                    field: "arguments.amount".to_string(),
                    operator: Operator::GreaterThan,
                    value: serde_json::json!(1000),
                }],
                condition_groups: vec![],
            }],
        }
    }

    fn ctx(amount: f64) -> ValidationContext {
        ValidationContext {
            tool_name: "transfer_funds".to_string(),
            arguments: Value::Object(
                [("amount".to_string(), Value::Number(amount))].into_iter().collect(),
            ),
        }
    }

    #[tokio::test]
    async fn compiles_on_miss_and_populates_cache() {
        let cache = Arc::new(PolicyCache::new(NonZeroUsize::new(10).unwrap(), std::time::Duration::from_secs(60)));
        let rules = Arc::new(StaticRuleSource(Some(Arc::new(deny_large_amount_rule_set()))));
        let validator = PolicyValidator::new(0, Arc::clone(&cache), rules);

        let decision = validator.validate(&ctx(5000.0)).await;
        assert_eq!(decision.kind, DecisionKind::Deny);
        assert!(cache.has("transfer_funds"));
    }

    #[tokio::test]
    async fn allows_when_condition_does_not_match() {
        let cache = Arc::new(PolicyCache::new(NonZeroUsize::new(10).unwrap(), std::time::Duration::from_secs(60)));
        let rules = Arc::new(StaticRuleSource(Some(Arc::new(deny_large_amount_rule_set()))));
        let validator = PolicyValidator::new(0, cache, rules);

        let decision = validator.validate(&ctx(10.0)).await;
        assert_eq!(decision.kind, DecisionKind::Allow);
    }

    #[tokio::test]
    async fn falls_back_to_last_known_good_when_tool_unregistered() {
        let cache = Arc::new(PolicyCache::new(NonZeroUsize::new(10).unwrap(), std::time::Duration::from_secs(60)));
        let compiled = veto_bytecode::compile(&deny_large_amount_rule_set().rules).unwrap();
        cache.set("transfer_funds", Arc::new(compiled));
        cache.delete("transfer_funds");

        let rules = Arc::new(StaticRuleSource(None));
        let validator = PolicyValidator::new(0, cache, rules);
        let decision = validator.validate(&ctx(5000.0)).await;
        assert_eq!(decision.kind, DecisionKind::Deny);
    }

    #[tokio::test]
    async fn unregistered_tool_with_no_lkg_allows() {
        let cache = Arc::new(PolicyCache::new(NonZeroUsize::new(10).unwrap(), std::time::Duration::from_secs(60)));
        let rules = Arc::new(StaticRuleSource(None));
        let validator = PolicyValidator::new(0, cache, rules);
        let decision = validator.validate(&ctx(5000.0)).await;
        assert_eq!(decision.kind, DecisionKind::Allow);
    }
}
