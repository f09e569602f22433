//! The validation engine itself (specification §4.11): orders validators,
//! runs them in priority order, short-circuits, and aggregates results.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::{info_span, warn, Instrument};
use veto_audit::{CheckResult, ExplanationEntry, ExplanationTrail, Verbosity};

use crate::decision::{Decision, DecisionKind};
use crate::validator::{ValidationContext, Validator};

/// Observer invoked for every validator's decision and the engine's
/// final aggregate. Mirrors the teacher's `PolicyObserver` hook.
pub trait EngineObserver: Send + Sync {
    /// Called once per validator that actually ran.
    fn on_validator_decision(&self, validator_name: &str, decision: &Decision);
    /// Called once with the engine's aggregated decision.
    fn on_final_decision(&self, decision: &Decision);
}

/// A no-op observer, the engine's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {
    fn on_validator_decision(&self, _validator_name: &str, _decision: &Decision) {}
    fn on_final_decision(&self, _decision: &Decision) {}
}

/// One validator's contribution to an [`EngineResult`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidatorResult {
    /// The validator's name.
    pub name: String,
    /// Its decision.
    pub decision: Decision,
    /// Wall-clock time spent in this validator, in milliseconds.
    pub duration_ms: u64,
}

/// The engine's aggregated output for one tool call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineResult {
    /// The decision that should actually be enforced.
    pub final_result: Decision,
    /// Every validator that ran, in execution order.
    pub validator_results: Vec<ValidatorResult>,
    /// Total wall-clock time across all validators, in milliseconds.
    pub total_duration_ms: u64,
}

impl EngineResult {
    /// Builds the explanation trail for C12's audit log: one entry per
    /// validator that ran, gated by `verbosity` and redacted per
    /// `redact_paths`.
    #[must_use]
    pub fn explain(&self, verbosity: Verbosity, redact_paths: &[String]) -> ExplanationTrail {
        let mut trail = ExplanationTrail::new();
        for validator_result in &self.validator_results {
            let decision = &validator_result.decision;
            let rule_id = decision
                .metadata
                .as_ref()
                .and_then(|m| m.get("rule_id"))
                .and_then(|v| v.as_str())
                .map(ToString::to_string);
            let path = veto_audit::redact_path(&validator_result.name, redact_paths);
            trail.record(
                verbosity,
                ExplanationEntry {
                    rule_id,
                    rule_name: None,
                    constraint: validator_result.name.clone(),
                    path,
                    expected: "allow".to_string(),
                    actual: format!("{:?}", decision.kind),
                    result: if decision.kind == DecisionKind::Allow { CheckResult::Pass } else { CheckResult::Fail },
                    message: decision.reason.clone().unwrap_or_default(),
                },
            );
        }
        trail
    }
}

/// Holds an ordered list of named, prioritized validators and runs them
/// against a tool-call context.
pub struct ValidationEngine {
    validators: Vec<Box<dyn Validator>>,
    default_decision: DecisionKind,
    observer: Arc<dyn EngineObserver>,
}

impl ValidationEngine {
    /// A new engine with `default_decision` (the decision returned when
    /// every matched validator allows, or none matched) and a no-op
    /// observer.
    #[must_use]
    pub fn new(default_decision: DecisionKind) -> Self {
        Self { validators: Vec::new(), default_decision, observer: Arc::new(NoopObserver) }
    }

    /// Installs an observer, replacing the default no-op.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Registers a validator. Order of registration does not matter;
    /// execution order is determined by ascending [`Validator::priority`].
    pub fn register(&mut self, validator: Box<dyn Validator>) {
        self.validators.push(validator);
    }

    /// Runs every validator whose `tool_filter` matches `ctx.tool_name`,
    /// in ascending priority order, short-circuiting on the first `deny`,
    /// `modify`, or `require_approval`. A validator that panics is
    /// captured as that validator's own `deny` result instead of
    /// unwinding through the engine.
    pub async fn validate(&self, ctx: &ValidationContext) -> EngineResult {
        let started = Instant::now();
        let mut ordered: Vec<&Box<dyn Validator>> = self.validators.iter().filter(|v| v.applies_to(&ctx.tool_name)).collect();
        ordered.sort_by_key(|v| v.priority());

        let mut results = Vec::with_capacity(ordered.len());
        let mut final_result = Decision { kind: self.default_decision, reason: None, metadata: None, final_arguments: None };

        for validator in ordered {
            let name = validator.name().to_string();
            let validator_started = Instant::now();
            let decision = AssertUnwindSafe(validator.validate(ctx))
                .catch_unwind()
                .instrument(info_span!("validator", name = %name))
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(&panic);
                    warn!(validator = %name, error = %message, "validator panicked");
                    Decision::deny(message)
                });
            let duration_ms = duration_ms(validator_started);

            self.observer.on_validator_decision(&name, &decision);
            let short_circuit = decision.kind.short_circuits();
            results.push(ValidatorResult { name, decision: decision.clone(), duration_ms });

            if short_circuit {
                final_result = decision;
                break;
            }
        }

        self.observer.on_final_decision(&final_result);
        EngineResult { final_result, validator_results: results, total_duration_ms: duration_ms(started) }
    }
}

fn duration_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "validator panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use veto_core::value::Value;

    struct FixedValidator {
        name: &'static str,
        priority: i32,
        decision: Decision,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Validator for FixedValidator {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        async fn validate(&self, _ctx: &ValidationContext) -> Decision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decision.clone()
        }
    }

    fn ctx() -> ValidationContext {
        ValidationContext { tool_name: "read_file".to_string(), arguments: Value::Null }
    }

    #[tokio::test]
    async fn all_allow_yields_default_decision() {
        let mut engine = ValidationEngine::new(DecisionKind::Allow);
        engine.register(Box::new(FixedValidator {
            name: "a",
            priority: 0,
            decision: Decision::allow(),
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        let result = engine.validate(&ctx()).await;
        assert_eq!(result.final_result.kind, DecisionKind::Allow);
        assert_eq!(result.validator_results.len(), 1);
    }

    #[tokio::test]
    async fn deny_short_circuits_remaining_validators() {
        let mut engine = ValidationEngine::new(DecisionKind::Allow);
        let second_calls = Arc::new(AtomicUsize::new(0));
        engine.register(Box::new(FixedValidator {
            name: "first",
            priority: 0,
            decision: Decision::deny("blocked by policy"),
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        engine.register(Box::new(FixedValidator {
            name: "second",
            priority: 10,
            decision: Decision::allow(),
            calls: Arc::clone(&second_calls),
        }));
        let result = engine.validate(&ctx()).await;
        assert_eq!(result.final_result.kind, DecisionKind::Deny);
        assert_eq!(result.validator_results.len(), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explain_records_failing_validator_under_simple_verbosity() {
        let mut engine = ValidationEngine::new(DecisionKind::Allow);
        engine.register(Box::new(FixedValidator {
            name: "policy",
            priority: 0,
            decision: Decision::deny("blocked by rule"),
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        let result = engine.validate(&ctx()).await;
        let trail = result.explain(Verbosity::Simple, &[]);
        assert_eq!(trail.entries.len(), 1);
        assert_eq!(trail.entries[0].result, CheckResult::Fail);
        assert_eq!(trail.entries[0].message, "blocked by rule");
    }

    #[tokio::test]
    async fn priority_order_is_ascending() {
        let mut engine = ValidationEngine::new(DecisionKind::Allow);
        engine.register(Box::new(FixedValidator {
            name: "low-priority-runs-second",
            priority: 10,
            decision: Decision::allow(),
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        engine.register(Box::new(FixedValidator {
            name: "high-priority-runs-first",
            priority: 0,
            decision: Decision::allow(),
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        let result = engine.validate(&ctx()).await;
        assert_eq!(result.validator_results[0].name, "high-priority-runs-first");
        assert_eq!(result.validator_results[1].name, "low-priority-runs-second");
    }

    #[tokio::test]
    async fn tool_filter_excludes_non_matching_validators() {
        let mut engine = ValidationEngine::new(DecisionKind::Allow);
        struct ScopedValidator;
        #[async_trait]
        impl Validator for ScopedValidator {
            fn name(&self) -> &str {
                "scoped"
            }
            fn priority(&self) -> i32 {
                0
            }
            fn tool_filter(&self) -> Option<&[String]> {
                Some(&[])
            }
            async fn validate(&self, _ctx: &ValidationContext) -> Decision {
                Decision::deny("should never run")
            }
        }
        engine.register(Box::new(ScopedValidator));
        let result = engine.validate(&ctx()).await;
        assert_eq!(result.final_result.kind, DecisionKind::Allow);
        assert!(result.validator_results.is_empty());
    }

    #[tokio::test]
    async fn panicking_validator_becomes_a_deny_result() {
        let mut engine = ValidationEngine::new(DecisionKind::Allow);
        struct PanickingValidator;
        #[async_trait]
        impl Validator for PanickingValidator {
            fn name(&self) -> &str {
                "panics"
            }
            fn priority(&self) -> i32 {
                0
            }
            async fn validate(&self, _ctx: &ValidationContext) -> Decision {
                panic!("boom");
            }
        }
        engine.register(Box::new(PanickingValidator));
        let result = engine.validate(&ctx()).await;
        assert_eq!(result.final_result.kind, DecisionKind::Deny);
        assert_eq!(result.validator_results.len(), 1);
    }
}
