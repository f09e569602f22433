//! An [`veto_engine::EngineObserver`] that records decision counts via
//! OpenTelemetry metrics.
#![allow(clippy::module_name_repetitions)]

use once_cell::sync::OnceCell;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

use veto_engine::{Decision, DecisionKind, EngineObserver};

struct Instruments {
    counter: Counter<u64>,
}

static INSTR: OnceCell<Instruments> = OnceCell::new();

fn ensure_instruments() -> &'static Instruments {
    INSTR.get_or_init(|| {
        // Uses the global meter provider, which may be a no-op if OTLP
        // hasn't been initialized.
        let meter: Meter = global::meter("veto.engine");
        let counter = meter
            .u64_counter("veto.decision.count")
            .with_description("Validation engine decision counter")
            .init();
        Instruments { counter }
    })
}

fn kind_str(kind: DecisionKind) -> &'static str {
    match kind {
        DecisionKind::Allow => "allow",
        DecisionKind::Deny => "deny",
        DecisionKind::RequireApproval => "require_approval",
        DecisionKind::Modify => "modify",
    }
}

fn record(phase: &str, decision: &Decision) {
    let inst = ensure_instruments();
    let attrs = [
        KeyValue::new("phase", phase.to_string()),
        KeyValue::new("kind", kind_str(decision.kind)),
    ];
    inst.counter.add(1, &attrs);
}

/// OTel-backed observer for engine decisions: one counter increment per
/// validator decision, plus one for the engine's final aggregate.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtelEngineObserver;

impl EngineObserver for OtelEngineObserver {
    fn on_validator_decision(&self, validator_name: &str, decision: &Decision) {
        record(validator_name, decision);
    }

    fn on_final_decision(&self, decision: &Decision) {
        record("final", decision);
    }
}

/// Returns an observer instance, ensuring the metrics instruments are
/// initialized. Prefer constructing a fresh value over holding a
/// `'static` reference.
#[must_use]
pub fn global_observer() -> OtelEngineObserver {
    let _ = ensure_instruments();
    OtelEngineObserver
}
