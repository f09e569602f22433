//! Structured JSON logging, plus an optional OTel metrics hookup for
//! engine decisions (specification's ambient observability stack).
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "otel")]
pub mod policy_observer;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The OTel exporter pipeline failed to install.
    #[error("otel setup failed: {0}")]
    Otel(String),
}

/// Initializes structured JSON logging with an env filter. Set `RUST_LOG`,
/// e.g. `"info,veto_engine=debug"`.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Initializes the OpenTelemetry tracer (behind the `otel` feature). Does
/// not install a tracing-subscriber layer; callers that want OTel spans in
/// their trace output still need `init_json_logging` or their own layer.
#[cfg(feature = "otel")]
pub fn init_otel(service_name: &str) -> Result<(), TelemetryError> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace as sdktrace;
    use opentelemetry_sdk::{runtime, Resource};

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.to_owned())]);
    let _tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().http())
        .with_trace_config(sdktrace::config().with_resource(resource))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Otel(e.to_string()))?;
    Ok(())
}
