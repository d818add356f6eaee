//! Tracing setup: console logging plus optional OpenTelemetry export
//!
//! Every agent run opens an `agent_run` span (with `run_id`) and child spans
//! for `generator_call` and `code_execution`. When an OTLP endpoint is
//! configured those spans are exported as traces as well.
//!
//! # Architecture
//!
//! ```text
//! zerostick → fmt layer (stderr)
//!           → OTLP (gRPC) → OTel Collector → Tempo/Jaeger   (optional)
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,zerostick=debug";

/// Environment variable consulted for an OTLP endpoint
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Initialize the tracing subsystem
///
/// This sets up:
/// - Console logging (to stderr, so CLI event output on stdout stays clean)
/// - OpenTelemetry trace export, only when `otlp_endpoint` is `Some`
///
/// # Arguments
/// * `service_name` - Name for the service in traces
/// * `otlp_endpoint` - OTLP collector URL, e.g. "http://localhost:4317"
///
/// # Example
/// ```ignore
/// init_tracing("zerostick", None)?;
/// ```
pub fn init_tracing(
    service_name: &str,
    otlp_endpoint: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                    vec![
                        KeyValue::new("service.name", service_name.to_string()),
                        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ],
                )))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    tracing::info!(
        service = service_name,
        otlp = otlp_endpoint.unwrap_or("disabled"),
        "Tracing initialized"
    );

    Ok(())
}

/// OTLP endpoint from the standard OpenTelemetry environment variable
pub fn otlp_endpoint_from_env() -> Option<String> {
    std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Shutdown the tracing subsystem gracefully
///
/// Flushes any pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_enables_crate_debug() {
        assert!(DEFAULT_FILTER.contains("zerostick=debug"));
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
