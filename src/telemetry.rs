//! Tracing configuration.
//!
//! Stdout logging always; OpenTelemetry OTLP export only when an endpoint
//! is configured. The OTLP collector is an external collaborator; nothing
//! here is load-bearing for execution correctness.

use anyhow::Context;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configure tracing with stdout logging and optional OTLP export.
pub fn configure_tracing(service_name: &str, json_logs: bool) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,pycell=debug".into()),
    );

    let registry = tracing_subscriber::registry().with(env_filter);

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", service_name.to_string()),
            ])))
            .install_batch(runtime::Tokio)
            .context("Failed to install OTLP pipeline")?;

        let tracer = tracer.tracer(service_name.to_string());

        if json_logs {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .init();
        }
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing initialized");
    } else if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}
