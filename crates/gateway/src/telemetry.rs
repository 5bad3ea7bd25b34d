//! OpenTelemetry initialization and configuration.
//!
//! Sets up structured logging and optional distributed tracing for the
//! gateway. Prometheus metrics are served by the API server itself on
//! `/metrics`, so no separate metrics listener is started here.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("OpenTelemetry SDK error: {0}")]
    OtelSdk(#[from] opentelemetry_sdk::error::OTelSdkError),

    #[error("Failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Configuration for telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for OTEL resource attributes.
    pub service_name: String,
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub otlp_endpoint: Option<String>,
    /// Sampling ratio (0.0 to 1.0). Default: 1.0 (sample everything).
    pub sampling_ratio: f64,
    /// Additional resource attributes.
    pub resource_attributes: Vec<(String, String)>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "nodegate".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            resource_attributes: vec![],
        }
    }
}

/// Initialize telemetry with the given configuration.
///
/// If `otlp_endpoint` is None, falls back to console/env-filter logging only.
/// This allows graceful degradation when no collector is available.
///
/// The `build()` call validates the endpoint URL format but does NOT
/// establish a connection - that happens lazily on first export.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let mut resource_attrs = vec![
        opentelemetry::KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        opentelemetry::KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ];

    for (key, value) in &config.resource_attributes {
        resource_attrs.push(opentelemetry::KeyValue::new(key.clone(), value.clone()));
    }

    let resource = Resource::builder().with_attributes(resource_attrs).build();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nodegate=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    // Optional OTLP tracing layer
    let (otel_layer, tracer_provider) = if let Some(endpoint) = &config.otlp_endpoint {
        // Note: build() validates URL format but connection is lazy
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .build();

        let tracer = tracer_provider.tracer("nodegate");

        (Some(OpenTelemetryLayer::new(tracer)), Some(tracer_provider))
    } else {
        (None, None)
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(TelemetryGuard { tracer_provider })
}

/// Guard that shuts down telemetry on drop.
///
/// For graceful shutdown with span flushing, call `shutdown().await` explicitly
/// before dropping. The `Drop` impl provides a fallback but cannot flush async.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Gracefully shutdown telemetry, flushing pending spans to the collector.
    ///
    /// Waits up to 5 seconds for pending spans to be exported before forcing
    /// shutdown.
    pub async fn shutdown(mut self) {
        use std::time::Duration;

        if let Some(provider) = self.tracer_provider.take() {
            let _ = tokio::time::timeout(
                Duration::from_secs(5),
                tokio::task::spawn_blocking(move || {
                    let _ = provider.shutdown();
                }),
            )
            .await;
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // Fallback shutdown - may lose pending spans if shutdown() wasn't called
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
    }
}
