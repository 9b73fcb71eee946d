//! Logging and Trace Export
//!
//! Installs the global `tracing` subscriber: an `EnvFilter`, one
//! formatter (text or JSON lines), and an OTLP span exporter when
//! enabled.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives, replacing the relay defaults
//! - `RELAY_LOG_FORMAT`: "text" or "json" (default: text)
//! - `OTEL_ENABLED`: "true", "1" or "yes" to export spans (default: off)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name on exported spans (default: alpaca-trade-relay)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Directives used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str =
    "alpaca_trade_relay=info,tungstenite=warn,reqwest=warn,hyper=warn,h2=warn";

const DEFAULT_SERVICE_NAME: &str = "alpaca-trade-relay";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Telemetry setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The OTLP exporter could not be built.
    #[error("OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    /// A global subscriber is already installed.
    #[error("subscriber already installed: {0}")]
    Install(#[from] TryInitError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Output format of the log formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Span export settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpSettings {
    /// Collector endpoint.
    pub endpoint: String,
    /// `service.name` resource attribute.
    pub service_name: String,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Formatter output.
    pub log_format: LogFormat,
    /// Span export; `None` keeps logs local.
    pub otlp: Option<OtlpSettings>,
}

impl TelemetryConfig {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = lookup("RELAY_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        let otlp = lookup("OTEL_ENABLED")
            .is_some_and(|v| parse_enabled(&v))
            .then(|| OtlpSettings {
                endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
                service_name: lookup("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            });

        Self { log_format, otlp }
    }
}

fn parse_enabled(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

// =============================================================================
// Initialization
// =============================================================================

/// Flushes and stops span export when dropped.
#[must_use = "dropping the guard stops span export"]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("span exporter shutdown failed: {e}");
        }
    }
}

/// Filter from `RUST_LOG`, or [`DEFAULT_DIRECTIVES`] when it is unset.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built or a global
/// subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    let (otel, tracer_provider) = match &config.otlp {
        Some(settings) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&settings.endpoint)
                .build()?;
            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    opentelemetry_sdk::Resource::builder()
                        .with_service_name(settings.service_name.clone())
                        .build(),
                )
                .build();
            let tracer = provider.tracer(settings.service_name.clone());
            (
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                Some(provider),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(text)
        .with(json)
        .with(otel)
        .try_init()?;

    if let Some(settings) = &config.otlp {
        tracing::info!(endpoint = %settings.endpoint, "Exporting spans over OTLP");
    }

    Ok(TelemetryGuard { tracer_provider })
}
