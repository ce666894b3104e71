use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};
use tracing_subscriber::EnvFilter;

/// Logging and OTLP export settings for one service
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Reported as the OTEL `service.name` resource attribute
    pub service_name: String,
    /// OTLP gRPC collector endpoint
    pub otel_endpoint: String,
    pub otel_enabled: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "envira-all-in-one".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_enabled: false,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// `RUST_LOG` wins over `log_level`; an unparsable level falls back to info
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Export pipelines kept alive until `shutdown_telemetry` flushes them
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}
