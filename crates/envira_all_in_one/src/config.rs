use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use live_channel::LiveChannelConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use telemetry_ingester::mqtt::MqttSubscriberConfig;

/// Where scored readings are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    ClickHouse,
    Memory,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// MQTT broker host
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// MQTT client identifier
    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// MQTT username (optional)
    #[serde(default)]
    pub mqtt_username: Option<String>,

    /// MQTT password (optional)
    #[serde(default)]
    pub mqtt_password: Option<String>,

    /// Connect to the broker over TLS
    #[serde(default)]
    pub mqtt_use_tls: bool,

    /// First topic segment of telemetry topics
    #[serde(default = "default_mqtt_topic_namespace")]
    pub mqtt_topic_namespace: String,

    /// MQTT keep-alive interval in seconds
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Initial reconnect backoff in milliseconds
    #[serde(default = "default_mqtt_initial_backoff_ms")]
    pub mqtt_initial_backoff_ms: u64,

    /// Maximum reconnect backoff in milliseconds
    #[serde(default = "default_mqtt_max_backoff_ms")]
    pub mqtt_max_backoff_ms: u64,

    /// Stop after this many consecutive failed attempts (unset retries forever)
    #[serde(default)]
    pub mqtt_max_reconnect_attempts: Option<u32>,

    /// Timeout for one connection attempt in seconds
    #[serde(default = "default_mqtt_connect_timeout_secs")]
    pub mqtt_connect_timeout_secs: u64,

    // Pipeline configuration
    /// Capacity of the queue between subscriber and pipeline worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// "clickhouse" or "memory"
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// Timeout for one storage write in seconds
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,

    // ClickHouse configuration
    /// ClickHouse HTTP URL
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    /// ClickHouse database name
    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    /// ClickHouse username
    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    /// ClickHouse password
    #[serde(default)]
    pub clickhouse_password: String,

    /// Table holding scored readings
    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,

    // Live channel configuration
    /// Live channel bind host
    #[serde(default = "default_live_host")]
    pub live_host: String,

    /// Live channel port
    #[serde(default = "default_live_port")]
    pub live_port: u16,

    /// Maximum concurrent WebSocket clients
    #[serde(default = "default_live_max_clients")]
    pub live_max_clients: usize,

    /// Frames buffered per client before it is dropped
    #[serde(default = "default_live_client_queue_capacity")]
    pub live_client_queue_capacity: usize,

    /// Seconds processes get to stop after a shutdown signal
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default)]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// MQTT defaults
fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "envira-ingester".to_string()
}

fn default_mqtt_topic_namespace() -> String {
    "envira".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_initial_backoff_ms() -> u64 {
    500
}

fn default_mqtt_max_backoff_ms() -> u64 {
    30_000
}

fn default_mqtt_connect_timeout_secs() -> u64 {
    10
}

// Pipeline defaults
fn default_queue_capacity() -> usize {
    1024
}

fn default_storage_backend() -> String {
    "clickhouse".to_string()
}

fn default_storage_timeout_secs() -> u64 {
    5
}

// ClickHouse defaults
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "envira".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_table() -> String {
    "scored_readings".to_string()
}

// Live channel defaults
fn default_live_host() -> String {
    "0.0.0.0".to_string()
}

fn default_live_port() -> u16 {
    8000
}

fn default_live_max_clients() -> usize {
    100
}

fn default_live_client_queue_capacity() -> usize {
    64
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "envira-all-in-one".to_string()
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("mqtt_host", &self.mqtt_host)
            .field("mqtt_port", &self.mqtt_port)
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("mqtt_username", &self.mqtt_username)
            .field("mqtt_password", &self.mqtt_password.as_ref().map(|_| REDACTED))
            .field("mqtt_use_tls", &self.mqtt_use_tls)
            .field("mqtt_topic_namespace", &self.mqtt_topic_namespace)
            .field("mqtt_keep_alive_secs", &self.mqtt_keep_alive_secs)
            .field("mqtt_initial_backoff_ms", &self.mqtt_initial_backoff_ms)
            .field("mqtt_max_backoff_ms", &self.mqtt_max_backoff_ms)
            .field("mqtt_max_reconnect_attempts", &self.mqtt_max_reconnect_attempts)
            .field("mqtt_connect_timeout_secs", &self.mqtt_connect_timeout_secs)
            .field("queue_capacity", &self.queue_capacity)
            .field("storage_backend", &self.storage_backend)
            .field("storage_timeout_secs", &self.storage_timeout_secs)
            .field("clickhouse_url", &self.clickhouse_url)
            .field("clickhouse_database", &self.clickhouse_database)
            .field("clickhouse_username", &self.clickhouse_username)
            .field("clickhouse_password", &REDACTED)
            .field("clickhouse_table", &self.clickhouse_table)
            .field("live_host", &self.live_host)
            .field("live_port", &self.live_port)
            .field("live_max_clients", &self.live_max_clients)
            .field("live_client_queue_capacity", &self.live_client_queue_capacity)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("otel_endpoint", &self.otel_endpoint)
            .field("otel_enabled", &self.otel_enabled)
            .field("otel_service_name", &self.otel_service_name)
            .finish()
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("ENVIRA"))
            .build()?
            .try_deserialize()
    }

    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.storage_backend.to_ascii_lowercase().as_str() {
            "clickhouse" => Ok(StorageBackend::ClickHouse),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!(
                "unknown storage backend '{}', expected 'clickhouse' or 'memory'",
                other
            )),
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn mqtt_config(&self) -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            use_tls: self.mqtt_use_tls,
            topic_namespace: self.mqtt_topic_namespace.clone(),
            keep_alive_secs: self.mqtt_keep_alive_secs,
            initial_backoff_ms: self.mqtt_initial_backoff_ms,
            max_backoff_ms: self.mqtt_max_backoff_ms,
            max_reconnect_attempts: self.mqtt_max_reconnect_attempts,
            connect_timeout_secs: self.mqtt_connect_timeout_secs,
        }
    }

    pub fn live_channel_config(&self) -> LiveChannelConfig {
        LiveChannelConfig {
            host: self.live_host.clone(),
            port: self.live_port,
            max_clients: self.live_max_clients,
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }
}
