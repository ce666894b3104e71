use common::domain::{SubscriberError, SubscriberResult};
use rumqttc::{MqttOptions, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSubscriberConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// TLS with the platform's native root certificates
    pub use_tls: bool,
    /// First topic segment, subscribed as `{namespace}/+/+/telemetry`
    pub topic_namespace: String,
    pub keep_alive_secs: u64,
    /// Delay after the first failed attempt, doubled per consecutive failure
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
    pub connect_timeout_secs: u64,
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "envira-ingester".to_string(),
            username: None,
            password: None,
            use_tls: false,
            topic_namespace: "envira".to_string(),
            keep_alive_secs: 30,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_reconnect_attempts: None,
            connect_timeout_secs: 10,
        }
    }
}

impl MqttSubscriberConfig {
    pub fn subscription_topic(&self) -> String {
        format!("{}/+/+/telemetry", self.topic_namespace)
    }

    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Build client options for one connection attempt
    pub fn mqtt_options(&self) -> SubscriberResult<MqttOptions> {
        if self.host.trim().is_empty() {
            return Err(SubscriberError::InvalidBrokerConfig(
                "broker host cannot be empty".to_string(),
            ));
        }
        if self.client_id.trim().is_empty() {
            return Err(SubscriberError::InvalidBrokerConfig(
                "client id cannot be empty".to_string(),
            ));
        }
        if self.topic_namespace.is_empty() || self.topic_namespace.contains(['/', '+', '#']) {
            return Err(SubscriberError::InvalidBrokerConfig(format!(
                "invalid topic namespace '{}'",
                self.topic_namespace
            )));
        }

        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(1)));
        options.set_clean_session(true);

        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }

        if self.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        Ok(options)
    }
}
