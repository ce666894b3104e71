use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message as received from the broker, before any validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub topic: String,
    pub site_id: String,
    pub device_id: String,
    pub received_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

/// Validated sensor reading.
///
/// Only the payload validator constructs these; every field is present and
/// numeric, and both identifiers are non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SensorReading {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(length(min = 1))]
    pub site_id: String,
    /// Device-reported time, usually milliseconds
    #[garde(skip)]
    pub timestamp: i64,
    /// MQ135 gas sensor analog value
    #[garde(skip)]
    pub air_quality_raw: f64,
    #[garde(skip)]
    pub temperature_c: f64,
    #[garde(skip)]
    pub humidity_pct: f64,
    /// LDR analog value
    #[garde(skip)]
    pub light_raw: f64,
    #[garde(skip)]
    pub sound_rms: f64,
}

/// Per-component quality scores, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub air: f64,
    pub thermal: f64,
    pub light: f64,
    pub acoustic: f64,
}

/// Physical values derived from the raw sensor readings during scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSensors {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
    /// 0-100 index, higher is cleaner
    pub air_quality: f64,
    /// Lux equivalent, 0-1000
    pub light: f64,
    /// dB equivalent, 0-100
    pub sound: f64,
}

/// A sensor reading enriched with its IEQ score.
///
/// Append-only: the pipeline never mutates a scored reading after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredReading {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub ieq_score: f64,
    pub sub_scores: SubScores,
    pub sensors: NormalizedSensors,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ScoredReading {
    pub fn device_id(&self) -> &str {
        &self.reading.device_id
    }

    pub fn site_id(&self) -> &str {
        &self.reading.site_id
    }
}

/// Aggregate over a device's scored readings in a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub device_id: String,
    pub count: u64,
    pub avg_ieq_score: f64,
    pub min_ieq_score: f64,
    pub max_ieq_score: f64,
    pub avg_sub_scores: SubScores,
}

/// Broker connection lifecycle as seen by the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
}

impl fmt::Display for BrokerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerConnectionState::Disconnected => write!(f, "disconnected"),
            BrokerConnectionState::Connecting => write!(f, "connecting"),
            BrokerConnectionState::Subscribed => write!(f, "connected"),
        }
    }
}
