use common::domain::ScoredReading;
use serde::Serialize;

pub const CONNECTION_GREETING: &str = "Connected to Envira real-time feed";

/// JSON frames pushed to live-channel clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage<'a> {
    Connection {
        message: &'static str,
        connected_clients: usize,
    },
    Telemetry {
        data: &'a ScoredReading,
    },
}

impl<'a> LiveMessage<'a> {
    pub fn connection(connected_clients: usize) -> Self {
        LiveMessage::Connection {
            message: CONNECTION_GREETING,
            connected_clients,
        }
    }

    pub fn telemetry(data: &'a ScoredReading) -> Self {
        LiveMessage::Telemetry { data }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
