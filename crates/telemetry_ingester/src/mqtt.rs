pub(crate) mod subscriber;
mod subscriber_config;
mod topic;

pub use subscriber::{run_mqtt_subscriber, ReconnectPolicy};
pub use subscriber_config::MqttSubscriberConfig;
pub use topic::{parse_topic, ParsedTopic};
