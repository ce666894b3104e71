use common::domain::{ValidationError, ValidationResult};

/// Identifiers carried by a telemetry topic
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub site_id: String,
    pub device_id: String,
}

/// Parse an MQTT topic in the format `{namespace}/{site_id}/{device_id}/telemetry`
///
/// # Examples
/// ```
/// use telemetry_ingester::mqtt::parse_topic;
///
/// let parsed = parse_topic("envira", "envira/home/esp32-001/telemetry").unwrap();
/// assert_eq!(parsed.site_id, "home");
/// assert_eq!(parsed.device_id, "esp32-001");
/// ```
pub fn parse_topic(namespace: &str, topic: &str) -> ValidationResult<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    let [prefix, site_id, device_id, suffix] = parts.as_slice() else {
        return Err(malformed(
            topic,
            format!(
                "expected '{}/{{site_id}}/{{device_id}}/telemetry'",
                namespace
            ),
        ));
    };

    if *prefix != namespace {
        return Err(malformed(
            topic,
            format!("namespace '{}' does not match '{}'", prefix, namespace),
        ));
    }

    if *suffix != "telemetry" {
        return Err(malformed(topic, "last segment must be 'telemetry'".to_string()));
    }

    let site_id = site_id.trim();
    let device_id = device_id.trim();

    if site_id.is_empty() {
        return Err(malformed(topic, "site ID cannot be empty".to_string()));
    }

    if device_id.is_empty() {
        return Err(malformed(topic, "device ID cannot be empty".to_string()));
    }

    Ok(ParsedTopic {
        site_id: site_id.to_string(),
        device_id: device_id.to_string(),
    })
}

fn malformed(topic: &str, reason: String) -> ValidationError {
    ValidationError::MalformedTopic {
        topic: topic.to_string(),
        reason,
    }
}
