use common::domain::{RawMessage, SensorReading, ValidationError, ValidationResult};
use common::garde::validate_struct;
use serde_json::Value;

/// Parse and structurally validate a broker message into a `SensorReading`.
///
/// Expected document:
///
/// ```json
/// {"device_id": "esp32-001", "site_id": "home", "ts": 4225,
///  "sensors": {"mq135": 785, "dht": {"t": 24.4, "h": 63.4},
///              "ldr": 1114, "sound_rms": 1056.826}}
/// ```
///
/// Fields are checked in a fixed order and the first problem wins, so the
/// same payload always fails the same way. `null` counts as missing.
pub fn validate(raw: &RawMessage) -> ValidationResult<SensorReading> {
    let document: Value = serde_json::from_slice(&raw.payload)
        .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

    if !document.is_object() {
        return Err(ValidationError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    }

    let reading = SensorReading {
        device_id: required_string(&document, "device_id", "/device_id")?,
        site_id: required_string(&document, "site_id", "/site_id")?,
        timestamp: required_integer(&document, "timestamp", "/ts")?,
        air_quality_raw: required_number(&document, "air_quality_raw", "/sensors/mq135")?,
        temperature_c: required_number(&document, "temperature_c", "/sensors/dht/t")?,
        humidity_pct: required_number(&document, "humidity_pct", "/sensors/dht/h")?,
        light_raw: required_number(&document, "light_raw", "/sensors/ldr")?,
        sound_rms: required_number(&document, "sound_rms", "/sensors/sound_rms")?,
    };

    validate_struct(&reading)?;

    Ok(reading)
}

fn lookup<'a>(document: &'a Value, field: &str, pointer: &str) -> ValidationResult<&'a Value> {
    match document.pointer(pointer) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field.to_string())),
        Some(value) => Ok(value),
    }
}

fn required_string(document: &Value, field: &str, pointer: &str) -> ValidationResult<String> {
    lookup(document, field, pointer)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(field, "expected a string"))
}

fn required_integer(document: &Value, field: &str, pointer: &str) -> ValidationResult<i64> {
    lookup(document, field, pointer)?
        .as_i64()
        .ok_or_else(|| invalid(field, "expected an integer"))
}

fn required_number(document: &Value, field: &str, pointer: &str) -> ValidationResult<f64> {
    lookup(document, field, pointer)?
        .as_f64()
        .ok_or_else(|| invalid(field, "expected a number"))
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_message(payload: Vec<u8>) -> RawMessage {
        RawMessage {
            topic: "envira/home/esp32-001/telemetry".to_string(),
            site_id: "home".to_string(),
            device_id: "esp32-001".to_string(),
            received_at: chrono::Utc::now(),
            payload,
        }
    }

    fn raw_json(value: serde_json::Value) -> RawMessage {
        raw_message(serde_json::to_vec(&value).unwrap())
    }

    fn sample_payload() -> serde_json::Value {
        json!({
            "device_id": "esp32-001",
            "site_id": "home",
            "ts": 4225,
            "sensors": {
                "mq135": 785,
                "dht": {"t": 24.4, "h": 63.4},
                "ldr": 1114,
                "sound_rms": 1056.826
            }
        })
    }

    #[test]
    fn test_validate_sample_payload() {
        let reading = validate(&raw_json(sample_payload())).unwrap();

        assert_eq!(reading.device_id, "esp32-001");
        assert_eq!(reading.site_id, "home");
        assert_eq!(reading.timestamp, 4225);
        assert_eq!(reading.air_quality_raw, 785.0);
        assert_eq!(reading.temperature_c, 24.4);
        assert_eq!(reading.humidity_pct, 63.4);
        assert_eq!(reading.light_raw, 1114.0);
        assert_eq!(reading.sound_rms, 1056.826);
    }

    #[test]
    fn test_validate_rejects_non_json() {
        let result = validate(&raw_message(b"not json at all".to_vec()));
        assert!(matches!(result, Err(ValidationError::MalformedPayload(_))));
    }

    #[test]
    fn test_validate_rejects_non_object_document() {
        let result = validate(&raw_json(json!([1, 2, 3])));
        assert!(matches!(result, Err(ValidationError::MalformedPayload(_))));
    }

    #[test]
    fn test_validate_missing_humidity() {
        let mut payload = sample_payload();
        payload["sensors"]["dht"] = json!({"t": 24.4});

        let result = validate(&raw_json(payload));
        assert_eq!(
            result,
            Err(ValidationError::MissingField("humidity_pct".to_string()))
        );
    }

    #[test]
    fn test_validate_missing_dht_reports_temperature_first() {
        let mut payload = sample_payload();
        payload["sensors"].as_object_mut().unwrap().remove("dht");

        let result = validate(&raw_json(payload));
        assert_eq!(
            result,
            Err(ValidationError::MissingField("temperature_c".to_string()))
        );
    }

    #[test]
    fn test_validate_reports_first_missing_field_in_order() {
        let cases = [
            ("/device_id", "device_id"),
            ("/site_id", "site_id"),
            ("/ts", "timestamp"),
            ("/sensors/mq135", "air_quality_raw"),
            ("/sensors/dht/t", "temperature_c"),
            ("/sensors/dht/h", "humidity_pct"),
            ("/sensors/ldr", "light_raw"),
            ("/sensors/sound_rms", "sound_rms"),
        ];

        // Removing a field and everything after it must always report that field
        for (index, (_, expected)) in cases.iter().enumerate() {
            let mut payload = sample_payload();
            for (pointer, _) in &cases[index..] {
                let (parent, key) = pointer.rsplit_once('/').unwrap();
                let parent = if parent.is_empty() {
                    &mut payload
                } else {
                    payload.pointer_mut(parent).unwrap()
                };
                parent.as_object_mut().unwrap().remove(key);
            }

            let result = validate(&raw_json(payload));
            assert_eq!(
                result,
                Err(ValidationError::MissingField(expected.to_string())),
                "expected {} to be reported first",
                expected
            );
        }
    }

    #[test]
    fn test_validate_null_counts_as_missing() {
        let mut payload = sample_payload();
        payload["sensors"]["ldr"] = serde_json::Value::Null;

        let result = validate(&raw_json(payload));
        assert_eq!(
            result,
            Err(ValidationError::MissingField("light_raw".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_non_numeric_sensor() {
        let mut payload = sample_payload();
        payload["sensors"]["mq135"] = json!("785");

        let result = validate(&raw_json(payload));
        assert!(matches!(
            result,
            Err(ValidationError::InvalidField { ref field, .. }) if field == "air_quality_raw"
        ));
    }

    #[test]
    fn test_validate_rejects_fractional_timestamp() {
        let mut payload = sample_payload();
        payload["ts"] = json!(4225.5);

        let result = validate(&raw_json(payload));
        assert!(matches!(
            result,
            Err(ValidationError::InvalidField { ref field, .. }) if field == "timestamp"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_device_id() {
        let mut payload = sample_payload();
        payload["device_id"] = json!("");

        let result = validate(&raw_json(payload));
        assert!(matches!(
            result,
            Err(ValidationError::InvalidField { ref field, .. }) if field == "device_id"
        ));
    }

    #[test]
    fn test_validate_accepts_integer_and_negative_sensor_values() {
        let mut payload = sample_payload();
        payload["sensors"]["dht"]["t"] = json!(-5);
        payload["sensors"]["sound_rms"] = json!(0);

        let reading = validate(&raw_json(payload)).unwrap();
        assert_eq!(reading.temperature_c, -5.0);
        assert_eq!(reading.sound_rms, 0.0);
    }
}
