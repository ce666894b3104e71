//! Garde validation utilities.

use crate::domain::ValidationError;
use garde::{Report, Validate};

/// Convert the first garde violation into a `ValidationError::InvalidField`
pub fn validate_struct<T>(value: &T) -> Result<(), ValidationError>
where
    T: Validate,
    T::Context: Default,
{
    value.validate().map_err(|report| first_violation(&report))
}

fn first_violation(report: &Report) -> ValidationError {
    match report.iter().next() {
        Some((path, error)) => ValidationError::InvalidField {
            field: path.to_string(),
            reason: error.message().to_string(),
        },
        None => ValidationError::InvalidField {
            field: String::new(),
            reason: "validation failed".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[derive(Validate)]
    struct TestReading {
        #[garde(length(min = 1))]
        device_id: String,
    }

    #[test]
    fn test_validate_success() {
        let reading = TestReading {
            device_id: "esp32-001".to_string(),
        };
        assert!(validate_struct(&reading).is_ok());
    }

    #[test]
    fn test_validate_failure_names_the_field() {
        let reading = TestReading {
            device_id: "".to_string(),
        };
        match validate_struct(&reading) {
            Err(ValidationError::InvalidField { field, .. }) => assert_eq!(field, "device_id"),
            other => panic!("Expected InvalidField, got {:?}", other),
        }
    }
}
