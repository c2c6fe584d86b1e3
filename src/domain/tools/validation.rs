//! Argument validation against tool parameter schemas.
//!
//! Supports the JSON-Schema subset the tool catalog actually uses:
//! `type`, `required`, `properties`, `enum`, and numeric `minimum` /
//! `maximum`. Unknown keywords are ignored.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during schema validation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaValidationError {
    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid type for field {field}: expected {expected}, got {actual}")]
    InvalidType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid value for field {field}: {value} is not one of the allowed values")]
    NotInEnum { field: String, value: String },

    #[error("Value out of range for field {field}: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Arguments must be a JSON object, got {actual}")]
    NotAnObject { actual: String },
}

/// Validates `args` against a tool parameter schema.
///
/// The schema root must describe an object. Fields present in `args` but
/// absent from `properties` pass through unchecked.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), SchemaValidationError> {
    let object = args
        .as_object()
        .ok_or_else(|| SchemaValidationError::NotAnObject {
            actual: type_name(args).to_string(),
        })?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(field) {
                return Err(SchemaValidationError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, field_schema) in properties {
            let Some(value) = object.get(field) else {
                continue;
            };
            validate_field(field, field_schema, value)?;
        }
    }

    Ok(())
}

fn validate_field(
    field: &str,
    schema: &Value,
    value: &Value,
) -> Result<(), SchemaValidationError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(SchemaValidationError::InvalidType {
                field: field.to_string(),
                expected: expected.to_string(),
                actual: type_name(value).to_string(),
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(SchemaValidationError::NotInEnum {
                field: field.to_string(),
                value: value.to_string(),
            });
        }
    }

    if let Some(number) = value.as_f64() {
        let min = schema.get("minimum").and_then(Value::as_f64);
        let max = schema.get("maximum").and_then(Value::as_f64);
        let below = min.is_some_and(|m| number < m);
        let above = max.is_some_and(|m| number > m);
        if below || above {
            return Err(SchemaValidationError::OutOfRange {
                field: field.to_string(),
                value: number.to_string(),
                min: min.map_or("-inf".to_string(), |m| m.to_string()),
                max: max.map_or("inf".to_string(), |m| m.to_string()),
            });
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reminder_schema() -> Value {
        json!({
            "type": "object",
            "required": ["invoice_id"],
            "properties": {
                "invoice_id": { "type": "string" },
                "days_overdue": { "type": "integer", "minimum": 0, "maximum": 365 },
                "tone": { "type": "string", "enum": ["neutral", "firm"] }
            }
        })
    }

    #[test]
    fn valid_args_pass() {
        let args = json!({"invoice_id": "F-1001", "days_overdue": 14, "tone": "firm"});
        assert!(validate_args(&reminder_schema(), &args).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let args = json!({"days_overdue": 14});
        let err = validate_args(&reminder_schema(), &args).unwrap_err();
        assert_eq!(
            err,
            SchemaValidationError::MissingRequired {
                field: "invoice_id".into()
            }
        );
    }

    #[test]
    fn wrong_type_fails() {
        let args = json!({"invoice_id": 42});
        let err = validate_args(&reminder_schema(), &args).unwrap_err();
        assert!(matches!(err, SchemaValidationError::InvalidType { .. }));
    }

    #[test]
    fn enum_violation_fails() {
        let args = json!({"invoice_id": "F-1", "tone": "aggressive"});
        let err = validate_args(&reminder_schema(), &args).unwrap_err();
        assert!(matches!(err, SchemaValidationError::NotInEnum { .. }));
    }

    #[test]
    fn out_of_range_fails() {
        let args = json!({"invoice_id": "F-1", "days_overdue": 500});
        let err = validate_args(&reminder_schema(), &args).unwrap_err();
        assert!(matches!(err, SchemaValidationError::OutOfRange { .. }));
    }

    #[test]
    fn non_object_args_fail() {
        let err = validate_args(&reminder_schema(), &json!("not an object")).unwrap_err();
        assert!(matches!(err, SchemaValidationError::NotAnObject { .. }));
    }

    #[test]
    fn unknown_fields_pass_through() {
        let args = json!({"invoice_id": "F-1", "extra": true});
        assert!(validate_args(&reminder_schema(), &args).is_ok());
    }
}
