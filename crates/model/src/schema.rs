//! Validation of connector configuration against a connector type schema.
//!
//! Schemas are JSON Schema draft 2020-12 with `format` asserted.

use std::fmt;

use fleet_core::{Error, Result};
use jsonschema::Validator;
use serde_json::Value;

/// One failed check, located by JSON pointer into the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Compile a schema. `null` means the type takes no checked configuration.
pub fn compile(schema: &Value) -> Result<Option<Validator>> {
    if schema.is_null() {
        return Ok(None);
    }
    jsonschema::draft202012::options()
        .should_validate_formats(true)
        .build(schema)
        .map(Some)
        .map_err(|e| Error::invalid_config(format!("invalid connector schema: {e}")))
}

/// Validate `instance` against `schema`, collecting every violation.
pub fn validate(schema: &Value, instance: &Value) -> Result<Vec<Violation>> {
    let Some(validator) = compile(schema)? else {
        return Ok(Vec::new());
    };
    Ok(validator
        .iter_errors(instance)
        .map(|error| Violation {
            path: error.instance_path.to_string(),
            message: error.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    fn paths(schema: &Value, instance: &Value) -> Vec<String> {
        let mut found: Vec<String> =
            validate(schema, instance).unwrap().into_iter().map(|v| v.path).collect();
        found.sort();
        found
    }

    #[test]
    fn test_null_schema_accepts_anything() {
        assert!(validate(&Value::Null, &json!({"anything": [1, 2]})).unwrap().is_empty());
        assert!(validate(&json!(true), &json!("x")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_required_is_reported_at_the_parent() {
        let violations = validate(&json!({"required": ["topic"]}), &json!({})).unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "");
        assert!(violations[0].to_string().starts_with("/: "));
        assert!(violations[0].message.contains("topic"));
    }

    #[test]
    fn test_nested_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "kafka_topic": {"type": "string", "pattern": "^[a-z.]+$"},
                "data_shape": {
                    "type": "object",
                    "properties": {
                        "format": {"enum": ["application/json", "avro/binary"]}
                    }
                },
                "tasks": {"type": "array", "items": {"type": "integer", "minimum": 1}}
            }
        });
        let instance = json!({
            "kafka_topic": "Orders",
            "data_shape": {"format": "xml"},
            "tasks": [1, 0, 3]
        });

        assert_eq!(
            paths(&schema, &instance),
            vec!["/data_shape/format", "/kafka_topic", "/tasks/1"]
        );
    }

    #[test]
    fn test_one_of_rejects_when_no_branch_matches() {
        let schema = json!({"oneOf": [{"required": ["a"]}, {"required": ["b"]}]});

        assert_eq!(validate(&schema, &json!({})).unwrap().len(), 1);
        assert!(validate(&schema, &json!({"a": 1})).unwrap().is_empty());
        assert_eq!(validate(&schema, &json!({"a": 1, "b": 2})).unwrap().len(), 1);
    }

    #[test]
    fn test_refs_resolve_against_defs() {
        let schema = json!({
            "$defs": {"port": {"type": "integer", "minimum": 1, "maximum": 65535}},
            "properties": {"port": {"$ref": "#/$defs/port"}}
        });

        assert!(validate(&schema, &json!({"port": 9092})).unwrap().is_empty());
        assert_eq!(paths(&schema, &json!({"port": 0})), vec!["/port"]);
    }

    #[test]
    fn test_formats_are_asserted() {
        let schema = json!({"properties": {"contact": {"type": "string", "format": "email"}}});

        assert!(validate(&schema, &json!({"contact": "ops@example.com"})).unwrap().is_empty());
        assert_eq!(paths(&schema, &json!({"contact": "not-an-address"})), vec!["/contact"]);
    }

    #[test]
    fn test_broken_schema_is_a_config_error() {
        let err = validate(&json!({"type": 12}), &json!({})).unwrap_err();

        assert_eq!(err.code(), "invalid_config");
    }
}
