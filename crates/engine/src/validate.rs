//! Argument validation against operation parameter schemas.
//!
//! Supports the object-typed JSON-Schema subset plugins declare:
//! `type`, `properties` (with per-property `type` tags), and `required`.

use serde_json::Value;

/// Check an arguments object against a parameter schema.
///
/// Returns `Err` with a human-readable description of every problem found
/// (missing required fields, type mismatches), suitable for feeding into
/// a repair request verbatim.
pub fn validate_arguments(arguments: &Value, schema: &Value) -> Result<(), String> {
    let mut problems = Vec::new();

    let Some(args) = arguments.as_object() else {
        return Err(format!(
            "arguments must be a JSON object, got {}",
            type_name(arguments)
        ));
    };

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    for field in &required {
        if !args.contains_key(*field) {
            problems.push(format!("missing required field '{field}'"));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop_schema) in properties {
            let Some(value) = args.get(name) else {
                continue;
            };
            let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            if !matches_type(value, expected) {
                problems.push(format!(
                    "field '{name}' expected {expected}, got {}",
                    type_name(value)
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type tag: accept rather than reject the whole plan.
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

    fn path_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            },
            "required": ["path"]
        })
    }

    #[test]
    fn valid_arguments_pass() {
        assert!(validate_arguments(&json!({"path": "/tmp/x"}), &path_schema()).is_ok());
    }

    #[test]
    fn wrong_type_rejected() {
        let err = validate_arguments(&json!({"path": 123}), &path_schema()).unwrap_err();
        assert!(err.contains("'path'"));
        assert!(err.contains("expected string"));
        assert!(err.contains("got number"));
    }

    #[test]
    fn missing_required_rejected() {
        let err = validate_arguments(&json!({}), &path_schema()).unwrap_err();
        assert!(err.contains("missing required field 'path'"));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let err = validate_arguments(&json!("just a string"), &path_schema()).unwrap_err();
        assert!(err.contains("must be a JSON object"));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let schema = json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["path"]
        });
        assert!(validate_arguments(&json!({"path": "/x"}), &schema).is_ok());
        assert!(validate_arguments(&json!({"path": "/x", "limit": 5}), &schema).is_ok());
        assert!(validate_arguments(&json!({"path": "/x", "limit": "five"}), &schema).is_err());
    }

    #[test]
    fn multiple_problems_reported_together() {
        let schema = json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "recursive": { "type": "boolean" }
            },
            "required": ["path", "recursive"]
        });
        let err = validate_arguments(&json!({"recursive": "yes"}), &schema).unwrap_err();
        assert!(err.contains("missing required field 'path'"));
        assert!(err.contains("'recursive' expected boolean"));
    }

    #[test]
    fn integer_vs_number() {
        let schema = json!({
            "type": "object",
            "properties": {
                "count": { "type": "integer" },
                "ratio": { "type": "number" }
            },
            "required": []
        });
        assert!(validate_arguments(&json!({"count": 3}), &schema).is_ok());
        assert!(validate_arguments(&json!({"count": 3.5}), &schema).is_err());
        assert!(validate_arguments(&json!({"ratio": 3}), &schema).is_ok());
        assert!(validate_arguments(&json!({"ratio": 3.5}), &schema).is_ok());
    }

    #[test]
    fn extra_fields_are_tolerated() {
        assert!(
            validate_arguments(&json!({"path": "/x", "comment": "fine"}), &path_schema()).is_ok()
        );
    }
}
