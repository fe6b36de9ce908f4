//! Validate tool call arguments against JSON Schema before execution.

use super::arguments::as_integer;

/// Validate tool arguments against a JSON Schema.
///
/// Performs top-level validation: schema type check, required field presence,
/// property type verification, `enum` membership and numeric bounds.
/// Returns `Ok(())` when valid, `Err(message)` describing the first violation found.
pub fn validate_arguments(
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<(), String> {
    if let Some(schema_type) = schema.get("type").and_then(|v| v.as_str()) {
        if schema_type == "object" && !args.is_object() {
            return Err(format!(
                "expected object arguments, got {}",
                json_type_name(args)
            ));
        }
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for field in required {
            if let Some(name) = field.as_str() {
                if !obj.contains_key(name) {
                    return Err(format!("missing required field '{name}'"));
                }
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(prop_schema) = properties.get(key) else {
            continue;
        };
        if let Some(expected_type) = prop_schema.get("type").and_then(|v| v.as_str()) {
            if !value_matches_type(value, expected_type) {
                return Err(format!(
                    "field '{}' expected type '{}', got {}",
                    key,
                    expected_type,
                    json_type_name(value)
                ));
            }
        }
        if let Some(allowed) = prop_schema.get("enum").and_then(|v| v.as_array()) {
            if !allowed.contains(value) {
                return Err(format!("field '{key}' must be one of {}", serde_json::Value::from(allowed.clone())));
            }
        }
        if let Some(number) = value.as_f64() {
            if let Some(min) = prop_schema.get("minimum").and_then(|v| v.as_f64()) {
                if number < min {
                    return Err(format!("field '{key}' must be >= {min}, got {number}"));
                }
            }
            if let Some(max) = prop_schema.get("maximum").and_then(|v| v.as_f64()) {
                if number > max {
                    return Err(format!("field '{key}' must be <= {max}, got {number}"));
                }
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => as_integer(value).is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
