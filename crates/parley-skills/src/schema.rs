//! Minimal JSON-schema checks for tool arguments.
//!
//! Only the subset tool declarations use is enforced: an object with
//! `required` keys and primitive `type`s on its `properties`.

use serde_json::Value;

/// Checks `arguments` against a declaration's parameter schema.
///
/// Returns a human-readable reason on the first violation.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let args = arguments
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {}", type_name(arguments)))?;

    if let Some(required) = schema["required"].as_array() {
        for name in required.iter().filter_map(Value::as_str) {
            match args.get(name) {
                None | Some(Value::Null) => return Err(format!("missing required field '{name}'")),
                Some(_) => {}
            }
        }
    }

    if let Some(properties) = schema["properties"].as_object() {
        for (name, value) in args {
            let Some(expected) = properties.get(name).and_then(|p| p["type"].as_str()) else {
                continue;
            };
            if !matches_type(expected, value) {
                return Err(format!(
                    "field '{name}' must be of type {expected}, got {}",
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type keywords are not enforced.
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
