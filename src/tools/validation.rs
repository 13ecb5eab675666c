//! Validate tool call arguments against a tool's parameter schema.

use serde_json::Value;

/// Check `args` against the top level of `schema`.
///
/// Covers the subset of JSON Schema the tool specs use: object type,
/// required fields, property types, and `additionalProperties: false`.
/// Returns the first violation found.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return Err(format!(
            "expected a JSON object of arguments, got {}",
            json_type_name(args)
        ));
    }
    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for name in required {
        if !obj.contains_key(name) {
            return Err(format!("missing required field '{name}'"));
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (key, value) in obj {
        let prop_schema = properties.and_then(|p| p.get(key));
        match prop_schema {
            None if closed => return Err(format!("unexpected field '{key}'")),
            None => {}
            Some(prop_schema) => {
                let expected = prop_schema.get("type").and_then(Value::as_str);
                if let Some(expected) = expected {
                    if !value_matches_type(value, expected) {
                        return Err(format!(
                            "field '{key}' expected type '{expected}', got {}",
                            json_type_name(value)
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
