//! Central tool-argument validation
//!
//! Tool input schemas are opaque JSON Schema objects supplied by plugins.
//! The dispatcher validates arguments against them before a handler runs, so
//! handlers may assume required properties are present and primitively typed.
//! Violations surface uniformly as [`HubError::BadInput`].

use crate::core::error::{HubError, HubResult};
use serde_json::{Map, Value};

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_schema_type(value: &Value, schema_type: &str) -> bool {
    match schema_type {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown or compound type keywords are not enforced
        _ => true,
    }
}

/// Validate tool-call arguments against a JSON Schema object
///
/// Enforces the `required` list and the `type` keyword of each declared
/// property. Additional properties and deeper schema constructs pass through
/// unchecked, matching what tool authors can rely on.
pub fn validate_arguments(schema: &Value, arguments: &Map<String, Value>) -> HubResult<()> {
    let Some(schema_obj) = schema.as_object() else {
        // A non-object schema places no constraints on the call
        return Ok(());
    };

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(name) {
                return Err(HubError::bad_input(format!(
                    "missing required parameter '{name}'"
                )));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            let Some(value) = arguments.get(name) else {
                continue;
            };
            let Some(expected) = prop_schema.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !matches_schema_type(value, expected) {
                return Err(HubError::bad_input(format!(
                    "parameter '{name}' expected {expected}, got {}",
                    value_type_name(value)
                )));
            }
        }
    }

    Ok(())
}
