//! Tool argument validation.
//!
//! Descriptors declare object schemas using the subset every server in
//! this workspace emits: `type`, `properties`, `required`, and `enum`.
//! The checker covers exactly that subset; unknown schema keywords are
//! ignored rather than guessed at.

use serde_json::Value;

use trellis_domain::error::{Error, Result};

/// Validate `args` against an object `schema`. Returns the first
/// violation as [`Error::Validation`].
pub fn validate_args(schema: &Value, args: &Value) -> Result<()> {
    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !args.is_object() {
        return Err(Error::Validation(format!(
            "arguments must be an object, got {}",
            type_name(args)
        )));
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if args.get(name).is_none() {
                return Err(Error::Validation(format!("missing required field: {name}")));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop_schema) in properties {
            let Some(value) = args.get(name) else { continue };
            check_property(name, prop_schema, value)?;
        }
    }

    Ok(())
}

fn check_property(name: &str, schema: &Value, value: &Value) -> Result<()> {
    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        let ok = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !ok {
            return Err(Error::Validation(format!(
                "field '{name}' expected {expected}, got {}",
                type_name(value)
            )));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(Error::Validation(format!(
                "field '{name}' must be one of {allowed:?}"
            )));
        }
    }

    Ok(())
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
