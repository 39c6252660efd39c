//! JSON Schema compilation and type-coercing validation
//!
//! Schemas are compiled once, when an action is registered. Validation runs
//! in a type-casting mode: scalar strings are coerced to the type the schema
//! asks for (`"5"` becomes `5` under `{"type": "integer"}`) before the
//! compiled validator checks the value.

use jsonschema::{Draft, Validator};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A schema compiled for repeated validation.
pub struct CompiledSchema {
    source: Value,
    validator: Validator,
}

impl CompiledSchema {
    /// Compile `schema`; returns the compiler message on failure.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|err| err.to_string())?;
        Ok(Self {
            source: schema.clone(),
            validator,
        })
    }

    /// The schema document this was compiled from.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Validate without coercion.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|error| error.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }

    /// Coerce `value` towards the schema, then validate it.
    pub fn coerce_and_validate(&self, value: Value) -> Result<Value, Vec<String>> {
        let coerced = coerce(&self.source, value);
        self.validate(&coerced)?;
        Ok(coerced)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Coerce scalar strings to the types named by `schema`, recursing through
/// object properties and array items. Values that already match, or that
/// cannot be converted, are returned unchanged for the validator to judge.
pub fn coerce(schema: &Value, value: Value) -> Value {
    let Some(schema) = schema.as_object() else {
        return value;
    };

    let types = declared_types(schema);
    let value = if types.is_empty() || types.iter().any(|ty| matches_type(ty, &value)) {
        value
    } else {
        types
            .iter()
            .find_map(|ty| cast_scalar(ty, &value))
            .unwrap_or(value)
    };

    let value = if types.contains(&"integer") {
        whole_number(value)
    } else {
        value
    };

    match value {
        Value::Object(object) => Value::Object(coerce_object(schema, object)),
        Value::Array(items) => Value::Array(coerce_items(schema, items)),
        other => other,
    }
}

fn declared_types(schema: &Map<String, Value>) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match ty {
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        "number" => value.is_number(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => false,
    }
}

/// `2.0` satisfies `{"type": "integer"}`; store it as `2` so typed
/// conversions downstream accept it.
fn whole_number(value: Value) -> Value {
    let Value::Number(number) = &value else {
        return value;
    };
    if number.is_i64() || number.is_u64() {
        return value;
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Value::Number((f as i64).into())
        }
        Some(f) if f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64 => {
            Value::Number((f as u64).into())
        }
        _ => value,
    }
}

fn cast_scalar(ty: &str, value: &Value) -> Option<Value> {
    let text = value.as_str()?.trim();
    match ty {
        "integer" => text
            .parse::<i64>()
            .ok()
            .map(|n| Value::Number(n.into()))
            .or_else(|| text.parse::<u64>().ok().map(|n| Value::Number(n.into()))),
        "number" => text
            .parse::<i64>()
            .ok()
            .map(|n| Value::Number(n.into()))
            .or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }),
        "boolean" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "null" if text.is_empty() => Some(Value::Null),
        _ => None,
    }
}

fn coerce_object(schema: &Map<String, Value>, object: Map<String, Value>) -> Map<String, Value> {
    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties").filter(|s| s.is_object());

    object
        .into_iter()
        .map(|(key, value)| {
            let child = properties.and_then(|p| p.get(&key)).or(additional);
            let value = match child {
                Some(child) => coerce(child, value),
                None => value,
            };
            (key, value)
        })
        .collect()
}

fn coerce_items(schema: &Map<String, Value>, items: Vec<Value>) -> Vec<Value> {
    let prefix = schema.get("prefixItems").and_then(Value::as_array);
    let rest = schema.get("items").filter(|s| s.is_object());

    items
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let child = prefix.and_then(|p| p.get(index)).or(rest);
            match child {
                Some(child) => coerce(child, value),
                None => value,
            }
        })
        .collect()
}
