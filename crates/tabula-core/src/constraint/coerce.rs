//! Value coercion and the property validation pipeline.

use super::validator::CompiledValidator;
use crate::catalog::{FieldType, Property};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tabula_proto::Value;
use tracing::debug;

/// A failed coercion: the expected type and the kind of value found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

/// Trim string input. Other values pass through unchanged.
pub fn trim(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.len() == s.len() {
                Value::String(s)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        other => other,
    }
}

/// Coerce a value to a field type.
///
/// Coercion is lossless or it fails: `"12"` becomes `12` for an integer
/// field, `1.5` does not. Null always passes; the empty string becomes null
/// for every non-string type.
pub fn coerce(field_type: FieldType, value: Value) -> std::result::Result<Value, Mismatch> {
    let mismatch = |v: &Value| Mismatch {
        expected: field_type.name(),
        found: v.type_name(),
    };

    if value.is_null() {
        return Ok(Value::Null);
    }
    if field_type != FieldType::String && value.as_str() == Some("") {
        return Ok(Value::Null);
    }

    match field_type {
        FieldType::String => match value {
            Value::String(_) => Ok(value),
            Value::Int(i) => Ok(Value::String(i.to_string())),
            Value::Double(d) => Ok(Value::String(d.to_string())),
            Value::Bool(b) => Ok(Value::String(if b { "1" } else { "0" }.to_string())),
            other => Err(mismatch(&other)),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::String(ref s) => match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&value)),
            },
            other => Err(mismatch(&other)),
        },
        FieldType::Integer | FieldType::UnsignedInteger => {
            let n = match value {
                Value::Int(i) => i,
                Value::Bool(b) => b as i64,
                Value::Double(d) if d.fract() == 0.0 && d.abs() < i64::MAX as f64 => d as i64,
                Value::String(ref s) => s.parse::<i64>().map_err(|_| mismatch(&value))?,
                other => return Err(mismatch(&other)),
            };
            if field_type == FieldType::UnsignedInteger && n < 0 {
                return Err(Mismatch {
                    expected: field_type.name(),
                    found: "negative integer",
                });
            }
            Ok(Value::Int(n))
        }
        FieldType::Double => match value {
            Value::Double(_) => Ok(value),
            // i128 so that i64::MAX, which rounds up to 2^63, is rejected
            Value::Int(i) if (i as f64) as i128 == i as i128 => Ok(Value::Double(i as f64)),
            Value::String(ref s) => s
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| mismatch(&value)),
            other => Err(mismatch(&other)),
        },
        FieldType::Array => match value {
            Value::Array(_) => Ok(value),
            Value::Json(serde_json::Value::Array(items)) => {
                Ok(Value::Array(items.into_iter().map(from_json).collect()))
            }
            Value::Object(_) | Value::Json(_) => Err(mismatch(&value)),
            scalar => Ok(Value::Array(vec![scalar])),
        },
        FieldType::Json => match value {
            Value::Json(_) => Ok(value),
            Value::String(ref s) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|_| mismatch(&value)),
            other => Ok(Value::Json(to_json(&other))),
        },
        FieldType::Object => match value {
            Value::Object(_) => Ok(value),
            Value::Json(json @ serde_json::Value::Object(_)) => Ok(from_json(json)),
            other => Err(mismatch(&other)),
        },
        FieldType::ObjectArray => {
            let items = match value {
                Value::Array(items) => items,
                Value::Json(serde_json::Value::Array(items)) => {
                    items.into_iter().map(from_json).collect()
                }
                other => return Err(mismatch(&other)),
            };
            items
                .into_iter()
                .map(|item| coerce(FieldType::Object, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array)
                .map_err(|_| Mismatch {
                    expected: field_type.name(),
                    found: "array",
                })
        }
    }
}

/// Convert a value to JSON.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Double(d) => serde_json::Value::from(*d),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Object(members) => serde_json::Value::Object(
            members
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Value::Json(json) => json.clone(),
    }
}

/// Convert JSON to a value.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(members) => Value::Object(
            members
                .into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Coerce a value for a property, reporting mismatches against it.
pub fn coerce_for(entity: &str, property: &Property, value: Value) -> Result<Value> {
    coerce(property.value_type, trim(value)).map_err(|m| Error::TypeMismatch {
        entity: entity.to_string(),
        property: property.name.clone(),
        expected: m.expected,
        found: m.found,
    })
}

/// Run the full pipeline for a scalar property value.
///
/// Steps, in order: trim, coerce, required/default, size limit, validator.
/// The validator only runs on non-empty values.
pub fn prepare_value(entity: &str, property: &Property, raw: Value) -> Result<Value> {
    let mut value = coerce_for(entity, property, raw)?;

    if value.is_empty() {
        match &property.default {
            Some(default) => value = coerce_for(entity, property, default.clone())?,
            None if property.required => {
                debug!(entity, property = %property.name, "required value missing");
                return Err(Error::required(entity, &property.name));
            }
            None => {}
        }
    }

    if let (Some(size), Value::String(s)) = (property.size, &value) {
        if s.chars().count() > size {
            return Err(Error::validation(
                entity,
                &property.name,
                "exceeds maximum length",
                Some(format!("limit is {} characters", size)),
            ));
        }
    }

    if !value.is_empty() {
        if let Some(validator) = &property.validator {
            run_validator(entity, property, validator, &value)?;
        }
    }
    Ok(value)
}

fn run_validator(
    entity: &str,
    property: &Property,
    validator: &CompiledValidator,
    value: &Value,
) -> Result<()> {
    validator.check(value).map_err(|detail| {
        debug!(entity, property = %property.name, ?detail, "validator rejected value");
        Error::validation(entity, &property.name, "failed validation", detail)
    })
}
