//! Relationship values and their resolution.
//!
//! Computed relationship properties hold an array of related identifiers.
//! Each element is the bare key value for single-field keys, or an object of
//! key fields for composite keys.

mod resolver;

pub use resolver::RelationshipResolver;

use crate::catalog::{FieldType, RelationDef, Schema};
use crate::constraint::{coerce, Mismatch};
use tabula_proto::{EntityId, Row, Value};

/// Property value representing one related identifier.
pub fn id_to_value(id: &EntityId) -> Value {
    match id.parts() {
        [(_, value)] => value.clone(),
        parts => Value::Object(parts.iter().cloned().collect()),
    }
}

/// Property value representing a list of related identifiers.
pub fn ids_to_value(ids: &[EntityId]) -> Value {
    Value::Array(ids.iter().map(id_to_value).collect())
}

/// Parse one identifier of `related`, coercing each key field to its type.
pub fn value_to_id(related: &Schema, value: &Value) -> Result<EntityId, Mismatch> {
    let key = related.primary_key();
    if let [field] = key {
        let coerced = coerce(key_type(related, field), value.clone())?;
        if coerced.is_empty() {
            return Err(Mismatch {
                expected: key_type(related, field).name(),
                found: value.type_name(),
            });
        }
        return Ok(EntityId::single(field.clone(), coerced));
    }

    let members = match value {
        Value::Object(members) => members.clone(),
        Value::Json(json @ serde_json::Value::Object(_)) => {
            match crate::constraint::from_json(json.clone()) {
                Value::Object(members) => members,
                _ => Default::default(),
            }
        }
        other => {
            return Err(Mismatch {
                expected: "object",
                found: other.type_name(),
            })
        }
    };
    let mut parts = Vec::with_capacity(key.len());
    for field in key {
        let raw = members.get(field).cloned().unwrap_or(Value::Null);
        let coerced = coerce(key_type(related, field), raw)?;
        if coerced.is_empty() {
            return Err(Mismatch {
                expected: key_type(related, field).name(),
                found: "null",
            });
        }
        parts.push((field.clone(), coerced));
    }
    Ok(EntityId::new(parts))
}

/// Parse a relationship property value into identifiers of `related`.
///
/// Null is the empty list; a single identifier is accepted without a
/// surrounding array. Duplicates are dropped, first occurrence wins.
pub fn value_to_ids(related: &Schema, value: &Value) -> Result<Vec<EntityId>, Mismatch> {
    let items: Vec<&Value> = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    let mut ids: Vec<EntityId> = Vec::with_capacity(items.len());
    for item in items {
        let id = value_to_id(related, item)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Read the primary key of `schema` out of a row, coercing each field.
pub fn row_to_id(schema: &Schema, row: &Row) -> Result<EntityId, (String, Mismatch)> {
    let mut parts = Vec::with_capacity(schema.primary_key().len());
    for field in schema.primary_key() {
        let raw = row.get(field).cloned().unwrap_or(Value::Null);
        let found = raw.type_name();
        let value = coerce(key_type(schema, field), raw).map_err(|m| (field.clone(), m))?;
        if value.is_empty() {
            return Err((
                field.clone(),
                Mismatch {
                    expected: key_type(schema, field).name(),
                    found,
                },
            ));
        }
        parts.push((field.clone(), value));
    }
    Ok(EntityId::new(parts))
}

/// Columns of the related table referencing the declaring entity's key in a
/// many-to-one relationship.
pub fn foreign_key_columns(schema: &Schema, relationship: &RelationDef) -> Vec<String> {
    if relationship.related_property_names.is_empty() {
        schema.primary_key().to_vec()
    } else {
        relationship.related_property_names.clone()
    }
}

fn key_type(schema: &Schema, field: &str) -> FieldType {
    schema
        .field(field)
        .map_or(FieldType::String, |f| f.field_type)
}
