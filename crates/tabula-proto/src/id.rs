//! Entity identifiers.

use crate::query::Condition;
use crate::value::{FieldValues, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The primary-key value set of one entity.
///
/// Entries are kept in the order the primary-key fields are declared in the
/// entity's schema, so two identifiers of the same type compare equal exactly
/// when every key field holds the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityId {
    parts: Vec<(String, Value)>,
}

impl EntityId {
    /// Create an identifier from ordered `(field, value)` pairs.
    pub fn new(parts: Vec<(String, Value)>) -> Self {
        Self { parts }
    }

    /// Create a single-field identifier.
    pub fn single(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            parts: vec![(field.into(), value.into())],
        }
    }

    /// Key field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(f, _)| f.as_str())
    }

    /// Key values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.parts.iter().map(|(_, v)| v)
    }

    /// The `(field, value)` pairs.
    pub fn parts(&self) -> &[(String, Value)] {
        &self.parts
    }

    /// Value of one key field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.parts.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    /// Number of key fields.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the identifier has no key fields.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether every key field holds a non-empty value.
    pub fn is_complete(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|(_, v)| !v.is_empty())
    }

    /// The identifier as a field-value set.
    pub fn to_field_values(&self) -> FieldValues {
        self.parts.iter().cloned().collect()
    }

    /// Equality conditions matching this identifier.
    pub fn to_conditions(&self) -> Vec<Condition> {
        self.parts
            .iter()
            .map(|(field, value)| Condition::eq(field.as_str(), value.clone()))
            .collect()
    }

    /// Re-key the identifier onto other field names, position by position.
    ///
    /// Used when an entity's key is stored under foreign-key columns of a
    /// related type. Returns `None` when the arities differ.
    pub fn rekey<S: AsRef<str>>(&self, fields: &[S]) -> Option<EntityId> {
        if fields.len() != self.parts.len() {
            return None;
        }
        Some(EntityId {
            parts: fields
                .iter()
                .zip(self.parts.iter())
                .map(|(field, (_, value))| (field.as_ref().to_string(), value.clone()))
                .collect(),
        })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (_, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}
