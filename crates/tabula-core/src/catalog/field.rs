//! Field definitions for entities.

use super::property::Property;
use super::types::FieldType;

/// A stored column of an entity's table.
///
/// Fields are derived from the field-sourced properties of an entity type at
/// registration time; they are never declared on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field (and column) name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether a non-empty value is required before saving.
    pub required: bool,
    /// Maximum string length.
    pub size: Option<usize>,
    /// Whether the store assigns the value on insert.
    pub autoincrement: bool,
}

impl FieldDef {
    /// Create an optional field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            size: None,
            autoincrement: false,
        }
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the maximum string length.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Mark the field as store-assigned.
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }
}

impl From<&Property> for FieldDef {
    fn from(property: &Property) -> Self {
        Self {
            name: property.name.clone(),
            field_type: property.value_type,
            required: property.required,
            size: property.size,
            autoincrement: property.autoincrement,
        }
    }
}
