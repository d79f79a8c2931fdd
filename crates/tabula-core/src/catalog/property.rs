//! Property definitions.
//!
//! Every readable attribute of an entity is a property. Field-sourced
//! properties are stored in the entity's table, relationship-sourced ones are
//! computed by the relationship resolver, and property-only ones live on the
//! instance without being persisted.

use super::error::SchemaError;
use super::types::FieldType;
use crate::constraint::{CompiledValidator, Validator};
use tabula_proto::Value;

/// Where a property's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySource {
    /// Backed by a column of the entity's table.
    Field,
    /// Held on the instance only.
    Property,
    /// Computed from a relationship.
    Relationship,
}

impl std::fmt::Display for PropertySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertySource::Field => write!(f, "field"),
            PropertySource::Property => write!(f, "property"),
            PropertySource::Relationship => write!(f, "relationship"),
        }
    }
}

/// Declaration of a property, as written by an entity descriptor.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// Property name.
    pub name: String,
    /// Value source.
    pub source: PropertySource,
    /// Declared type. Relationship-sourced properties are always arrays of
    /// related identifiers.
    pub value_type: FieldType,
    /// Whether a non-empty value is required.
    pub required: bool,
    /// Value used when none is supplied.
    pub default: Option<Value>,
    /// Custom validator.
    pub validator: Option<Validator>,
    /// Maximum string length.
    pub size: Option<usize>,
    /// Whether the store assigns the value on insert.
    pub autoincrement: bool,
}

impl PropertyDef {
    fn new(name: impl Into<String>, source: PropertySource, value_type: FieldType) -> Self {
        Self {
            name: name.into(),
            source,
            value_type,
            required: false,
            default: None,
            validator: None,
            size: None,
            autoincrement: false,
        }
    }

    /// A property stored in the entity's table.
    pub fn field(name: impl Into<String>, value_type: FieldType) -> Self {
        Self::new(name, PropertySource::Field, value_type)
    }

    /// A property computed from a relationship.
    pub fn relationship(name: impl Into<String>) -> Self {
        Self::new(name, PropertySource::Relationship, FieldType::Array)
    }

    /// A transient property that is never persisted.
    pub fn transient(name: impl Into<String>, value_type: FieldType) -> Self {
        Self::new(name, PropertySource::Property, value_type)
    }

    /// Mark as required.
    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the validator.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the maximum string length.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Mark as store-assigned.
    pub fn with_autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }
}

/// A registered property with its validator resolved.
#[derive(Debug, Clone)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Value source.
    pub source: PropertySource,
    /// Declared type.
    pub value_type: FieldType,
    /// Whether a non-empty value is required.
    pub required: bool,
    /// Value used when none is supplied.
    pub default: Option<Value>,
    /// Resolved validator.
    pub validator: Option<CompiledValidator>,
    /// Maximum string length.
    pub size: Option<usize>,
    /// Whether the store assigns the value on insert.
    pub autoincrement: bool,
}

impl Property {
    /// Resolve a declaration.
    pub(crate) fn resolve(entity: &str, def: PropertyDef) -> Result<Self, SchemaError> {
        let validator = match def.validator {
            Some(validator) => Some(validator.compile().map_err(|err| {
                SchemaError::InvalidValidator {
                    entity: entity.to_string(),
                    property: def.name.clone(),
                    reason: err.to_string(),
                }
            })?),
            None => None,
        };
        let value_type = match def.source {
            PropertySource::Relationship => FieldType::Array,
            _ => def.value_type,
        };

        Ok(Self {
            name: def.name,
            source: def.source,
            value_type,
            required: def.required,
            default: def.default,
            validator,
            size: def.size,
            autoincrement: def.autoincrement,
        })
    }

    /// Whether the property is stored in the entity's table.
    pub fn is_field(&self) -> bool {
        self.source == PropertySource::Field
    }

    /// Whether the property is computed from a relationship.
    pub fn is_relationship(&self) -> bool {
        self.source == PropertySource::Relationship
    }
}
