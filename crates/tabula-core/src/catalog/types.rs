//! Field type definitions.

use std::fmt;

/// Declared type of a field or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// List of scalar values.
    Array,
    /// Boolean.
    Boolean,
    /// 64-bit floating point.
    Double,
    /// Signed integer.
    Integer,
    /// Integer that must not be negative.
    UnsignedInteger,
    /// UTF-8 string.
    String,
    /// Free-form JSON document.
    Json,
    /// Nested object.
    Object,
    /// List of nested objects.
    ObjectArray,
}

impl FieldType {
    /// Name used in type mismatch reports.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Array => "array",
            FieldType::Boolean => "boolean",
            FieldType::Double => "double",
            FieldType::Integer => "integer",
            FieldType::UnsignedInteger => "unsigned integer",
            FieldType::String => "string",
            FieldType::Json => "json",
            FieldType::Object => "object",
            FieldType::ObjectArray => "object array",
        }
    }

    /// Whether the type holds an integer.
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::UnsignedInteger)
    }

    /// Whether values of this type are collections.
    pub fn is_collection(&self) -> bool {
        matches!(self, FieldType::Array | FieldType::ObjectArray)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
