//! Entity catalog.
//!
//! Declarative description of entity types: properties, stored fields,
//! primary key, unique groups, relationships and query shape, plus the
//! registry that validates and memoizes them.

mod error;
mod field;
mod property;
mod registry;
mod relation;
mod schema;
mod types;

pub use error::SchemaError;
pub use field::FieldDef;
pub use property::{Property, PropertyDef, PropertySource};
pub use registry::{EntityDescriptor, SchemaRegistry};
pub use relation::{RelationDef, RelationshipKind};
pub use schema::{QueryShape, Schema, SchemaDef};
pub use types::FieldType;
