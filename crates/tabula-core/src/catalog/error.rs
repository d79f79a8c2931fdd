//! Schema definition errors.

use super::property::PropertySource;
use thiserror::Error;

/// A defect in an entity descriptor, detected once at registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("entity type {0} is not registered")]
    UnknownEntity(String),

    #[error("{entity}: table name is empty")]
    EmptyTable { entity: String },

    #[error("{entity}: no primary key declared")]
    MissingPrimaryKey { entity: String },

    #[error("{entity}: property {property} declared twice")]
    DuplicateProperty { entity: String, property: String },

    #[error("{entity}: unknown property {property}")]
    UnknownProperty { entity: String, property: String },

    #[error("{entity}: {property} is not a field-sourced property")]
    NotAField { entity: String, property: String },

    #[error("{entity}: invalid validator on {property}: {reason}")]
    InvalidValidator {
        entity: String,
        property: String,
        reason: String,
    },

    #[error("{entity}: relationship {relationship} requires {expected}-sourced property {property}")]
    SourceMismatch {
        entity: String,
        relationship: String,
        property: String,
        expected: PropertySource,
    },

    #[error("{entity}: relationship {relationship} must name exactly one property")]
    SinglePropertyRequired { entity: String, relationship: String },

    #[error("{entity}: relationship {relationship} declares more than one related property")]
    TooManyRelatedProperties { entity: String, relationship: String },

    #[error("{entity}: relationship {relationship} declared twice")]
    DuplicateRelationship { entity: String, relationship: String },

    #[error("{entity}: many-to-many relationship {relationship} has no junction table")]
    MissingJunctionTable { entity: String, relationship: String },

    #[error("{entity}: relationship property {property} is not backed by a relationship")]
    UnboundRelationshipProperty { entity: String, property: String },

    #[error("{entity}: query shape must start with table {table}")]
    QueryShapeTable { entity: String, table: String },

    #[error("{entity}: relationship {relationship} references unregistered type {related}")]
    UnknownRelatedEntity {
        entity: String,
        relationship: String,
        related: String,
    },

    #[error("{entity}: relationship {relationship} references unknown property {related}.{property}")]
    UnknownRelatedProperty {
        entity: String,
        relationship: String,
        related: String,
        property: String,
    },

    #[error("{entity}: relationship {relationship} key columns do not match the referenced primary key")]
    ForeignKeyArity { entity: String, relationship: String },

    #[error("{entity}: many-to-many relationship {relationship} endpoints share primary-key field names")]
    OverlappingJunctionKeys { entity: String, relationship: String },
}
