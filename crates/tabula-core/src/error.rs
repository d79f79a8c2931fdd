//! Core error types.

use crate::catalog::SchemaError;
use crate::security::Action;
use crate::store::StoreError;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], stable for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value was rejected by a validator, size limit or existence check.
    FailedValidation,
    /// A property name is not declared on the entity type.
    InvalidProperty,
    /// A unique-field group collides with another row.
    NotUnique,
    /// A required property has no value.
    RequiredMissing,
    /// A value cannot be coerced to the declared type.
    TypeMismatch,
    /// The access-control service refused the action.
    PermissionDenied,
    /// The entity does not exist.
    NotFound,
    /// An engine invariant was violated.
    InternalError,
    /// The relational store failed or affected an unexpected number of rows.
    StorageFailure,
    /// The entity schema is malformed.
    Schema,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Value rejected by a validator.
    #[error("{entity}.{property}: {message}")]
    FailedValidation {
        entity: String,
        property: String,
        message: String,
        detail: Option<String>,
    },

    /// Property not declared on the entity type.
    #[error("{entity} has no property {property}")]
    InvalidProperty { entity: String, property: String },

    /// Unique group already taken by another row.
    #[error("{entity} ({}) is not unique", fields.join(", "))]
    NotUnique { entity: String, fields: Vec<String> },

    /// Required property missing.
    #[error("{entity}.{property} is required")]
    RequiredMissing { entity: String, property: String },

    /// Value cannot be coerced to the declared type.
    #[error("{entity}.{property}: expected {expected}, found {found}")]
    TypeMismatch {
        entity: String,
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Access control refused the action.
    #[error("permission denied: {permission}")]
    PermissionDenied {
        entity: String,
        action: Action,
        permission: String,
    },

    /// Entity not found.
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// Engine invariant violated.
    #[error("internal error: {0}")]
    Internal(String),

    /// Store call failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Store mutation affected an unexpected number of rows.
    #[error("{operation} on {table} affected {affected} rows, expected 1")]
    AffectedRows {
        operation: &'static str,
        table: String,
        affected: u64,
    },

    /// Schema definition defect.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl Error {
    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FailedValidation { .. } => ErrorKind::FailedValidation,
            Error::InvalidProperty { .. } => ErrorKind::InvalidProperty,
            Error::NotUnique { .. } => ErrorKind::NotUnique,
            Error::RequiredMissing { .. } => ErrorKind::RequiredMissing,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Internal(_) => ErrorKind::InternalError,
            Error::Storage(_) | Error::AffectedRows { .. } => ErrorKind::StorageFailure,
            Error::Schema(_) => ErrorKind::Schema,
        }
    }

    /// The offending property (or comma-joined unique group), if any.
    pub fn property(&self) -> Option<String> {
        match self {
            Error::FailedValidation { property, .. }
            | Error::InvalidProperty { property, .. }
            | Error::RequiredMissing { property, .. }
            | Error::TypeMismatch { property, .. } => Some(property.clone()),
            Error::NotUnique { fields, .. } => Some(fields.join(",")),
            _ => None,
        }
    }

    /// Whether the error is a validation, permission or uniqueness outcome
    /// rather than a failure of the engine or its collaborators.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::InternalError | ErrorKind::StorageFailure | ErrorKind::Schema
        )
    }

    pub(crate) fn validation(
        entity: &str,
        property: &str,
        message: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        Error::FailedValidation {
            entity: entity.to_string(),
            property: property.to_string(),
            message: message.into(),
            detail,
        }
    }

    pub(crate) fn invalid_property(entity: &str, property: &str) -> Self {
        Error::InvalidProperty {
            entity: entity.to_string(),
            property: property.to_string(),
        }
    }

    pub(crate) fn required(entity: &str, property: &str) -> Self {
        Error::RequiredMissing {
            entity: entity.to_string(),
            property: property.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Error::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}
