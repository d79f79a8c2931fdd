//! Tabula Core - schema-driven entity lifecycle engine.
//!
//! Entity types are declared once through an [`EntityDescriptor`]; the
//! [`Engine`] then loads, validates, persists and deletes their instances
//! against a [`RelationalStore`], keeping a [`CacheLayer`] consistent through
//! per-session tombstones and commit-deferred key deletion.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod constraint;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod relation;
pub mod security;
pub mod store;

pub use cache::{CacheKey, CacheLayer, CachedValue, MemoryCache, TombstoneSet};
pub use catalog::{
    EntityDescriptor, FieldType, PropertyDef, QueryShape, RelationDef, RelationshipKind, Schema,
    SchemaDef, SchemaError, SchemaRegistry,
};
pub use config::EngineConfig;
pub use constraint::Validator;
pub use entity::Entity;
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::{CascadePlan, Engine, EngineBuilder, Mode, PlannedMutation, Session};
pub use relation::RelationshipResolver;
pub use security::{AccessControl, Action, AllowAll, CapabilityAccess};
pub use store::{MemoryStore, RelationalStore, StoreError};

/// Re-export protocol types.
pub use tabula_proto as proto;
