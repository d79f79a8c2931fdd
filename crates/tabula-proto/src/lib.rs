//! Tabula protocol types.
//!
//! This crate defines the data-plane types that flow between the Tabula
//! engine and the collaborators it drives (relational store, cache layer).
//!
//! # Modules
//!
//! - [`value`] - Runtime values, rows and field-value sets
//! - [`id`] - Entity identifiers (ordered primary-key value sets)
//! - [`query`] - Select IR: tables, columns, conjunctive equality conditions, joins

pub mod id;
pub mod query;
pub mod value;

pub use id::EntityId;
pub use query::{
    ColumnRef, Condition, JoinSpec, OrderDirection, OrderSpec, SelectOptions, SelectQuery,
    TableRef,
};
pub use value::{FieldValues, Row, Value};
