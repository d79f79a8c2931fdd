//! Relational store interface.
//!
//! The engine drives any store that can run conjunctive equality selects,
//! single-table mutations reporting affected-row counts, and atomic sections
//! with commit hooks. [`MemoryStore`] is the in-process reference store.

mod memory;

pub use memory::{MemoryStore, MutationRecord, Operation};

use tabula_proto::{Condition, Row, SelectQuery, Value};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Table does not exist.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Column qualifier does not name a table in the select.
    #[error("unknown table qualifier {qualifier} in column {column}")]
    UnknownQualifier { qualifier: String, column: String },

    /// Commit or rollback without an open atomic section.
    #[error("no atomic section is open")]
    NoTransaction,

    /// Backend failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Callback run once the outermost atomic section commits.
pub type CommitHook = Box<dyn FnOnce() + Send>;

/// A relational store.
pub trait RelationalStore: Send + Sync {
    /// Run a select.
    fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>>;

    /// Run a select and return its first row.
    fn select_row(&self, query: &SelectQuery) -> StoreResult<Option<Row>> {
        Ok(self.select(&query.clone().single())?.into_iter().next())
    }

    /// Insert a row. Returns the number of rows inserted.
    fn insert(&self, table: &str, values: &Row) -> StoreResult<u64>;

    /// Update matching rows. Returns the number of rows changed.
    fn update(&self, table: &str, values: &Row, conditions: &[Condition]) -> StoreResult<u64>;

    /// Delete matching rows. Returns the number of rows removed.
    fn delete(&self, table: &str, conditions: &[Condition]) -> StoreResult<u64>;

    /// Value assigned to the autoincrement column by the last insert.
    fn last_insert_id(&self) -> Option<Value>;

    /// Whether a table is reachable.
    fn table_exists(&self, table: &str) -> bool;

    /// Open an atomic section. Sections nest.
    fn begin_atomic(&self) -> StoreResult<()>;

    /// Close an atomic section. Closing the outermost one commits.
    fn commit_atomic(&self) -> StoreResult<()>;

    /// Abort the open atomic sections, discarding their changes and hooks.
    fn rollback_atomic(&self) -> StoreResult<()>;

    /// Run `hook` after the outermost section commits, or now if none is open.
    fn on_commit(&self, hook: CommitHook);
}
