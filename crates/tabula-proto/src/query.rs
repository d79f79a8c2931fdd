//! Select IR handed to the relational store.
//!
//! The engine only ever issues conjunctive equality selects over a fixed
//! table shape, so this is deliberately small: tables (optionally aliased),
//! projected columns, equality conditions, inner joins and ordering.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table alias (or table name) qualifying the column.
    pub table: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// An unqualified column.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// A column qualified by a table alias.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// Parse `alias.column` or `column`.
    pub fn parse(s: &str) -> Self {
        match s.trim().split_once('.') {
            Some((table, column)) => Self::qualified(table.trim(), column.trim()),
            None => Self::new(s.trim()),
        }
    }

    /// Qualify with `alias` unless the column is already qualified.
    pub fn or_qualified(mut self, alias: Option<&str>) -> Self {
        if self.table.is_none() {
            self.table = alias.map(str::to_string);
        }
        self
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// An equality condition on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column being compared.
    pub column: ColumnRef,
    /// Value the column must equal.
    pub value: Value,
    /// Compare strings without regard to case.
    pub ignore_case: bool,
}

impl Condition {
    /// `column = value`.
    pub fn eq(column: impl AsRef<str>, value: impl Into<Value>) -> Self {
        Self {
            column: ColumnRef::parse(column.as_ref()),
            value: value.into(),
            ignore_case: false,
        }
    }

    /// `column = value`, comparing strings case-insensitively.
    pub fn eq_ignore_case(column: impl AsRef<str>, value: impl Into<Value>) -> Self {
        Self {
            ignore_case: true,
            ..Self::eq(column, value)
        }
    }

    /// Qualify the column with a table alias unless already qualified.
    pub fn qualified(mut self, alias: Option<&str>) -> Self {
        self.column = self.column.or_qualified(alias);
        self
    }
}

/// A table in a select, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Alias used to qualify columns of this table.
    pub alias: Option<String>,
    /// Physical table name.
    pub table: String,
}

impl TableRef {
    /// An unaliased table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            alias: None,
            table: table.into(),
        }
    }

    /// An aliased table.
    pub fn aliased(alias: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            table: table.into(),
        }
    }

    /// The name columns of this table are qualified with.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// An inner join of an aliased table on column equalities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Qualifier of the joined table (must match a [`TableRef`] in the select).
    pub alias: String,
    /// Pairs of columns that must be equal.
    pub on: Vec<(ColumnRef, ColumnRef)>,
}

impl JoinSpec {
    /// Create an inner join for the table with the given qualifier.
    pub fn inner(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            on: Vec::new(),
        }
    }

    /// Add an `left = right` join condition.
    pub fn on(mut self, left: ColumnRef, right: ColumnRef) -> Self {
        self.on.push((left, right));
        self
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Ordering specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Column to order by.
    pub column: ColumnRef,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create ascending order.
    pub fn asc(column: impl AsRef<str>) -> Self {
        Self {
            column: ColumnRef::parse(column.as_ref()),
            direction: OrderDirection::Asc,
        }
    }

    /// Create descending order.
    pub fn desc(column: impl AsRef<str>) -> Self {
        Self {
            column: ColumnRef::parse(column.as_ref()),
            direction: OrderDirection::Desc,
        }
    }

    /// Qualify the column with a table alias unless already qualified.
    pub fn qualified(mut self, alias: Option<&str>) -> Self {
        self.column = self.column.or_qualified(alias);
        self
    }
}

/// Extra select options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptions {
    /// Ordering.
    pub order_by: Vec<OrderSpec>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

impl SelectOptions {
    /// Whether no option is set.
    pub fn is_empty(&self) -> bool {
        self.order_by.is_empty() && self.limit.is_none() && self.offset.is_none()
    }

    /// Add an ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Limit the number of rows.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Overlay `other` on top of these options (other wins where set).
    pub fn merged(&self, other: &SelectOptions) -> SelectOptions {
        SelectOptions {
            order_by: if other.order_by.is_empty() {
                self.order_by.clone()
            } else {
                other.order_by.clone()
            },
            limit: other.limit.or(self.limit),
            offset: other.offset.or(self.offset),
        }
    }
}

/// A select against one or more tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    /// Tables in the select. The first is the driving table.
    pub tables: Vec<TableRef>,
    /// Projected columns. Empty means every column.
    pub columns: Vec<ColumnRef>,
    /// Conjunctive equality conditions.
    pub conditions: Vec<Condition>,
    /// Ordering and paging.
    pub options: SelectOptions,
    /// Inner joins.
    pub joins: Vec<JoinSpec>,
}

impl SelectQuery {
    /// Select every column from one table.
    pub fn from(table: impl Into<String>) -> Self {
        Self::from_tables(vec![TableRef::new(table)])
    }

    /// Select from several tables.
    pub fn from_tables(tables: Vec<TableRef>) -> Self {
        Self {
            tables,
            columns: Vec::new(),
            conditions: Vec::new(),
            options: SelectOptions::default(),
            joins: Vec::new(),
        }
    }

    /// Set the projected columns.
    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnRef>) -> Self {
        self.columns = columns.into_iter().collect();
        self
    }

    /// Add conditions.
    pub fn filter(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Set the options.
    pub fn options(mut self, options: SelectOptions) -> Self {
        self.options = options;
        self
    }

    /// Add joins.
    pub fn joins(mut self, joins: impl IntoIterator<Item = JoinSpec>) -> Self {
        self.joins.extend(joins);
        self
    }

    /// Restrict to a single row.
    pub fn single(mut self) -> Self {
        self.options.limit = Some(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_parse() {
        assert_eq!(ColumnRef::parse("t1.page_id"), ColumnRef::qualified("t1", "page_id"));
        assert_eq!(ColumnRef::parse("page_id"), ColumnRef::new("page_id"));
        assert_eq!(ColumnRef::parse("t1.page_id").to_string(), "t1.page_id");
    }

    #[test]
    fn test_qualification_keeps_existing_alias() {
        let col = ColumnRef::parse("t2.name").or_qualified(Some("t1"));
        assert_eq!(col.table.as_deref(), Some("t2"));

        let col = ColumnRef::new("name").or_qualified(Some("t1"));
        assert_eq!(col.table.as_deref(), Some("t1"));
    }

    #[test]
    fn test_options_merge() {
        let base = SelectOptions::default().with_order(OrderSpec::asc("title"));
        let extra = SelectOptions::default().with_limit(5);
        let merged = base.merged(&extra);

        assert_eq!(merged.order_by.len(), 1);
        assert_eq!(merged.limit, Some(5));
        assert!(SelectOptions::default().is_empty());
        assert!(!merged.is_empty());
    }

    #[test]
    fn test_select_builder() {
        let query = SelectQuery::from("users")
            .columns([ColumnRef::new("user_id")])
            .filter([Condition::eq("email", "a@example.com")])
            .single();

        assert_eq!(query.tables[0].qualifier(), "users");
        assert_eq!(query.options.limit, Some(1));
        assert_eq!(query.conditions.len(), 1);
    }
}
