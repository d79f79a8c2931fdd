//! In-memory relational store.

use super::{CommitHook, RelationalStore, StoreError, StoreResult};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tabula_proto::{ColumnRef, Condition, OrderDirection, Row, SelectQuery, Value};
use tracing::debug;

/// Kind of mutating store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// One mutating call, as seen by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// Kind of call.
    pub operation: Operation,
    /// Target table.
    pub table: String,
    /// Inserted or assigned values.
    pub values: Row,
    /// Row-selecting conditions (update and delete).
    pub conditions: Vec<Condition>,
    /// Rows affected.
    pub affected: u64,
}

#[derive(Debug, Clone, Default)]
struct Table {
    autoincrement: Option<String>,
    next_id: i64,
    rows: Vec<Row>,
}

struct Transaction {
    depth: usize,
    snapshot: HashMap<String, Table>,
    hooks: Vec<CommitHook>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    tx: Option<Transaction>,
    last_insert_id: Option<Value>,
    faults: HashSet<(Operation, String)>,
    log: Vec<MutationRecord>,
}

/// A relational store held in process memory.
///
/// Tables must be created before use. Atomic sections nest: the outermost
/// commit runs the registered hooks, and a rollback at any depth restores the
/// state captured when the outermost section opened.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    mutations: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table.
    pub fn create_table(&self, name: &str) {
        self.state
            .lock()
            .tables
            .entry(name.to_string())
            .or_insert_with(|| Table {
                next_id: 1,
                ..Default::default()
            });
    }

    /// Create a table whose `column` is assigned on insert when left empty.
    pub fn create_table_with_autoincrement(&self, name: &str, column: &str) {
        self.state.lock().tables.insert(
            name.to_string(),
            Table {
                autoincrement: Some(column.to_string()),
                next_id: 1,
                rows: Vec::new(),
            },
        );
    }

    /// All rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Number of mutating calls received, including failed ones.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(AtomicOrdering::Relaxed)
    }

    /// Log of mutating calls received.
    pub fn mutations(&self) -> Vec<MutationRecord> {
        self.state.lock().log.clone()
    }

    /// Clear the mutation log and counter.
    pub fn clear_mutations(&self) {
        self.state.lock().log.clear();
        self.mutations.store(0, AtomicOrdering::Relaxed);
    }

    /// Make every `operation` on `table` affect no rows.
    pub fn fail_on(&self, operation: Operation, table: &str) {
        self.state
            .lock()
            .faults
            .insert((operation, table.to_string()));
    }

    /// Remove injected faults.
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Whether an atomic section is open.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().tx.is_some()
    }

    fn record(
        &self,
        state: &mut State,
        operation: Operation,
        table: &str,
        values: Row,
        conditions: &[Condition],
        affected: u64,
    ) {
        self.mutations.fetch_add(1, AtomicOrdering::Relaxed);
        state.log.push(MutationRecord {
            operation,
            table: table.to_string(),
            values,
            conditions: conditions.to_vec(),
            affected,
        });
    }
}

impl RelationalStore for MemoryStore {
    fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>> {
        let state = self.state.lock();
        run_select(&state.tables, query)
    }

    fn insert(&self, table: &str, values: &Row) -> StoreResult<u64> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let faulted = state.faults.contains(&(Operation::Insert, table.to_string()));
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        if faulted {
            self.record(state, Operation::Insert, table, values.clone(), &[], 0);
            return Ok(0);
        }

        let mut row = values.clone();
        if let Some(column) = target.autoincrement.clone() {
            let assigned = match row.get(&column).and_then(Value::as_i64) {
                Some(explicit) => explicit,
                None => target.next_id,
            };
            target.next_id = target.next_id.max(assigned + 1);
            row.insert(column, Value::Int(assigned));
            state.last_insert_id = Some(Value::Int(assigned));
        }
        target.rows.push(row.clone());
        self.record(state, Operation::Insert, table, row, &[], 1);
        Ok(1)
    }

    fn update(&self, table: &str, values: &Row, conditions: &[Condition]) -> StoreResult<u64> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let faulted = state.faults.contains(&(Operation::Update, table.to_string()));
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let mut affected = 0;
        if !faulted {
            for row in target.rows.iter_mut().filter(|r| row_matches(r, conditions)) {
                for (column, value) in values {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        self.record(state, Operation::Update, table, values.clone(), conditions, affected);
        Ok(affected)
    }

    fn delete(&self, table: &str, conditions: &[Condition]) -> StoreResult<u64> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let faulted = state.faults.contains(&(Operation::Delete, table.to_string()));
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let mut affected = 0;
        if !faulted {
            let before = target.rows.len();
            target.rows.retain(|r| !row_matches(r, conditions));
            affected = (before - target.rows.len()) as u64;
        }
        self.record(state, Operation::Delete, table, Row::new(), conditions, affected);
        Ok(affected)
    }

    fn last_insert_id(&self) -> Option<Value> {
        self.state.lock().last_insert_id.clone()
    }

    fn table_exists(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(table)
    }

    fn begin_atomic(&self) -> StoreResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.tx.as_mut() {
            Some(tx) => tx.depth += 1,
            None => {
                state.tx = Some(Transaction {
                    depth: 1,
                    snapshot: state.tables.clone(),
                    hooks: Vec::new(),
                })
            }
        }
        Ok(())
    }

    fn commit_atomic(&self) -> StoreResult<()> {
        let hooks = {
            let mut guard = self.state.lock();
            let tx = guard.tx.as_mut().ok_or(StoreError::NoTransaction)?;
            tx.depth -= 1;
            if tx.depth > 0 {
                return Ok(());
            }
            guard.tx.take().map(|tx| tx.hooks).unwrap_or_default()
        };

        debug!(hooks = hooks.len(), "committed atomic section");
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    fn rollback_atomic(&self) -> StoreResult<()> {
        let mut guard = self.state.lock();
        let tx = guard.tx.take().ok_or(StoreError::NoTransaction)?;
        debug!(
            discarded_hooks = tx.hooks.len(),
            "rolled back atomic section"
        );
        guard.tables = tx.snapshot;
        Ok(())
    }

    fn on_commit(&self, hook: CommitHook) {
        let pending = {
            let mut guard = self.state.lock();
            match guard.tx.as_mut() {
                Some(tx) => {
                    tx.hooks.push(hook);
                    None
                }
                None => Some(hook),
            }
        };
        if let Some(hook) = pending {
            hook();
        }
    }
}

fn row_matches(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| {
        let value = row.get(&c.column.column).unwrap_or(&Value::Null);
        value_matches(value, c)
    })
}

fn value_matches(value: &Value, condition: &Condition) -> bool {
    if condition.value.is_null() {
        value.is_null()
    } else if condition.ignore_case {
        value.eq_ignore_case(&condition.value)
    } else {
        value.loose_eq(&condition.value)
    }
}

/// A table in a select, with the name its columns are qualified by.
struct Source<'a> {
    qualifier: &'a str,
    table_name: &'a str,
    table: &'a Table,
}

fn resolve(sources: &[Source<'_>], combo: &[&Row], column: &ColumnRef) -> StoreResult<Value> {
    match &column.table {
        Some(qualifier) => {
            let index = sources
                .iter()
                .position(|s| s.qualifier == qualifier || s.table_name == qualifier)
                .ok_or_else(|| StoreError::UnknownQualifier {
                    qualifier: qualifier.clone(),
                    column: column.column.clone(),
                })?;
            Ok(combo[index]
                .get(&column.column)
                .cloned()
                .unwrap_or(Value::Null))
        }
        None => Ok(combo
            .iter()
            .find_map(|row| row.get(&column.column))
            .cloned()
            .unwrap_or(Value::Null)),
    }
}

fn run_select(tables: &HashMap<String, Table>, query: &SelectQuery) -> StoreResult<Vec<Row>> {
    let mut sources = Vec::with_capacity(query.tables.len());
    for table_ref in &query.tables {
        let table = tables
            .get(&table_ref.table)
            .ok_or_else(|| StoreError::UnknownTable(table_ref.table.clone()))?;
        sources.push(Source {
            qualifier: table_ref.qualifier(),
            table_name: &table_ref.table,
            table,
        });
    }
    if sources.is_empty() {
        return Ok(Vec::new());
    }

    let mut combos: Vec<Vec<&Row>> = vec![Vec::new()];
    for source in &sources {
        let mut next = Vec::with_capacity(combos.len() * source.table.rows.len());
        for combo in &combos {
            for row in &source.table.rows {
                let mut extended = combo.clone();
                extended.push(row);
                next.push(extended);
            }
        }
        combos = next;
    }

    let mut matched = Vec::new();
    'combos: for combo in combos {
        for join in &query.joins {
            for (left, right) in &join.on {
                let l = resolve(&sources, &combo, left)?;
                let r = resolve(&sources, &combo, right)?;
                if l.is_null() || !l.loose_eq(&r) {
                    continue 'combos;
                }
            }
        }
        for condition in &query.conditions {
            let value = resolve(&sources, &combo, &condition.column)?;
            if !value_matches(&value, condition) {
                continue 'combos;
            }
        }

        let mut sort_key = Vec::with_capacity(query.options.order_by.len());
        for order in &query.options.order_by {
            sort_key.push(resolve(&sources, &combo, &order.column)?);
        }
        matched.push((sort_key, combo));
    }

    if !query.options.order_by.is_empty() {
        matched.sort_by(|(a, _), (b, _)| {
            for (i, order) in query.options.order_by.iter().enumerate() {
                let ordering = a[i].compare(&b[i]).unwrap_or(Ordering::Equal);
                let ordering = match order.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let offset = query.options.offset.unwrap_or(0);
    let limit = query.options.limit.unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    for (_, combo) in matched.into_iter().skip(offset).take(limit) {
        if query.columns.is_empty() {
            rows.push(combo[0].clone());
            continue;
        }
        let mut row = Row::new();
        for column in &query.columns {
            row.insert(column.column.clone(), resolve(&sources, &combo, column)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tabula_proto::{JoinSpec, OrderSpec, SelectOptions, TableRef};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn tag_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("tags");
        store.create_table("post_tags");
        for (id, label) in [("t1", "rust"), ("t2", "go"), ("t3", "zig")] {
            store
                .insert("tags", &row(&[("tag_id", id.into()), ("label", label.into())]))
                .unwrap();
        }
        for tag in ["t1", "t3"] {
            store
                .insert(
                    "post_tags",
                    &row(&[("post_id", "p1".into()), ("tag_id", tag.into())]),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_autoincrement() {
        let store = MemoryStore::new();
        store.create_table_with_autoincrement("users", "user_id");

        store.insert("users", &row(&[("name", "ada".into())])).unwrap();
        assert_eq!(store.last_insert_id(), Some(Value::Int(1)));
        store
            .insert("users", &row(&[("user_id", Value::Int(10)), ("name", "bob".into())]))
            .unwrap();
        store.insert("users", &row(&[("name", "cy".into())])).unwrap();
        assert_eq!(store.last_insert_id(), Some(Value::Int(11)));
        assert_eq!(store.row_count("users"), 3);
    }

    #[test]
    fn test_select_conditions_and_order() {
        let store = tag_store();
        let query = SelectQuery::from("tags").options(
            SelectOptions::default()
                .with_order(OrderSpec::desc("label"))
                .with_limit(2),
        );
        let rows = store.select(&query).unwrap();
        let labels: Vec<_> = rows.iter().map(|r| r["label"].to_string()).collect();
        assert_eq!(labels, vec!["zig", "rust"]);

        let query = SelectQuery::from("tags").filter([Condition::eq_ignore_case("label", "RUST")]);
        assert_eq!(store.select(&query).unwrap().len(), 1);
        let query = SelectQuery::from("tags").filter([Condition::eq("label", "RUST")]);
        assert!(store.select(&query).unwrap().is_empty());
    }

    #[test]
    fn test_aliased_join() {
        let store = tag_store();
        let query = SelectQuery::from_tables(vec![
            TableRef::aliased("t1", "tags"),
            TableRef::aliased("t2", "post_tags"),
        ])
        .columns([ColumnRef::parse("t1.tag_id")])
        .joins([JoinSpec::inner("t2").on(
            ColumnRef::parse("t1.tag_id"),
            ColumnRef::parse("t2.tag_id"),
        )])
        .filter([Condition::eq("t2.post_id", "p1")])
        .options(SelectOptions::default().with_order(OrderSpec::asc("t1.tag_id")));

        let rows = store.select(&query).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["tag_id"].to_string()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    #[test]
    fn test_unknown_table_and_qualifier() {
        let store = tag_store();
        assert_eq!(
            store.select(&SelectQuery::from("nope")).unwrap_err(),
            StoreError::UnknownTable("nope".into())
        );
        let query = SelectQuery::from("tags").filter([Condition::eq("x.label", "go")]);
        assert!(matches!(
            store.select(&query),
            Err(StoreError::UnknownQualifier { .. })
        ));
    }

    #[test]
    fn test_update_and_delete_counts() {
        let store = tag_store();
        let affected = store
            .update(
                "tags",
                &row(&[("label", "golang".into())]),
                &[Condition::eq("tag_id", "t2")],
            )
            .unwrap();
        assert_eq!(affected, 1);
        let removed = store
            .delete("post_tags", &[Condition::eq("post_id", "p1")])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.row_count("post_tags"), 0);
    }

    #[test]
    fn test_nested_commit_runs_hooks_once() {
        let store = tag_store();
        let fired = Arc::new(AtomicUsize::new(0));

        store.begin_atomic().unwrap();
        store.begin_atomic().unwrap();
        let counter = fired.clone();
        store.on_commit(Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        store.commit_atomic().unwrap();
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
        store.commit_atomic().unwrap();
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_rollback_restores_and_discards_hooks() {
        let store = tag_store();
        let fired = Arc::new(AtomicUsize::new(0));

        store.begin_atomic().unwrap();
        store.delete("tags", &[Condition::eq("tag_id", "t1")]).unwrap();
        let counter = fired.clone();
        store.on_commit(Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        store.rollback_atomic().unwrap();

        assert_eq!(store.row_count("tags"), 3);
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(store.rollback_atomic(), Err(StoreError::NoTransaction));
    }

    #[test]
    fn test_hook_without_transaction_runs_now() {
        let store = MemoryStore::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        store.on_commit(Box::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_fault_injection() {
        let store = tag_store();
        store.clear_mutations();
        store.fail_on(Operation::Delete, "tags");

        let affected = store.delete("tags", &[Condition::eq("tag_id", "t1")]).unwrap();
        assert_eq!(affected, 0);
        assert_eq!(store.row_count("tags"), 3);
        assert_eq!(store.mutation_count(), 1);
        assert_eq!(store.mutations()[0].operation, Operation::Delete);

        store.clear_faults();
        assert_eq!(store.delete("tags", &[Condition::eq("tag_id", "t1")]).unwrap(), 1);
    }
}
