//! Unique-group enforcement.

use crate::catalog::Schema;
use crate::store::{RelationalStore, StoreResult};
use tabula_proto::{ColumnRef, Condition, EntityId, FieldValues, Row, SelectQuery};

/// Checks unique field groups against the rows already in the store.
pub struct UniqueChecker<'a> {
    store: &'a dyn RelationalStore,
}

impl<'a> UniqueChecker<'a> {
    /// Create a checker over a store.
    pub fn new(store: &'a dyn RelationalStore) -> Self {
        Self { store }
    }

    /// Find the first unique group whose values are taken by another row.
    ///
    /// Groups with an empty member are skipped. A row whose primary key
    /// equals `own_id` is the entity itself and never conflicts. String
    /// values compare without regard to case.
    pub fn find_conflict(
        &self,
        schema: &Schema,
        values: &FieldValues,
        own_id: Option<&EntityId>,
    ) -> StoreResult<Option<Vec<String>>> {
        for group in schema.unique_fields() {
            if let Some(taken) = self.group_conflicts(schema, group, values, own_id)? {
                if taken {
                    return Ok(Some(group.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Every unique group whose values are taken by another row.
    pub fn all_conflicts(
        &self,
        schema: &Schema,
        values: &FieldValues,
        own_id: Option<&EntityId>,
    ) -> StoreResult<Vec<Vec<String>>> {
        let mut conflicts = Vec::new();
        for group in schema.unique_fields() {
            if self.group_conflicts(schema, group, values, own_id)? == Some(true) {
                conflicts.push(group.clone());
            }
        }
        Ok(conflicts)
    }

    /// `None` when the group cannot be checked because a member is empty.
    fn group_conflicts(
        &self,
        schema: &Schema,
        group: &[String],
        values: &FieldValues,
        own_id: Option<&EntityId>,
    ) -> StoreResult<Option<bool>> {
        let mut conditions = Vec::with_capacity(group.len());
        for field in group {
            match values.get(field) {
                Some(value) if !value.is_empty() => {
                    conditions.push(Condition::eq_ignore_case(field, value.clone()))
                }
                _ => return Ok(None),
            }
        }

        let query = SelectQuery::from(schema.table_name())
            .columns(schema.primary_key().iter().map(ColumnRef::new))
            .filter(conditions);
        let rows = self.store.select(&query)?;
        Ok(Some(rows.iter().any(|row| !is_same_entity(schema, row, own_id))))
    }
}

fn is_same_entity(schema: &Schema, row: &Row, own_id: Option<&EntityId>) -> bool {
    let Some(own_id) = own_id else {
        return false;
    };
    schema.primary_key().iter().all(|field| {
        match (row.get(field), own_id.get(field)) {
            (Some(a), Some(b)) => a.eq_ignore_case(b),
            _ => false,
        }
    })
}
