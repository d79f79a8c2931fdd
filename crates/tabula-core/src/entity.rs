//! Entity instances.

use crate::catalog::Schema;
use std::sync::Arc;
use tabula_proto::{EntityId, FieldValues, Value};

/// One instance of an entity type.
///
/// Values are only assigned through the session's validated setters or by
/// hydration from the store, so every held value already has its declared
/// type. An instance is either new (`exists_in_store == false`) or mirrors a
/// stored row with a stable primary key.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    values: FieldValues,
    exists_in_store: bool,
}

impl Entity {
    pub(crate) fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: FieldValues::new(),
            exists_in_store: false,
        }
    }

    pub(crate) fn hydrated(schema: Arc<Schema>, values: FieldValues) -> Self {
        Self {
            schema,
            values,
            exists_in_store: true,
        }
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        self.schema.entity_type()
    }

    /// The entity's schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Value currently held for a property.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Every held value.
    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    /// Whether the instance mirrors a stored row.
    pub fn exists_in_store(&self) -> bool {
        self.exists_in_store
    }

    /// Primary-key values, with `Null` for unset key fields.
    pub fn primary_key_values(&self) -> EntityId {
        EntityId::new(
            self.schema
                .primary_key()
                .iter()
                .map(|k| (k.clone(), self.values.get(k).cloned().unwrap_or(Value::Null)))
                .collect(),
        )
    }

    /// Whether every primary-key field holds a value.
    pub fn is_primary_key_set(&self) -> bool {
        self.primary_key_values().is_complete()
    }

    /// The primary key, once fully set.
    pub fn id(&self) -> Option<EntityId> {
        let id = self.primary_key_values();
        id.is_complete().then_some(id)
    }

    /// Values of the stored fields that have been set, keyed by column.
    pub(crate) fn field_row(&self) -> FieldValues {
        self.schema
            .fields()
            .iter()
            .filter_map(|f| self.values.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect()
    }

    pub(crate) fn set_raw(&mut self, property: &str, value: Value) {
        self.values.insert(property.to_string(), value);
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists_in_store = exists;
    }

    /// Mark as no longer stored and forget store-assigned key values.
    pub(crate) fn mark_deleted(&mut self) {
        self.exists_in_store = false;
        let cleared: Vec<String> = self
            .schema
            .primary_key()
            .iter()
            .filter(|k| self.schema.field(k).is_some_and(|f| f.autoincrement))
            .cloned()
            .collect();
        for key in cleared {
            self.values.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldType, PropertyDef, SchemaDef};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::build(
                "comment",
                SchemaDef::new("comments", ["comment_id"]),
                vec![
                    PropertyDef::field("comment_id", FieldType::UnsignedInteger)
                        .with_autoincrement(),
                    PropertyDef::field("body", FieldType::String),
                    PropertyDef::transient("preview", FieldType::String),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_primary_key_state() {
        let mut entity = Entity::new(schema());
        assert!(!entity.is_primary_key_set());
        assert!(entity.id().is_none());

        entity.set_raw("comment_id", Value::Int(4));
        assert_eq!(entity.id(), Some(EntityId::single("comment_id", 4i64)));
    }

    #[test]
    fn test_field_row_skips_transient() {
        let mut entity = Entity::new(schema());
        entity.set_raw("body", "hi".into());
        entity.set_raw("preview", "h".into());

        let row = entity.field_row();
        assert_eq!(row.len(), 1);
        assert!(row.contains_key("body"));
    }

    #[test]
    fn test_mark_deleted_clears_autoincrement_key() {
        let mut entity = Entity::hydrated(schema(), FieldValues::new());
        entity.set_raw("comment_id", Value::Int(9));
        entity.set_raw("body", "x".into());

        entity.mark_deleted();
        assert!(!entity.exists_in_store());
        assert!(entity.get("comment_id").is_none());
        assert_eq!(entity.get("body"), Some(&Value::from("x")));
    }
}
