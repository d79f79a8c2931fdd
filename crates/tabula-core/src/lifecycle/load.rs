//! Read path: cached lookups by unique group and condition queries.

use super::keys::query_key;
use super::Session;
use crate::cache::{CacheKey, CachedValue};
use crate::catalog::Schema;
use crate::constraint::{coerce, coerce_for};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::relation::row_to_id;
use std::sync::Arc;
use std::time::Duration;
use tabula_proto::{ColumnRef, Condition, EntityId, FieldValues, Row, SelectOptions, SelectQuery, Value};
use tracing::debug;

impl<'e> Session<'e> {
    /// Load an entity by primary key.
    pub fn get_from_id(&self, entity_type: &str, id: &EntityId) -> Result<Option<Entity>> {
        self.get_from_unique_group(entity_type, &id.to_field_values())
    }

    /// Load an entity by the values of one of its unique groups.
    ///
    /// Full values are cached only under the primary-key lookup. Any other
    /// group resolves to a primary key first (cached under the group's own
    /// key) and then loads by that key. String values match without regard
    /// to case.
    pub fn get_from_unique_group(
        &self,
        entity_type: &str,
        values: &FieldValues,
    ) -> Result<Option<Entity>> {
        let schema = self.schema(entity_type)?;
        let names: Vec<&str> = values.keys().map(String::as_str).collect();
        let group = schema
            .unique_group(&names)
            .ok_or_else(|| Error::invalid_property(entity_type, &names.join(",")))?
            .to_vec();

        let lookup = self.lookup_values(&schema, values)?;
        if lookup.values().any(Value::is_empty) {
            return Ok(None);
        }
        let key = CacheKey::derive(entity_type, &lookup);
        let conditions: Vec<Condition> = lookup
            .iter()
            .map(|(field, value)| Condition::eq_ignore_case(field, value.clone()))
            .collect();

        if group == schema.primary_key() {
            let cached = self.read_through(&key, &mut |_: &mut Duration| -> Result<Option<CachedValue>> {
                Ok(self
                    .load_full(&schema, conditions.clone())?
                    .map(CachedValue::Entity))
            })?;
            return match cached {
                Some(CachedValue::Entity(values)) => Ok(Some(Entity::hydrated(schema, values))),
                Some(other) => Err(unexpected(&key, &other)),
                None => Ok(None),
            };
        }

        let cached = self.read_through(&key, &mut |_: &mut Duration| -> Result<Option<CachedValue>> {
            let query = SelectQuery::from(schema.table_name())
                .columns(schema.primary_key().iter().map(ColumnRef::new))
                .filter(conditions.clone());
            match self.engine.store.select_row(&query)? {
                Some(row) => Ok(Some(CachedValue::Id(key_of(&schema, &row)?))),
                None => Ok(None),
            }
        })?;
        match cached {
            Some(CachedValue::Id(id)) => self.get_from_id(entity_type, &id),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    /// Load every entity matching equality conditions over the type's
    /// query shape.
    ///
    /// Only queries with at most one condition and no extra options are
    /// cached, as identifier lists. Anything else reads the store directly.
    pub fn get_all(
        &self,
        entity_type: &str,
        conditions: &FieldValues,
        options: &SelectOptions,
    ) -> Result<Vec<Entity>> {
        let schema = self.schema(entity_type)?;
        let lookup = self.lookup_values(&schema, conditions)?;

        let mut compute = |_: &mut Duration| -> Result<Option<CachedValue>> {
            let shape = schema.query_shape();
            let qualifier = shape.qualifier();
            let query = shape
                .select(
                    lookup
                        .iter()
                        .map(|(field, value)| Condition::eq(field, value.clone()))
                        .collect(),
                    options,
                )
                .columns(
                    schema
                        .primary_key()
                        .iter()
                        .map(|k| ColumnRef::new(k.as_str()).or_qualified(qualifier)),
                );
            let rows = self.engine.store.select(&query)?;
            let ids = rows
                .iter()
                .map(|row| key_of(&schema, row))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(CachedValue::Ids(ids)))
        };

        let cached = if options.is_empty() && lookup.len() <= 1 {
            let key = query_key(&schema, &lookup);
            self.read_through(&key, &mut compute)?
        } else {
            debug!(
                entity = entity_type,
                conditions = lookup.len(),
                "query not addressable by key, reading store"
            );
            compute(&mut Duration::ZERO)?
        };

        let ids = match cached {
            Some(CachedValue::Ids(ids)) => ids,
            Some(other) => return Err(unexpected(&query_key(&schema, &lookup), &other)),
            None => Vec::new(),
        };
        let mut entities = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(entity) = self.get_from_id(entity_type, id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Whether an entity with this primary key exists.
    pub fn id_exists(&self, entity_type: &str, id: &EntityId) -> Result<bool> {
        Ok(self.get_from_id(entity_type, id)?.is_some())
    }

    /// Whether the entity's row exists in the store. Updates the entity's
    /// stored flag to match.
    pub fn exists(&self, entity: &mut Entity) -> Result<bool> {
        let exists = match entity.id() {
            Some(id) => self.load_stored(entity.schema(), &id)?.is_some(),
            None => false,
        };
        entity.set_exists(exists);
        Ok(exists)
    }

    /// Stored field values of a row, read from the store.
    pub(crate) fn load_stored(&self, schema: &Schema, id: &EntityId) -> Result<Option<FieldValues>> {
        let query = SelectQuery::from(schema.table_name()).filter(id.to_conditions());
        self.engine
            .store
            .select_row(&query)?
            .map(|row| hydrate(schema, &row))
            .transpose()
    }

    /// A stored entity with field values only.
    pub(crate) fn load_entity(&self, schema: &Arc<Schema>, id: &EntityId) -> Result<Option<Entity>> {
        Ok(self
            .load_stored(schema, id)?
            .map(|values| Entity::hydrated(Arc::clone(schema), values)))
    }

    /// Field values plus autoloaded relationships of the row matching
    /// `conditions`.
    fn load_full(&self, schema: &Schema, conditions: Vec<Condition>) -> Result<Option<FieldValues>> {
        let query = SelectQuery::from(schema.table_name()).filter(conditions);
        let Some(row) = self.engine.store.select_row(&query)? else {
            debug!(entity = schema.entity_type(), "no row for lookup");
            return Ok(None);
        };
        let mut values = hydrate(schema, &row)?;
        self.resolver().autoload(schema, &mut values)?;
        Ok(Some(values))
    }

    /// Coerce lookup values to the declared types of their fields.
    fn lookup_values(&self, schema: &Schema, values: &FieldValues) -> Result<FieldValues> {
        values
            .iter()
            .map(|(name, value)| {
                let property = schema
                    .property(name)
                    .filter(|p| p.is_field())
                    .ok_or_else(|| Error::invalid_property(schema.entity_type(), name))?;
                Ok((name.clone(), coerce_for(schema.entity_type(), property, value.clone())?))
            })
            .collect()
    }
}

/// Coerce a stored row to the declared field types.
pub(crate) fn hydrate(schema: &Schema, row: &Row) -> Result<FieldValues> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let raw = row.get(&field.name).cloned().unwrap_or(Value::Null);
            let value = coerce(field.field_type, raw).map_err(|m| Error::TypeMismatch {
                entity: schema.entity_type().to_string(),
                property: field.name.clone(),
                expected: m.expected,
                found: m.found,
            })?;
            Ok((field.name.clone(), value))
        })
        .collect()
}

fn key_of(schema: &Schema, row: &Row) -> Result<EntityId> {
    row_to_id(schema, row).map_err(|(field, m)| Error::TypeMismatch {
        entity: schema.entity_type().to_string(),
        property: field,
        expected: m.expected,
        found: m.found,
    })
}

fn unexpected(key: &CacheKey, value: &CachedValue) -> Error {
    Error::Internal(format!("unexpected cached value under {}: {:?}", key, value))
}
