//! Materializes relationship values from the store.

use super::{foreign_key_columns, ids_to_value, row_to_id, value_to_id};
use crate::catalog::{RelationDef, RelationshipKind, Schema, SchemaRegistry};
use crate::error::{Error, Result};
use crate::store::RelationalStore;
use std::collections::BTreeMap;
use tabula_proto::{
    ColumnRef, Condition, EntityId, FieldValues, JoinSpec, OrderSpec, SelectOptions, SelectQuery,
    TableRef, Value,
};
use tracing::debug;

/// Alias of the related table in junction selects.
const RELATED_ALIAS: &str = "t1";
/// Alias of the junction table in junction selects.
const JUNCTION_ALIAS: &str = "t2";

/// Resolves relationship values for instances of registered entity types.
pub struct RelationshipResolver<'a> {
    registry: &'a SchemaRegistry,
    store: &'a dyn RelationalStore,
}

impl<'a> RelationshipResolver<'a> {
    /// Create a resolver over a registry and store.
    pub fn new(registry: &'a SchemaRegistry, store: &'a dyn RelationalStore) -> Self {
        Self { registry, store }
    }

    /// The value of a relationship's property for an instance.
    ///
    /// One-to-one and one-to-many values are the instance's own field values.
    /// Many-to-one and many-to-many values are arrays of related identifiers
    /// read from the store.
    pub fn resolve(
        &self,
        schema: &Schema,
        values: &FieldValues,
        relationship: &RelationDef,
    ) -> Result<Value> {
        match relationship.kind {
            RelationshipKind::OneToOne | RelationshipKind::OneToMany => {
                Ok(match relationship.property_names.as_slice() {
                    [property] => values.get(property).cloned().unwrap_or(Value::Null),
                    properties => Value::Array(
                        properties
                            .iter()
                            .map(|p| values.get(p).cloned().unwrap_or(Value::Null))
                            .collect(),
                    ),
                })
            }
            RelationshipKind::ManyToOne | RelationshipKind::ManyToMany => Ok(ids_to_value(
                &self.related_ids(schema, values, relationship)?,
            )),
        }
    }

    /// Identifiers of the entities currently related to an instance.
    ///
    /// An instance without a complete primary key has no related rows.
    /// A row whose key fails coercion fails the whole call.
    pub fn related_ids(
        &self,
        schema: &Schema,
        values: &FieldValues,
        relationship: &RelationDef,
    ) -> Result<Vec<EntityId>> {
        let related = self.registry.schema(&relationship.related_entity)?;
        let ids = match relationship.kind {
            RelationshipKind::OneToOne | RelationshipKind::OneToMany => self
                .referenced_id(schema, values, relationship)?
                .into_iter()
                .collect(),
            RelationshipKind::ManyToOne => match own_id(schema, values) {
                Some(own) => self.select_ids(&related, referencing_query(schema, &related, relationship, &own))?,
                None => Vec::new(),
            },
            RelationshipKind::ManyToMany => match own_id(schema, values) {
                Some(own) => {
                    let query = junction_query(&related, relationship, &own).ok_or_else(|| {
                        Error::Internal(format!(
                            "{} relationship {} has no junction table",
                            schema.entity_type(),
                            relationship.id()
                        ))
                    })?;
                    self.select_ids(&related, query)?
                }
                None => Vec::new(),
            },
        };

        debug!(
            entity = schema.entity_type(),
            relationship = %relationship.id(),
            kind = %relationship.kind,
            related = ids.len(),
            "resolved relationship"
        );
        Ok(ids)
    }

    /// Identifier referenced by a one-to-one or one-to-many relationship's
    /// fields, or `None` when any of them is empty.
    pub fn referenced_id(
        &self,
        schema: &Schema,
        values: &FieldValues,
        relationship: &RelationDef,
    ) -> Result<Option<EntityId>> {
        let related = self.registry.schema(&relationship.related_entity)?;
        let mut members = BTreeMap::new();
        for (property, key) in relationship
            .property_names
            .iter()
            .zip(related.primary_key().iter())
        {
            match values.get(property) {
                Some(value) if !value.is_empty() => {
                    members.insert(key.clone(), value.clone());
                }
                _ => return Ok(None),
            }
        }

        let raw = match relationship.property_names.as_slice() {
            [property] => values.get(property).cloned().unwrap_or(Value::Null),
            _ => Value::Object(members),
        };
        value_to_id(&related, &raw).map(Some).map_err(|m| Error::TypeMismatch {
            entity: schema.entity_type().to_string(),
            property: relationship.property().to_string(),
            expected: m.expected,
            found: m.found,
        })
    }

    /// Resolve every autoloaded computed relationship into `values`.
    pub fn autoload(&self, schema: &Schema, values: &mut FieldValues) -> Result<()> {
        for relationship in schema
            .relationships()
            .iter()
            .filter(|r| r.autoload && r.kind.is_computed())
        {
            let value = self.resolve(schema, values, relationship)?;
            values.insert(relationship.property().to_string(), value);
        }
        Ok(())
    }

    fn select_ids(&self, related: &Schema, query: SelectQuery) -> Result<Vec<EntityId>> {
        let rows = self.store.select(&query)?;
        rows.iter()
            .map(|row| {
                row_to_id(related, row).map_err(|(field, m)| Error::TypeMismatch {
                    entity: related.entity_type().to_string(),
                    property: field,
                    expected: m.expected,
                    found: m.found,
                })
            })
            .collect()
    }
}

fn own_id(schema: &Schema, values: &FieldValues) -> Option<EntityId> {
    let id = EntityId::new(
        schema
            .primary_key()
            .iter()
            .map(|k| (k.clone(), values.get(k).cloned().unwrap_or(Value::Null)))
            .collect(),
    );
    id.is_complete().then_some(id)
}

/// Default ordering of the related type, re-qualified for `alias`.
fn related_order(related: &Schema, alias: Option<&str>) -> SelectOptions {
    SelectOptions {
        order_by: related
            .query_shape()
            .options
            .order_by
            .iter()
            .map(|order| OrderSpec {
                column: ColumnRef::new(order.column.column.clone()).or_qualified(alias),
                direction: order.direction,
            })
            .collect(),
        ..Default::default()
    }
}

/// Rows of the related table whose foreign-key columns hold `own`.
fn referencing_query(
    schema: &Schema,
    related: &Schema,
    relationship: &RelationDef,
    own: &EntityId,
) -> SelectQuery {
    let conditions = foreign_key_columns(schema, relationship)
        .into_iter()
        .zip(own.values())
        .map(|(column, value)| Condition::eq(column, value.clone()));

    SelectQuery::from(related.table_name())
        .columns(related.primary_key().iter().map(ColumnRef::new))
        .filter(conditions)
        .options(related_order(related, None))
}

/// Related rows joined through the junction table on the related key and
/// filtered by `own` on the junction side.
fn junction_query(related: &Schema, relationship: &RelationDef, own: &EntityId) -> Option<SelectQuery> {
    let junction = relationship.junction_table.as_deref()?;
    let join = related.primary_key().iter().fold(JoinSpec::inner(JUNCTION_ALIAS), |join, key| {
        join.on(
            ColumnRef::qualified(RELATED_ALIAS, key.as_str()),
            ColumnRef::qualified(JUNCTION_ALIAS, key.as_str()),
        )
    });
    let conditions = own
        .parts()
        .iter()
        .map(|(field, value)| Condition::eq(field, value.clone()).qualified(Some(JUNCTION_ALIAS)));

    Some(
        SelectQuery::from_tables(vec![
            TableRef::aliased(RELATED_ALIAS, related.table_name()),
            TableRef::aliased(JUNCTION_ALIAS, junction),
        ])
        .columns(
            related
                .primary_key()
                .iter()
                .map(|key| ColumnRef::qualified(RELATED_ALIAS, key.as_str())),
        )
        .filter(conditions)
        .joins([join])
        .options(related_order(related, Some(RELATED_ALIAS))),
    )
}
