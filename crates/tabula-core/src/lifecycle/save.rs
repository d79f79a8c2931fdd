//! Save: plan checks and cascades, then apply them atomically.

use super::keys::{lookup_key, own_keys, reciprocal_autoloads, relationship_query_key};
use super::plan::{Assignment, CascadePlan, Mode, PlannedMutation};
use super::Session;
use crate::catalog::{FieldType, RelationDef, RelationshipKind, Schema};
use crate::constraint::{coerce_for, UniqueChecker};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::relation::{foreign_key_columns, value_to_ids};
use crate::security::Action;
use crate::store::StoreError;
use rand::Rng;
use std::sync::Arc;
use tabula_proto::{ColumnRef, Condition, EntityId, FieldValues, SelectQuery, Value};
use tracing::{debug, info, instrument};

/// Attempts at drawing an unused random identifier.
const MAX_KEY_ATTEMPTS: usize = 32;

impl<'e> Session<'e> {
    /// Create or update an entity, cascading to related entities.
    ///
    /// Every store mutation runs in one atomic section. On failure the
    /// section is rolled back and the entity is left as it was.
    #[instrument(skip_all, fields(entity = entity.entity_type()))]
    pub fn save(&self, entity: &mut Entity) -> Result<()> {
        let plan = self.plan_save_at(entity, Mode::Real, 0)?;
        let action = plan.action;
        let mutations = plan.mutations.len();
        let snapshot = entity.clone();

        match self.atomic(|| self.apply_save(entity, plan, 0)) {
            Ok(()) => {
                info!(%action, mutations, "saved entity");
                Ok(())
            }
            Err(err) => {
                *entity = snapshot;
                Err(err)
            }
        }
    }

    /// Whether [`Session::save`] would succeed, without writing anything.
    pub fn can_save(&self, entity: &Entity) -> Result<()> {
        self.plan_save(entity).map(|_| ())
    }

    /// The dry-run plan of a save.
    pub fn plan_save(&self, entity: &Entity) -> Result<CascadePlan> {
        self.plan_save_at(entity, Mode::DryRun, 0)
    }

    pub(super) fn plan_save_at(&self, entity: &Entity, mode: Mode, depth: usize) -> Result<CascadePlan> {
        self.check_depth(depth)?;
        let schema = Arc::clone(entity.schema());
        let entity_type = schema.entity_type();

        let previous = match entity.id() {
            Some(id) => self.load_stored(&schema, &id)?,
            None => None,
        };
        let action = if previous.is_some() {
            Action::Edit
        } else {
            Action::Create
        };
        self.authorize(&schema, action)?;

        for property in schema.properties().iter().filter(|p| p.is_field() && p.required) {
            if action == Action::Create && schema.is_primary_key(&property.name) {
                continue;
            }
            if entity.get(&property.name).map_or(true, Value::is_empty) {
                debug!(entity = entity_type, property = %property.name, "required field empty");
                return Err(Error::required(entity_type, &property.name));
            }
        }

        // A new entity has no row of its own to exclude, even if its key
        // matches a stored one up to case.
        let own_id = previous.as_ref().and(entity.id());
        let checker = UniqueChecker::new(self.engine.store.as_ref());
        if let Some(fields) = checker.find_conflict(&schema, &entity.field_row(), own_id.as_ref())? {
            debug!(entity = entity_type, ?fields, "unique group taken");
            return Err(Error::NotUnique {
                entity: entity_type.to_string(),
                fields,
            });
        }

        let mut plan = CascadePlan::new(entity_type, action, mode);
        if action == Action::Create && !entity.is_primary_key_set() && !schema.has_autoincrement_key() {
            plan.generated_key = Some(self.generate_key(&schema)?);
        }

        let mut current = entity.values().clone();
        if let Some(key) = &plan.generated_key {
            current.extend(key.to_field_values());
        }
        let empty = FieldValues::new();
        let stored = previous.as_ref().unwrap_or(&empty);
        plan.cache_keys.extend(own_keys(&schema, &current));
        plan.cache_keys.extend(own_keys(&schema, stored));

        let owner = entity.id().or_else(|| plan.generated_key.clone());
        for relationship in schema.relationships() {
            self.plan_relationship_save(
                &schema,
                relationship,
                entity,
                &current,
                previous.as_ref(),
                owner.as_ref(),
                depth,
                &mut plan,
            )?;
        }

        debug!(
            entity = entity_type,
            %action,
            ?mode,
            mutations = plan.mutations.len(),
            keys = plan.cache_keys.len(),
            "planned save"
        );
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_relationship_save(
        &self,
        schema: &Schema,
        relationship: &RelationDef,
        entity: &Entity,
        current: &FieldValues,
        previous: Option<&FieldValues>,
        owner: Option<&EntityId>,
        depth: usize,
        plan: &mut CascadePlan,
    ) -> Result<()> {
        let related = self.schema(&relationship.related_entity)?;
        let resolver = self.resolver();
        let empty = FieldValues::new();
        let stored = previous.unwrap_or(&empty);

        if !relationship.kind.is_computed() {
            let old = resolver.referenced_id(schema, stored, relationship)?;
            let new = resolver.referenced_id(schema, current, relationship)?;
            if old == new {
                return Ok(());
            }
            plan.cache_keys
                .extend(relationship_query_key(schema, relationship, stored));
            plan.cache_keys
                .extend(relationship_query_key(schema, relationship, current));
            if reciprocal_autoloads(&related, relationship) {
                plan.cache_keys
                    .extend(old.iter().chain(new.iter()).map(|id| lookup_key(&related, id)));
            }
            return Ok(());
        }

        let Some(value) = entity.get(relationship.property()) else {
            return Ok(());
        };
        let new_ids = parse_ids(schema, relationship, &related, value)?;
        let old_ids = match previous {
            Some(stored) => resolver.related_ids(schema, stored, relationship)?,
            None => Vec::new(),
        };
        let added: Vec<EntityId> = new_ids.iter().filter(|id| !old_ids.contains(id)).cloned().collect();
        let removed: Vec<EntityId> = old_ids.iter().filter(|id| !new_ids.contains(id)).cloned().collect();
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }
        debug!(
            entity = schema.entity_type(),
            relationship = %relationship.id(),
            added = added.len(),
            removed = removed.len(),
            "relationship changed"
        );

        if relationship.kind == RelationshipKind::ManyToMany {
            let table = self.junction_table(schema, relationship)?;
            if reciprocal_autoloads(&related, relationship) {
                plan.cache_keys.extend(
                    added
                        .iter()
                        .chain(removed.iter())
                        .map(|id| lookup_key(&related, id)),
                );
            }
            plan.mutations.extend(added.into_iter().map(|id| PlannedMutation::InsertJunction {
                table: table.clone(),
                related: id,
            }));
            plan.mutations.extend(removed.into_iter().map(|id| PlannedMutation::DeleteJunction {
                table: table.clone(),
                related: id,
            }));
            return Ok(());
        }

        let foreign_keys = foreign_key_columns(schema, relationship);
        // A store-assigned owner key is unknown until the insert. No stored
        // row references it yet, so any unused value stands in for it.
        let probe_owner = match owner {
            Some(owner) => owner.clone(),
            None => provisional_key(schema, current),
        };
        let changes = added
            .into_iter()
            .map(|id| (id, Assignment::Owner))
            .chain(removed.into_iter().map(|id| (id, Assignment::Clear)));
        let mut assigned: Vec<Entity> = Vec::new();
        for (id, assignment) in changes {
            let dependent = self.load_entity(&related, &id)?.ok_or_else(|| {
                Error::validation(
                    schema.entity_type(),
                    relationship.property(),
                    "object does not exist",
                    Some(format!("{} {}", related.entity_type(), id)),
                )
            })?;

            let mut probe = dependent.clone();
            let target = match assignment {
                Assignment::Owner => Some(&probe_owner),
                Assignment::Clear => None,
            };
            assign_foreign_keys(&mut probe, &foreign_keys, target)?;
            self.plan_save_at(&probe, Mode::DryRun, depth + 1)?;
            if assignment == Assignment::Owner {
                if let Some(fields) = batch_conflict(&related, &assigned, &probe, &foreign_keys) {
                    debug!(entity = related.entity_type(), ?fields, "dependents collide under one owner");
                    return Err(Error::NotUnique {
                        entity: related.entity_type().to_string(),
                        fields,
                    });
                }
                assigned.push(probe);
            }

            plan.mutations.push(PlannedMutation::SaveRelated {
                entity: dependent,
                foreign_keys: foreign_keys.clone(),
                assignment,
            });
        }
        Ok(())
    }

    pub(super) fn apply_save(&self, entity: &mut Entity, plan: CascadePlan, depth: usize) -> Result<()> {
        if plan.mode != Mode::Real {
            return Err(Error::Internal("dry-run plan cannot be applied".into()));
        }
        let schema = Arc::clone(entity.schema());
        let table = schema.table_name();
        let store = self.engine.store.as_ref();

        if let Some(key) = &plan.generated_key {
            for (field, value) in key.parts() {
                entity.set_raw(field, value.clone());
            }
        }

        match plan.action {
            Action::Create => {
                expect_one("insert", table, store.insert(table, &entity.field_row())?)?;
                if !entity.is_primary_key_set() {
                    self.capture_identity(&schema, entity)?;
                }
            }
            _ => {
                let id = entity
                    .id()
                    .ok_or_else(|| Error::Internal("edited entity has no primary key".into()))?;
                expect_one(
                    "update",
                    table,
                    store.update(table, &entity.field_row(), &id.to_conditions())?,
                )?;
            }
        }

        let owner = entity
            .id()
            .ok_or_else(|| Error::Internal("saved entity has no primary key".into()))?;
        let mut keys = plan.cache_keys;
        keys.extend(own_keys(&schema, entity.values()));
        for mutation in plan.mutations {
            self.apply_mutation(&owner, mutation, depth)?;
        }
        self.invalidate(keys);
        entity.set_exists(true);
        debug!(entity = schema.entity_type(), id = %owner, "applied save");
        Ok(())
    }

    pub(super) fn apply_mutation(&self, owner: &EntityId, mutation: PlannedMutation, depth: usize) -> Result<()> {
        let store = self.engine.store.as_ref();
        match mutation {
            PlannedMutation::InsertJunction { table, related } => {
                let mut row = owner.to_field_values();
                row.extend(related.to_field_values());
                expect_one("insert", &table, store.insert(&table, &row)?)
            }
            PlannedMutation::DeleteJunction { table, related } => {
                let mut conditions = owner.to_conditions();
                conditions.extend(related.to_conditions());
                expect_one("delete", &table, store.delete(&table, &conditions)?)
            }
            PlannedMutation::DeleteJunctionRows { table } => {
                let removed = store.delete(&table, &owner.to_conditions())?;
                debug!(%table, removed, "removed junction rows");
                Ok(())
            }
            PlannedMutation::SaveRelated {
                mut entity,
                foreign_keys,
                assignment,
            } => {
                let owner = match assignment {
                    Assignment::Owner => Some(owner),
                    Assignment::Clear => None,
                };
                assign_foreign_keys(&mut entity, &foreign_keys, owner)?;
                let plan = self.plan_save_at(&entity, Mode::Real, depth + 1)?;
                self.apply_save(&mut entity, plan, depth + 1)
            }
            PlannedMutation::DeleteRelated { mut entity, plan } => {
                let Some(id) = entity.id() else {
                    return Ok(());
                };
                if self.load_stored(entity.schema(), &id)?.is_none() {
                    debug!(entity = entity.entity_type(), %id, "dependent already removed");
                    return Ok(());
                }
                self.apply_delete(&mut entity, *plan, depth + 1)
            }
        }
    }

    /// The junction table of a many-to-many relationship, checked to be
    /// reachable.
    pub(super) fn junction_table(&self, schema: &Schema, relationship: &RelationDef) -> Result<String> {
        let table = relationship.junction_table.clone().ok_or_else(|| {
            Error::Internal(format!(
                "{} relationship {} has no junction table",
                schema.entity_type(),
                relationship.id()
            ))
        })?;
        if !self.engine.store.table_exists(&table) {
            return Err(StoreError::UnknownTable(table).into());
        }
        Ok(table)
    }

    /// Draw a random identifier not yet used in the entity's table.
    fn generate_key(&self, schema: &Schema) -> Result<EntityId> {
        let entity_type = schema.entity_type();
        let field = match schema.primary_key() {
            [field] if schema.field(field).is_some_and(|f| f.field_type == FieldType::String) => field,
            _ => {
                return Err(Error::Internal(format!(
                    "cannot generate a primary key for {}",
                    entity_type
                )))
            }
        };
        let config = &self.engine.config;
        let alphabet: Vec<char> = config.id_alphabet.chars().collect();
        if alphabet.is_empty() || config.id_length == 0 {
            return Err(Error::Internal("identifier alphabet or length is empty".into()));
        }

        let mut rng = rand::thread_rng();
        for _ in 0..MAX_KEY_ATTEMPTS {
            let candidate: String = (0..config.id_length)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let query = SelectQuery::from(schema.table_name())
                .columns([ColumnRef::new(field.as_str())])
                .filter([Condition::eq_ignore_case(field, candidate.clone())]);
            if self.engine.store.select_row(&query)?.is_none() {
                return Ok(EntityId::single(field.clone(), candidate));
            }
            debug!(entity = entity_type, "generated key collided, drawing again");
        }
        Err(Error::Internal(format!(
            "no unused primary key for {} after {} attempts",
            entity_type, MAX_KEY_ATTEMPTS
        )))
    }

    /// Copy the store-assigned identity into unset autoincrement key fields.
    fn capture_identity(&self, schema: &Schema, entity: &mut Entity) -> Result<()> {
        let assigned = self
            .engine
            .store
            .last_insert_id()
            .ok_or_else(|| Error::Internal("store assigned no identity".into()))?;
        for field in schema.autoincrement_fields() {
            if !schema.is_primary_key(&field.name) || entity.get(&field.name).is_some_and(|v| !v.is_empty()) {
                continue;
            }
            let property = schema
                .property(&field.name)
                .ok_or_else(|| Error::invalid_property(schema.entity_type(), &field.name))?;
            let value = coerce_for(schema.entity_type(), property, assigned.clone())?;
            entity.set_raw(&field.name, value);
        }
        Ok(())
    }
}

/// Set a dependent's foreign-key fields to the owner's key, or clear them.
pub(super) fn assign_foreign_keys(
    entity: &mut Entity,
    foreign_keys: &[String],
    owner: Option<&EntityId>,
) -> Result<()> {
    let schema = Arc::clone(entity.schema());
    let Some(owner) = owner else {
        for column in foreign_keys {
            entity.set_raw(column, Value::Null);
        }
        return Ok(());
    };

    let values = owner.rekey(foreign_keys).ok_or_else(|| {
        Error::Internal(format!(
            "{} foreign key ({}) does not match the owner key",
            schema.entity_type(),
            foreign_keys.join(", ")
        ))
    })?;
    for (column, value) in values.parts() {
        let property = schema
            .property(column)
            .ok_or_else(|| Error::invalid_property(schema.entity_type(), column))?;
        entity.set_raw(column, coerce_for(schema.entity_type(), property, value.clone())?);
    }
    Ok(())
}

/// The owner's primary key with unset parts replaced by a value no stored
/// row holds.
fn provisional_key(schema: &Schema, values: &FieldValues) -> EntityId {
    EntityId::new(
        schema
            .primary_key()
            .iter()
            .map(|field| {
                let value = match values.get(field) {
                    Some(value) if !value.is_empty() => value.clone(),
                    _ => Value::Int(i64::MAX),
                };
                (field.clone(), value)
            })
            .collect(),
    )
}

/// A unique group over the foreign-key columns that `probe` shares with a
/// dependent assigned earlier in the same save. Such pairs only collide once
/// both are written, so the store cannot report them in advance.
fn batch_conflict(
    related: &Schema,
    assigned: &[Entity],
    probe: &Entity,
    foreign_keys: &[String],
) -> Option<Vec<String>> {
    related
        .unique_fields()
        .iter()
        .filter(|group| group.iter().any(|field| foreign_keys.contains(field)))
        .find(|group| {
            assigned.iter().any(|other| {
                group.iter().all(|field| match (probe.get(field), other.get(field)) {
                    (Some(a), Some(b)) => !a.is_empty() && a.eq_ignore_case(b),
                    _ => false,
                })
            })
        })
        .cloned()
}

fn parse_ids(schema: &Schema, relationship: &RelationDef, related: &Schema, value: &Value) -> Result<Vec<EntityId>> {
    value_to_ids(related, value).map_err(|m| Error::TypeMismatch {
        entity: schema.entity_type().to_string(),
        property: relationship.property().to_string(),
        expected: m.expected,
        found: m.found,
    })
}

fn expect_one(operation: &'static str, table: &str, affected: u64) -> Result<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(Error::AffectedRows {
            operation,
            table: table.to_string(),
            affected,
        })
    }
}
