//! Delete: plan dependents and junction cleanup, then apply atomically.

use super::keys::{lookup_key, own_keys, reciprocal_autoloads, relationship_query_key};
use super::plan::{Assignment, CascadePlan, Mode, PlannedMutation};
use super::save::assign_foreign_keys;
use super::Session;
use crate::catalog::RelationshipKind;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::relation::foreign_key_columns;
use crate::security::Action;
use std::collections::HashSet;
use std::sync::Arc;
use tabula_proto::EntityId;
use tracing::{debug, info, instrument};

impl<'e> Session<'e> {
    /// Delete an entity.
    ///
    /// Dependents reached through a required many-to-one relationship are
    /// deleted with it; optional ones have their foreign key cleared. Junction
    /// rows are removed. Everything happens in one atomic section.
    #[instrument(skip_all, fields(entity = entity.entity_type()))]
    pub fn delete(&self, entity: &mut Entity) -> Result<()> {
        let plan = self.plan_delete_at(entity, Mode::Real, 0, &mut HashSet::new())?;
        let deleted = plan.dependent_deletes();
        let detached = plan.dependent_saves();
        let snapshot = entity.clone();

        match self.atomic(|| self.apply_delete(entity, plan, 0)) {
            Ok(()) => {
                info!(deleted, detached, "deleted entity");
                Ok(())
            }
            Err(err) => {
                *entity = snapshot;
                Err(err)
            }
        }
    }

    /// Whether [`Session::delete`] would succeed, without writing anything.
    pub fn can_delete(&self, entity: &Entity) -> Result<()> {
        self.plan_delete(entity).map(|_| ())
    }

    /// The dry-run plan of a delete.
    pub fn plan_delete(&self, entity: &Entity) -> Result<CascadePlan> {
        self.plan_delete_at(entity, Mode::DryRun, 0, &mut HashSet::new())
    }

    pub(super) fn plan_delete_at(
        &self,
        entity: &Entity,
        mode: Mode,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Result<CascadePlan> {
        self.check_depth(depth)?;
        let schema = Arc::clone(entity.schema());
        let entity_type = schema.entity_type();
        self.authorize(&schema, Action::Delete)?;

        let id = entity
            .id()
            .ok_or_else(|| Error::not_found(entity_type, entity.primary_key_values()))?;
        let stored = self
            .load_stored(&schema, &id)?
            .ok_or_else(|| Error::not_found(entity_type, &id))?;
        visited.insert(visit_key(entity_type, &id));

        let mut plan = CascadePlan::new(entity_type, Action::Delete, mode);
        plan.cache_keys.extend(own_keys(&schema, &stored));

        let resolver = self.resolver();
        let mut junctions = Vec::new();
        for relationship in schema.relationships() {
            let related = self.schema(&relationship.related_entity)?;
            match relationship.kind {
                RelationshipKind::OneToOne | RelationshipKind::OneToMany => {
                    plan.cache_keys
                        .extend(relationship_query_key(&schema, relationship, &stored));
                    if reciprocal_autoloads(&related, relationship) {
                        if let Some(referenced) = resolver.referenced_id(&schema, &stored, relationship)? {
                            plan.cache_keys.insert(lookup_key(&related, &referenced));
                        }
                    }
                }
                RelationshipKind::ManyToMany => {
                    let table = self.junction_table(&schema, relationship)?;
                    if reciprocal_autoloads(&related, relationship) {
                        for related_id in resolver.related_ids(&schema, &stored, relationship)? {
                            plan.cache_keys.insert(lookup_key(&related, &related_id));
                        }
                    }
                    junctions.push(PlannedMutation::DeleteJunctionRows { table });
                }
                RelationshipKind::ManyToOne => {
                    let foreign_keys = foreign_key_columns(&schema, relationship);
                    let required = foreign_keys
                        .iter()
                        .any(|column| related.property(column).is_some_and(|p| p.required));

                    for related_id in resolver.related_ids(&schema, &stored, relationship)? {
                        if !visited.insert(visit_key(related.entity_type(), &related_id)) {
                            continue;
                        }
                        let Some(dependent) = self.load_entity(&related, &related_id)? else {
                            continue;
                        };
                        if required {
                            let nested = self.plan_delete_at(&dependent, mode, depth + 1, visited)?;
                            plan.mutations.push(PlannedMutation::DeleteRelated {
                                entity: dependent,
                                plan: Box::new(nested),
                            });
                        } else {
                            let mut probe = dependent.clone();
                            assign_foreign_keys(&mut probe, &foreign_keys, None)?;
                            self.plan_save_at(&probe, Mode::DryRun, depth + 1)?;
                            plan.mutations.push(PlannedMutation::SaveRelated {
                                entity: dependent,
                                foreign_keys: foreign_keys.clone(),
                                assignment: Assignment::Clear,
                            });
                        }
                    }
                }
            }
        }
        plan.mutations.extend(junctions);

        debug!(
            entity = entity_type,
            %id,
            ?mode,
            dependents = plan.dependent_deletes() + plan.dependent_saves(),
            keys = plan.cache_keys.len(),
            "planned delete"
        );
        Ok(plan)
    }

    /// Apply a delete plan: dependents, then junction rows, then the row.
    pub(super) fn apply_delete(&self, entity: &mut Entity, plan: CascadePlan, depth: usize) -> Result<()> {
        if plan.mode != Mode::Real {
            return Err(Error::Internal("dry-run plan cannot be applied".into()));
        }
        let schema = Arc::clone(entity.schema());
        let table = schema.table_name();
        let id = entity
            .id()
            .ok_or_else(|| Error::not_found(schema.entity_type(), entity.primary_key_values()))?;

        self.invalidate(plan.cache_keys);
        for mutation in plan.mutations {
            self.apply_mutation(&id, mutation, depth)?;
        }

        let affected = self.engine.store.delete(table, &id.to_conditions())?;
        if affected != 1 {
            return Err(Error::AffectedRows {
                operation: "delete",
                table: table.to_string(),
                affected,
            });
        }
        entity.mark_deleted();
        debug!(entity = schema.entity_type(), %id, "applied delete");
        Ok(())
    }
}

fn visit_key(entity_type: &str, id: &EntityId) -> String {
    format!("{}:{}", entity_type, id)
}
