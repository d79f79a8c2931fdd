//! Cascade plans.
//!
//! Saving or deleting an entity first computes a [`CascadePlan`]: every
//! check runs and every would-be mutation and cache key is collected, but
//! nothing is written. Applying a real-mode plan performs the writes.

use crate::cache::CacheKey;
use crate::entity::Entity;
use crate::security::Action;
use std::collections::BTreeSet;
use tabula_proto::EntityId;

/// Whether a plan may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Checks and planning for a write that will be applied.
    Real,
    /// Checks and planning only.
    DryRun,
}

/// Foreign-key values given to a dependent entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The owning entity's primary key, known once the owner is written.
    Owner,
    /// Empty values.
    Clear,
}

/// A store mutation following from the primary write.
///
/// Junction mutations are keyed by the owning entity's primary key, which is
/// filled in when the plan is applied.
#[derive(Debug, Clone)]
pub enum PlannedMutation {
    /// Pair the owner with a related entity.
    InsertJunction { table: String, related: EntityId },
    /// Unpair the owner from a related entity.
    DeleteJunction { table: String, related: EntityId },
    /// Remove every junction row of the owner.
    DeleteJunctionRows { table: String },
    /// Re-save a dependent entity with new foreign-key values.
    SaveRelated {
        entity: Entity,
        foreign_keys: Vec<String>,
        assignment: Assignment,
    },
    /// Delete a dependent entity following its own plan, made in the same
    /// pass so that entities already visited are not planned again.
    DeleteRelated {
        entity: Entity,
        plan: Box<CascadePlan>,
    },
}

impl PlannedMutation {
    /// Whether the mutation touches a junction table.
    pub fn is_junction(&self) -> bool {
        matches!(
            self,
            PlannedMutation::InsertJunction { .. }
                | PlannedMutation::DeleteJunction { .. }
                | PlannedMutation::DeleteJunctionRows { .. }
        )
    }
}

/// Everything a save or delete would do.
#[derive(Debug, Clone)]
pub struct CascadePlan {
    /// Entity type being written.
    pub entity_type: String,
    /// Action on the entity itself.
    pub action: Action,
    /// Planning mode.
    pub mode: Mode,
    /// Identifier generated for a new entity.
    pub generated_key: Option<EntityId>,
    /// Follow-up mutations, in application order.
    pub mutations: Vec<PlannedMutation>,
    /// Cache keys to invalidate.
    pub cache_keys: BTreeSet<CacheKey>,
}

impl CascadePlan {
    pub(crate) fn new(entity_type: &str, action: Action, mode: Mode) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            action,
            mode,
            generated_key: None,
            mutations: Vec::new(),
            cache_keys: BTreeSet::new(),
        }
    }

    /// Junction rows that would be inserted.
    pub fn junction_inserts(&self) -> Vec<&EntityId> {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                PlannedMutation::InsertJunction { related, .. } => Some(related),
                _ => None,
            })
            .collect()
    }

    /// Junction rows that would be deleted one by one.
    pub fn junction_deletes(&self) -> Vec<&EntityId> {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                PlannedMutation::DeleteJunction { related, .. } => Some(related),
                _ => None,
            })
            .collect()
    }

    /// Dependent entities that would be deleted.
    pub fn dependent_deletes(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| matches!(m, PlannedMutation::DeleteRelated { .. }))
            .count()
    }

    /// Dependent entities that would be re-saved.
    pub fn dependent_saves(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| matches!(m, PlannedMutation::SaveRelated { .. }))
            .count()
    }
}
