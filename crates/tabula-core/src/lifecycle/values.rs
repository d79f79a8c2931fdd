//! Creating entities and assigning validated values.

use super::Session;
use crate::catalog::{Property, Schema};
use crate::constraint::{coerce_for, prepare_value, UniqueChecker};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::relation::{ids_to_value, value_to_ids};
use std::sync::Arc;
use tabula_proto::{EntityId, FieldValues, Value};
use tracing::debug;

impl<'e> Session<'e> {
    /// A new, unsaved entity holding the declared defaults.
    pub fn new_entity(&self, entity_type: &str) -> Result<Entity> {
        let schema = self.schema(entity_type)?;
        let mut entity = Entity::new(Arc::clone(&schema));
        for property in schema.properties() {
            if let Some(default) = &property.default {
                let value = coerce_for(entity_type, property, default.clone())?;
                entity.set_raw(&property.name, value);
            }
        }
        Ok(entity)
    }

    /// A new, unsaved entity built from raw values.
    ///
    /// Every property is validated; missing ones take their default.
    /// Required properties without a value or default fail, except for
    /// primary-key fields, which may be assigned on save.
    pub fn new_from_values(&self, entity_type: &str, values: &FieldValues) -> Result<Entity> {
        let schema = self.schema(entity_type)?;
        if let Some(unknown) = values.keys().find(|name| schema.property(name).is_none()) {
            return Err(Error::invalid_property(entity_type, unknown));
        }

        let mut entity = Entity::new(Arc::clone(&schema));
        for property in schema.properties() {
            let raw = values.get(&property.name).cloned().unwrap_or(Value::Null);
            if property.is_relationship() {
                if !raw.is_empty() {
                    let value = self.relationship_value(&schema, property, raw)?;
                    entity.set_raw(&property.name, value);
                }
                continue;
            }

            let unset_key = schema.is_primary_key(&property.name)
                && property.default.is_none()
                && coerce_for(entity_type, property, raw.clone())?.is_empty();
            if unset_key {
                continue;
            }
            let value = prepare_value(entity_type, property, raw)?;
            if !value.is_null() {
                entity.set_raw(&property.name, value);
            }
        }
        Ok(entity)
    }

    /// Validate and assign one property value.
    ///
    /// Relationship properties take related identifiers, each of which must
    /// name an existing entity. The primary key of a stored entity cannot
    /// change.
    pub fn set_value(
        &self,
        entity: &mut Entity,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let schema = Arc::clone(entity.schema());
        let entity_type = schema.entity_type();
        let declared = schema
            .property(property)
            .ok_or_else(|| Error::invalid_property(entity_type, property))?;

        let value = if declared.is_relationship() {
            self.relationship_value(&schema, declared, value.into())?
        } else {
            prepare_value(entity_type, declared, value.into())?
        };

        if entity.exists_in_store() && schema.is_primary_key(property) {
            if let Some(current) = entity.get(property) {
                if !current.loose_eq(&value) {
                    return Err(Error::validation(
                        entity_type,
                        property,
                        "primary key of a stored entity cannot change",
                        None,
                    ));
                }
            }
        }
        entity.set_raw(property, value);
        Ok(())
    }

    /// Assign several values, stopping at the first failure.
    pub fn set_values(&self, entity: &mut Entity, values: &FieldValues) -> Result<()> {
        for (property, value) in values {
            self.set_value(entity, property, value.clone())?;
        }
        Ok(())
    }

    /// Current value of a property.
    ///
    /// Falls back to resolving the relationship for computed properties that
    /// were not loaded, then to the declared default.
    pub fn value(&self, entity: &Entity, property: &str) -> Result<Value> {
        let schema = entity.schema();
        let declared = schema
            .property(property)
            .ok_or_else(|| Error::invalid_property(schema.entity_type(), property))?;
        if let Some(value) = entity.get(property) {
            return Ok(value.clone());
        }
        if declared.is_relationship() {
            if let Some(relationship) = schema.relationship_for_property(property) {
                return self.resolver().resolve(schema, entity.values(), relationship);
            }
        }
        match &declared.default {
            Some(default) => coerce_for(schema.entity_type(), declared, default.clone()),
            None => Ok(Value::Null),
        }
    }

    /// Every validation failure for a set of raw values, including unique
    /// groups already taken by other rows.
    ///
    /// Only store failures are returned as `Err`.
    pub fn validate_values(&self, entity_type: &str, values: &FieldValues) -> Result<Vec<Error>> {
        let schema = self.schema(entity_type)?;
        let mut failures = Vec::new();
        let mut accepted = FieldValues::new();

        for (name, raw) in values {
            let Some(property) = schema.property(name) else {
                failures.push(Error::invalid_property(entity_type, name));
                continue;
            };
            let outcome = if property.is_relationship() {
                self.relationship_value(&schema, property, raw.clone())
            } else {
                prepare_value(entity_type, property, raw.clone())
            };
            match outcome {
                Ok(value) => {
                    accepted.insert(name.clone(), value);
                }
                Err(err) if err.is_rejection() => failures.push(err),
                Err(err) => return Err(err),
            }
        }

        for property in schema.properties() {
            let missing = property.required
                && property.default.is_none()
                && !schema.is_primary_key(&property.name)
                && !values.contains_key(&property.name);
            if missing {
                failures.push(Error::required(entity_type, &property.name));
            }
        }

        let own_id = EntityId::new(
            schema
                .primary_key()
                .iter()
                .map(|k| (k.clone(), accepted.get(k).cloned().unwrap_or(Value::Null)))
                .collect(),
        );
        let stored = own_id.is_complete() && self.load_stored(&schema, &own_id)?.is_some();
        let own_id = stored.then_some(own_id);
        let conflicts = UniqueChecker::new(self.engine.store.as_ref()).all_conflicts(
            &schema,
            &accepted,
            own_id.as_ref(),
        )?;
        failures.extend(conflicts.into_iter().map(|fields| Error::NotUnique {
            entity: entity_type.to_string(),
            fields,
        }));

        debug!(entity = entity_type, failures = failures.len(), "validated values");
        Ok(failures)
    }

    /// Parse related identifiers and check that each one exists.
    fn relationship_value(&self, schema: &Schema, property: &Property, raw: Value) -> Result<Value> {
        let entity_type = schema.entity_type();
        let relationship = schema
            .relationship_for_property(&property.name)
            .ok_or_else(|| Error::invalid_property(entity_type, &property.name))?;
        let related = self.schema(&relationship.related_entity)?;

        let ids = value_to_ids(&related, &raw).map_err(|m| Error::TypeMismatch {
            entity: entity_type.to_string(),
            property: property.name.clone(),
            expected: m.expected,
            found: m.found,
        })?;
        if ids.is_empty() && property.required {
            return Err(Error::required(entity_type, &property.name));
        }
        for id in &ids {
            if !self.id_exists(related.entity_type(), id)? {
                debug!(entity = entity_type, property = %property.name, related = %id, "related object missing");
                return Err(Error::validation(
                    entity_type,
                    &property.name,
                    "object does not exist",
                    Some(format!("{} {}", related.entity_type(), id)),
                ));
            }
        }
        Ok(ids_to_value(&ids))
    }
}
