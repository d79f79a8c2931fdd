//! Schema registry.
//!
//! Holds one immutable [`Schema`] per entity type. Registration is lazy and
//! happens at most once per type; afterwards lookups only take a read lock.

use super::error::SchemaError;
use super::property::PropertyDef;
use super::relation::RelationshipKind;
use super::schema::{Schema, SchemaDef};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Describes one concrete entity type to the engine.
pub trait EntityDescriptor: Send + Sync {
    /// Entity type name.
    fn entity_type(&self) -> &str;

    /// Table, keys, relationships and query shape.
    fn schema(&self) -> SchemaDef;

    /// Property declarations.
    fn properties(&self) -> Vec<PropertyDef>;
}

/// Registry of entity schemas.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type, building its schema on first call.
    ///
    /// Later calls for the same type return the schema built the first time
    /// without consulting the descriptor again.
    pub fn register(&self, descriptor: &dyn EntityDescriptor) -> Result<Arc<Schema>, SchemaError> {
        let entity_type = descriptor.entity_type();
        if let Some(schema) = self.schemas.read().get(entity_type) {
            return Ok(schema.clone());
        }

        let mut schemas = self.schemas.write();
        if let Some(schema) = schemas.get(entity_type) {
            return Ok(schema.clone());
        }

        let schema = Arc::new(Schema::build(
            entity_type,
            descriptor.schema(),
            descriptor.properties(),
        )?);
        debug!(
            entity = entity_type,
            table = schema.table_name(),
            relationships = schema.relationships().len(),
            "registered schema"
        );
        schemas.insert(entity_type.to_string(), schema.clone());
        Ok(schema)
    }

    /// Look up a registered schema.
    pub fn get(&self, entity_type: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(entity_type).cloned()
    }

    /// Look up a registered schema, failing if it is missing.
    pub fn schema(&self, entity_type: &str) -> Result<Arc<Schema>, SchemaError> {
        self.get(entity_type)
            .ok_or_else(|| SchemaError::UnknownEntity(entity_type.to_string()))
    }

    /// Whether an entity type is registered.
    pub fn contains(&self, entity_type: &str) -> bool {
        self.schemas.read().contains_key(entity_type)
    }

    /// Registered entity types, sorted.
    pub fn entity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.schemas.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Check every relationship against the schema it references.
    pub fn validate_links(&self) -> Result<(), SchemaError> {
        let schemas = self.schemas.read();
        let mut entity_types: Vec<&String> = schemas.keys().collect();
        entity_types.sort();

        for entity_type in entity_types {
            let schema = &schemas[entity_type];
            for rel in schema.relationships() {
                let relationship = rel.id();
                let related = schemas.get(&rel.related_entity).ok_or_else(|| {
                    SchemaError::UnknownRelatedEntity {
                        entity: entity_type.clone(),
                        relationship: relationship.clone(),
                        related: rel.related_entity.clone(),
                    }
                })?;

                for property in &rel.related_property_names {
                    if related.property(property).is_none() {
                        return Err(SchemaError::UnknownRelatedProperty {
                            entity: entity_type.clone(),
                            relationship,
                            related: rel.related_entity.clone(),
                            property: property.clone(),
                        });
                    }
                }

                let arity_ok = match rel.kind {
                    RelationshipKind::OneToOne | RelationshipKind::OneToMany => {
                        rel.property_names.len() == related.primary_key().len()
                    }
                    RelationshipKind::ManyToOne => {
                        rel.related_property_names.is_empty()
                            || rel.related_property_names.len() == schema.primary_key().len()
                    }
                    RelationshipKind::ManyToMany => true,
                };
                if !arity_ok {
                    return Err(SchemaError::ForeignKeyArity {
                        entity: entity_type.clone(),
                        relationship,
                    });
                }

                if rel.kind == RelationshipKind::ManyToOne {
                    let foreign_keys = if rel.related_property_names.is_empty() {
                        schema.primary_key()
                    } else {
                        rel.related_property_names.as_slice()
                    };
                    if let Some(missing) = foreign_keys.iter().find(|k| related.field(k).is_none())
                    {
                        return Err(SchemaError::UnknownRelatedProperty {
                            entity: entity_type.clone(),
                            relationship,
                            related: rel.related_entity.clone(),
                            property: missing.clone(),
                        });
                    }
                }

                if rel.kind == RelationshipKind::ManyToMany
                    && schema
                        .primary_key()
                        .iter()
                        .any(|k| related.is_primary_key(k))
                {
                    return Err(SchemaError::OverlappingJunctionKeys {
                        entity: entity_type.clone(),
                        relationship,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::relation::RelationDef;
    use crate::catalog::types::FieldType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tag {
        built: AtomicUsize,
    }

    impl EntityDescriptor for Tag {
        fn entity_type(&self) -> &str {
            "tag"
        }

        fn schema(&self) -> SchemaDef {
            self.built.fetch_add(1, Ordering::SeqCst);
            SchemaDef::new("tags", ["tag_id"]).with_unique(["label"])
        }

        fn properties(&self) -> Vec<PropertyDef> {
            vec![
                PropertyDef::field("tag_id", FieldType::String),
                PropertyDef::field("label", FieldType::String).with_required(),
            ]
        }
    }

    struct Note;

    impl EntityDescriptor for Note {
        fn entity_type(&self) -> &str {
            "note"
        }

        fn schema(&self) -> SchemaDef {
            SchemaDef::new("notes", ["tag_id"])
                .with_relationship(RelationDef::many_to_many("tags", "tag", "note_tags"))
        }

        fn properties(&self) -> Vec<PropertyDef> {
            vec![
                PropertyDef::field("tag_id", FieldType::String),
                PropertyDef::relationship("tags"),
            ]
        }
    }

    #[test]
    fn test_register_is_memoized() {
        let registry = SchemaRegistry::new();
        let tag = Tag {
            built: AtomicUsize::new(0),
        };

        let first = registry.register(&tag).unwrap();
        let second = registry.register(&tag).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(tag.built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.entity_types(), vec!["tag".to_string()]);
    }

    #[test]
    fn test_unknown_entity() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.schema("ghost").unwrap_err(),
            SchemaError::UnknownEntity("ghost".into())
        );
    }

    #[test]
    fn test_link_checks() {
        let registry = SchemaRegistry::new();
        registry.register(&Note).unwrap();
        assert!(matches!(
            registry.validate_links(),
            Err(SchemaError::UnknownRelatedEntity { .. })
        ));

        registry
            .register(&Tag {
                built: AtomicUsize::new(0),
            })
            .unwrap();
        assert!(matches!(
            registry.validate_links(),
            Err(SchemaError::OverlappingJunctionKeys { .. })
        ));
    }
}
