//! Cache keys touched by an entity.

use crate::cache::CacheKey;
use crate::catalog::{RelationDef, Schema};
use std::collections::BTreeSet;
use tabula_proto::{EntityId, FieldValues};

/// Key of the primary-key lookup holding the entity's full values.
pub(crate) fn lookup_key(schema: &Schema, id: &EntityId) -> CacheKey {
    CacheKey::derive(schema.entity_type(), &id.to_field_values())
}

/// Key of a condition query. No conditions means the select-all key.
pub(crate) fn query_key(schema: &Schema, conditions: &FieldValues) -> CacheKey {
    if conditions.is_empty() {
        CacheKey::all(schema.entity_type())
    } else {
        CacheKey::derive_query(schema.entity_type(), conditions)
    }
}

/// Every key whose cached value depends on an entity with these values:
/// the select-all key, one lookup key per fully set unique group and one
/// query key per set field.
pub(crate) fn own_keys(schema: &Schema, values: &FieldValues) -> BTreeSet<CacheKey> {
    let mut keys = BTreeSet::new();
    keys.insert(CacheKey::all(schema.entity_type()));

    for group in schema.unique_fields() {
        let group_values: Option<FieldValues> = group
            .iter()
            .map(|field| match values.get(field) {
                Some(value) if !value.is_empty() => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect();
        if let Some(group_values) = group_values {
            keys.insert(CacheKey::derive(schema.entity_type(), &group_values));
        }
    }

    for field in schema.fields() {
        if let Some(value) = values.get(&field.name).filter(|v| !v.is_empty()) {
            let condition: FieldValues = [(field.name.clone(), value.clone())].into_iter().collect();
            keys.insert(CacheKey::derive_query(schema.entity_type(), &condition));
        }
    }
    keys
}

/// Query key over a relationship's holding fields, if all are set.
pub(crate) fn relationship_query_key(
    schema: &Schema,
    relationship: &RelationDef,
    values: &FieldValues,
) -> Option<CacheKey> {
    let conditions: Option<FieldValues> = relationship
        .property_names
        .iter()
        .map(|p| {
            values
                .get(p)
                .filter(|v| !v.is_empty())
                .map(|v| (p.clone(), v.clone()))
        })
        .collect();
    conditions.map(|c| query_key(schema, &c))
}

/// Whether the related type eagerly loads the reciprocal property, so its
/// cached instances embed this side of the relationship.
pub(crate) fn reciprocal_autoloads(related: &Schema, relationship: &RelationDef) -> bool {
    relationship.related_property_names.iter().any(|name| {
        related
            .relationship_for_property(name)
            .is_some_and(|r| r.autoload && r.kind.is_computed())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldType, PropertyDef, SchemaDef};
    use tabula_proto::Value;

    fn schema() -> Schema {
        Schema::build(
            "user",
            SchemaDef::new("users", ["user_id"]).with_unique(["email"]),
            vec![
                PropertyDef::field("user_id", FieldType::Integer),
                PropertyDef::field("email", FieldType::String),
                PropertyDef::field("name", FieldType::String),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_own_keys_skip_unset_groups() {
        let schema = schema();
        let values: FieldValues = [
            ("email".to_string(), Value::from("A@x.io")),
            ("name".to_string(), Value::from("Ann")),
        ]
        .into_iter()
        .collect();

        let keys = own_keys(&schema, &values);
        // select-all, email lookup, email query, name query
        assert_eq!(keys.len(), 4);
        let email: FieldValues = [("email".to_string(), Value::from("a@x.io"))].into_iter().collect();
        assert!(keys.contains(&CacheKey::derive("user", &email)));
        assert!(keys.contains(&CacheKey::all("user")));
    }

    #[test]
    fn test_lookup_key_matches_unique_derivation() {
        let schema = schema();
        let id = EntityId::single("user_id", 7i64);
        let values: FieldValues = [("user_id".to_string(), Value::Int(7))].into_iter().collect();
        assert_eq!(lookup_key(&schema, &id), CacheKey::derive("user", &values));
        assert!(own_keys(&schema, &values).contains(&lookup_key(&schema, &id)));
    }

    #[test]
    fn test_query_key_scopes() {
        let schema = schema();
        assert_eq!(query_key(&schema, &FieldValues::new()), CacheKey::all("user"));
        let values: FieldValues = [("name".to_string(), Value::from("Ann"))].into_iter().collect();
        assert_ne!(query_key(&schema, &values), CacheKey::derive("user", &values));
    }
}
