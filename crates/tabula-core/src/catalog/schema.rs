//! Entity schemas.
//!
//! A [`SchemaDef`] is what an entity descriptor writes; a [`Schema`] is the
//! validated, immutable form the engine works with. Building a schema runs
//! every check that can be made without looking at other entity types.

use super::error::SchemaError;
use super::field::FieldDef;
use super::property::{Property, PropertyDef, PropertySource};
use super::relation::{RelationDef, RelationshipKind};
use std::collections::{HashMap, HashSet};
use tabula_proto::{Condition, JoinSpec, OrderSpec, SelectOptions, SelectQuery, TableRef};

/// Tables, joins and default options used for "select all" style queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    /// Tables, the entity's own table first.
    pub tables: Vec<TableRef>,
    /// Inner joins between the tables.
    pub joins: Vec<JoinSpec>,
    /// Default ordering and paging.
    pub options: SelectOptions,
}

impl QueryShape {
    /// A shape over a single table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            tables: vec![TableRef::new(table)],
            joins: Vec::new(),
            options: SelectOptions::default(),
        }
    }

    /// A shape over an aliased driving table.
    pub fn aliased(alias: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            tables: vec![TableRef::aliased(alias, table)],
            joins: Vec::new(),
            options: SelectOptions::default(),
        }
    }

    /// Add a joined table.
    pub fn with_join(mut self, table: TableRef, join: JoinSpec) -> Self {
        self.tables.push(table);
        self.joins.push(join);
        self
    }

    /// Add a default ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.options.order_by.push(order);
        self
    }

    /// Qualifier of the driving table, when columns need one.
    pub fn qualifier(&self) -> Option<&str> {
        match self.tables.first() {
            Some(table) if self.tables.len() > 1 || table.alias.is_some() => {
                Some(table.qualifier())
            }
            _ => None,
        }
    }

    /// Build a select over this shape.
    ///
    /// Condition and ordering columns are qualified with the driving table
    /// unless they already carry a qualifier. Extra options override the
    /// shape's defaults where set.
    pub fn select(&self, conditions: Vec<Condition>, options: &SelectOptions) -> SelectQuery {
        let qualifier = self.qualifier();
        let mut merged = self.options.merged(options);
        merged.order_by = merged
            .order_by
            .into_iter()
            .map(|order| order.qualified(qualifier))
            .collect();

        SelectQuery::from_tables(self.tables.clone())
            .filter(conditions.into_iter().map(|c| c.qualified(qualifier)))
            .joins(self.joins.clone())
            .options(merged)
    }
}

/// Schema declaration written by an entity descriptor.
#[derive(Debug, Clone, Default)]
pub struct SchemaDef {
    /// Table holding the entity's rows.
    pub table_name: String,
    /// Primary-key field names.
    pub primary_key: Vec<String>,
    /// Groups of fields whose combined value must be unique.
    pub unique_fields: Vec<Vec<String>>,
    /// Declared relationships.
    pub relationships: Vec<RelationDef>,
    /// Default ordering when no query shape is given.
    pub order_by: Vec<OrderSpec>,
    /// Explicit query shape.
    pub query_shape: Option<QueryShape>,
    /// Entity type whose permissions this type uses.
    pub rights_entity: Option<String>,
}

impl SchemaDef {
    /// Create a schema declaration for a table and primary key.
    pub fn new<S: Into<String>>(
        table_name: impl Into<String>,
        primary_key: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Add a unique field group.
    pub fn with_unique<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.unique_fields
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Add a relationship.
    pub fn with_relationship(mut self, relationship: RelationDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Add a default ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set an explicit query shape.
    pub fn with_query_shape(mut self, shape: QueryShape) -> Self {
        self.query_shape = Some(shape);
        self
    }

    /// Check permissions as another entity type.
    pub fn with_rights_entity(mut self, entity: impl Into<String>) -> Self {
        self.rights_entity = Some(entity.into());
        self
    }
}

/// A validated entity schema. Immutable once registered.
#[derive(Debug, Clone)]
pub struct Schema {
    entity_type: String,
    table_name: String,
    fields: Vec<FieldDef>,
    properties: Vec<Property>,
    property_index: HashMap<String, usize>,
    primary_key: Vec<String>,
    unique_fields: Vec<Vec<String>>,
    relationships: Vec<RelationDef>,
    query_shape: QueryShape,
    rights_entity: String,
}

impl Schema {
    /// Validate a declaration and build the schema.
    pub fn build(
        entity_type: &str,
        def: SchemaDef,
        property_defs: Vec<PropertyDef>,
    ) -> Result<Self, SchemaError> {
        let entity = entity_type.to_string();
        if def.table_name.trim().is_empty() {
            return Err(SchemaError::EmptyTable { entity });
        }
        if def.primary_key.is_empty() {
            return Err(SchemaError::MissingPrimaryKey { entity });
        }

        let mut properties = Vec::with_capacity(property_defs.len());
        let mut property_index = HashMap::new();
        for def in property_defs {
            if property_index.contains_key(&def.name) {
                return Err(SchemaError::DuplicateProperty {
                    entity,
                    property: def.name,
                });
            }
            property_index.insert(def.name.clone(), properties.len());
            properties.push(Property::resolve(entity_type, def)?);
        }

        let fields: Vec<FieldDef> = properties
            .iter()
            .filter(|p| p.is_field())
            .map(FieldDef::from)
            .collect();

        let require_field = |name: &str| -> Result<(), SchemaError> {
            match find_property(&properties, &property_index, name) {
                None => Err(SchemaError::UnknownProperty {
                    entity: entity_type.to_string(),
                    property: name.to_string(),
                }),
                Some(p) if !p.is_field() => Err(SchemaError::NotAField {
                    entity: entity_type.to_string(),
                    property: name.to_string(),
                }),
                Some(_) => Ok(()),
            }
        };

        for name in &def.primary_key {
            require_field(name)?;
        }
        let mut unique_fields = Vec::with_capacity(def.unique_fields.len() + 1);
        unique_fields.push(def.primary_key.clone());
        for group in def.unique_fields {
            for name in &group {
                require_field(name)?;
            }
            if !unique_fields.iter().any(|g| same_group(g, &group)) {
                unique_fields.push(group);
            }
        }

        let mut relationship_ids = HashSet::new();
        let mut bound = HashSet::new();
        for rel in &def.relationships {
            let relationship = rel.id();
            if !relationship_ids.insert(relationship.clone()) {
                return Err(SchemaError::DuplicateRelationship {
                    entity,
                    relationship,
                });
            }
            if rel.kind.is_computed() && rel.property_names.len() != 1 {
                return Err(SchemaError::SinglePropertyRequired {
                    entity,
                    relationship,
                });
            }
            if rel.property_names.is_empty() {
                return Err(SchemaError::SinglePropertyRequired {
                    entity,
                    relationship,
                });
            }
            let expected = if rel.kind.is_computed() {
                PropertySource::Relationship
            } else {
                PropertySource::Field
            };
            for name in &rel.property_names {
                match find_property(&properties, &property_index, name) {
                    None => {
                        return Err(SchemaError::UnknownProperty {
                            entity,
                            property: name.clone(),
                        })
                    }
                    Some(p) if p.source != expected => {
                        return Err(SchemaError::SourceMismatch {
                            entity,
                            relationship,
                            property: name.clone(),
                            expected,
                        })
                    }
                    Some(_) => {
                        bound.insert(name.clone());
                    }
                }
            }
            if matches!(
                rel.kind,
                RelationshipKind::OneToMany | RelationshipKind::ManyToMany
            ) && rel.related_property_names.len() > 1
            {
                return Err(SchemaError::TooManyRelatedProperties {
                    entity,
                    relationship,
                });
            }
            if rel.kind == RelationshipKind::ManyToMany
                && rel
                    .junction_table
                    .as_deref()
                    .map_or(true, |t| t.trim().is_empty())
            {
                return Err(SchemaError::MissingJunctionTable {
                    entity,
                    relationship,
                });
            }
        }
        if let Some(unbound) = properties
            .iter()
            .find(|p| p.is_relationship() && !bound.contains(&p.name))
        {
            return Err(SchemaError::UnboundRelationshipProperty {
                entity,
                property: unbound.name.clone(),
            });
        }

        let query_shape = match def.query_shape {
            Some(shape) => {
                if shape.tables.first().map(|t| t.table.as_str()) != Some(def.table_name.as_str())
                {
                    return Err(SchemaError::QueryShapeTable {
                        entity,
                        table: def.table_name,
                    });
                }
                shape
            }
            None => QueryShape {
                options: SelectOptions {
                    order_by: def.order_by,
                    ..Default::default()
                },
                ..QueryShape::table(def.table_name.clone())
            },
        };

        Ok(Self {
            rights_entity: def.rights_entity.unwrap_or_else(|| entity.clone()),
            entity_type: entity,
            table_name: def.table_name,
            fields,
            properties,
            property_index,
            primary_key: def.primary_key,
            unique_fields,
            relationships: def.relationships,
            query_shape,
        })
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Table holding the entity's rows.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Stored fields, in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a stored field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All properties, in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        find_property(&self.properties, &self.property_index, name)
    }

    /// Primary-key field names.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Whether `name` is part of the primary key.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Unique field groups, the primary key first.
    pub fn unique_fields(&self) -> &[Vec<String>] {
        &self.unique_fields
    }

    /// The unique group made of exactly these fields, in any order.
    pub fn unique_group<S: AsRef<str>>(&self, names: &[S]) -> Option<&[String]> {
        self.unique_fields
            .iter()
            .find(|group| {
                group.len() == names.len()
                    && names.iter().all(|n| group.iter().any(|g| g == n.as_ref()))
            })
            .map(Vec::as_slice)
    }

    /// Declared relationships.
    pub fn relationships(&self) -> &[RelationDef] {
        &self.relationships
    }

    /// Look up a relationship by identifier.
    pub fn relationship(&self, id: &str) -> Option<&RelationDef> {
        self.relationships.iter().find(|r| r.id() == id)
    }

    /// The relationship holding a property.
    pub fn relationship_for_property(&self, property: &str) -> Option<&RelationDef> {
        self.relationships
            .iter()
            .find(|r| r.property_names.iter().any(|p| p == property))
    }

    /// Query shape for "select all" style queries.
    pub fn query_shape(&self) -> &QueryShape {
        &self.query_shape
    }

    /// Entity type whose permissions apply.
    pub fn rights_entity(&self) -> &str {
        &self.rights_entity
    }

    /// Maximum string length of a field.
    pub fn max_length(&self, field: &str) -> Option<usize> {
        self.field(field).and_then(|f| f.size)
    }

    /// Fields assigned by the store on insert.
    pub fn autoincrement_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.autoincrement)
    }

    /// Whether any primary-key field is store-assigned.
    pub fn has_autoincrement_key(&self) -> bool {
        self.primary_key
            .iter()
            .any(|k| self.field(k).is_some_and(|f| f.autoincrement))
    }
}

fn find_property<'a>(
    properties: &'a [Property],
    index: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a Property> {
    index.get(name).map(|&i| &properties[i])
}

fn same_group(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::FieldType;
    use tabula_proto::ColumnRef;

    fn user_properties() -> Vec<PropertyDef> {
        vec![
            PropertyDef::field("user_id", FieldType::UnsignedInteger).with_autoincrement(),
            PropertyDef::field("email", FieldType::String)
                .with_required()
                .with_size(80),
            PropertyDef::field("name", FieldType::String),
            PropertyDef::relationship("posts"),
        ]
    }

    fn user_schema() -> SchemaDef {
        SchemaDef::new("users", ["user_id"])
            .with_unique(["email"])
            .with_relationship(
                RelationDef::many_to_one("posts", "post").with_related_property("author_id"),
            )
            .with_order(OrderSpec::asc("name"))
    }

    #[test]
    fn test_build_prepends_primary_key() {
        let schema = Schema::build("user", user_schema(), user_properties()).unwrap();

        assert_eq!(schema.unique_fields().len(), 2);
        assert_eq!(schema.unique_fields()[0], vec!["user_id".to_string()]);
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.max_length("email"), Some(80));
        assert!(schema.has_autoincrement_key());
        assert_eq!(schema.rights_entity(), "user");
        assert!(schema.unique_group(&["email"]).is_some());
        assert!(schema.unique_group(&["name"]).is_none());
    }

    #[test]
    fn test_pk_not_duplicated_in_groups() {
        let def = user_schema().with_unique(["user_id"]);
        let schema = Schema::build("user", def, user_properties()).unwrap();
        assert_eq!(schema.unique_fields().len(), 2);
    }

    #[test]
    fn test_default_query_shape() {
        let schema = Schema::build("user", user_schema(), user_properties()).unwrap();
        let query = schema
            .query_shape()
            .select(vec![Condition::eq("email", "a@b.c")], &SelectOptions::default());

        assert_eq!(query.tables[0].table, "users");
        assert_eq!(query.options.order_by.len(), 1);
        assert_eq!(query.conditions[0].column, ColumnRef::new("email"));
    }

    #[test]
    fn test_aliased_shape_qualifies_columns() {
        let shape = QueryShape::aliased("u", "users").with_order(OrderSpec::asc("name"));
        let def = user_schema().with_query_shape(shape);
        let schema = Schema::build("user", def, user_properties()).unwrap();
        let query = schema
            .query_shape()
            .select(vec![Condition::eq("email", "x")], &SelectOptions::default());

        assert_eq!(query.conditions[0].column, ColumnRef::qualified("u", "email"));
        assert_eq!(query.options.order_by[0].column, ColumnRef::qualified("u", "name"));
    }

    #[test]
    fn test_relationship_source_mismatch() {
        let mut props = user_properties();
        props.pop();
        props.push(PropertyDef::field("posts", FieldType::Array));
        let err = Schema::build("user", user_schema(), props).unwrap_err();
        assert!(matches!(err, SchemaError::SourceMismatch { .. }));
    }

    #[test]
    fn test_unbound_relationship_property() {
        let def = SchemaDef::new("users", ["user_id"]);
        let err = Schema::build("user", def, user_properties()).unwrap_err();
        assert!(matches!(err, SchemaError::UnboundRelationshipProperty { .. }));
    }

    #[test]
    fn test_many_to_many_requires_junction() {
        let mut rel = RelationDef::many_to_many("posts", "post", "post_users");
        rel.junction_table = None;
        let def = SchemaDef::new("users", ["user_id"]).with_relationship(rel);
        let err = Schema::build("user", def, user_properties()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingJunctionTable { .. }));
    }

    #[test]
    fn test_primary_key_must_be_field() {
        let def = SchemaDef::new("users", ["posts"]).with_relationship(
            RelationDef::many_to_one("posts", "post").with_related_property("author_id"),
        );
        let err = Schema::build("user", def, user_properties()).unwrap_err();
        assert!(matches!(err, SchemaError::NotAField { .. }));
    }

    #[test]
    fn test_duplicate_property() {
        let mut props = user_properties();
        props.push(PropertyDef::field("email", FieldType::String));
        let err = Schema::build("user", user_schema(), props).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_query_shape_must_start_with_table() {
        let def = user_schema().with_query_shape(QueryShape::table("accounts"));
        let err = Schema::build("user", def, user_properties()).unwrap_err();
        assert!(matches!(err, SchemaError::QueryShapeTable { .. }));
    }
}
