//! Relationship definitions between entities.

/// Cardinality of a relationship, seen from the declaring entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// The declaring entity's field references exactly one related entity,
    /// which references it back.
    OneToOne,
    /// The declaring entity's field references one related entity, which may
    /// be referenced by many.
    OneToMany,
    /// Many related entities reference the declaring entity through their
    /// foreign-key fields.
    ManyToOne,
    /// Entities are paired through rows of a junction table.
    ManyToMany,
}

impl RelationshipKind {
    /// Whether the relationship is computed by querying related rows.
    pub fn is_computed(&self) -> bool {
        matches!(self, RelationshipKind::ManyToOne | RelationshipKind::ManyToMany)
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipKind::OneToOne => write!(f, "one-to-one"),
            RelationshipKind::OneToMany => write!(f, "one-to-many"),
            RelationshipKind::ManyToOne => write!(f, "many-to-one"),
            RelationshipKind::ManyToMany => write!(f, "many-to-many"),
        }
    }
}

/// A relationship declared by an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Properties holding the relationship's value.
    pub property_names: Vec<String>,
    /// Cardinality.
    pub kind: RelationshipKind,
    /// Related entity type.
    pub related_entity: String,
    /// Reciprocal properties on the related type.
    ///
    /// For many-to-one relationships these are the related type's foreign-key
    /// fields; otherwise at most one property whose cached value must be
    /// purged when this side changes.
    pub related_property_names: Vec<String>,
    /// Junction table (many-to-many only).
    pub junction_table: Option<String>,
    /// Whether the value is resolved eagerly when an instance loads.
    pub autoload: bool,
}

impl RelationDef {
    /// Create a relationship of the given kind on one property.
    pub fn new(
        kind: RelationshipKind,
        property: impl Into<String>,
        related_entity: impl Into<String>,
    ) -> Self {
        Self {
            property_names: vec![property.into()],
            kind,
            related_entity: related_entity.into(),
            related_property_names: Vec::new(),
            junction_table: None,
            autoload: true,
        }
    }

    /// One-to-one relationship held in `property`.
    pub fn one_to_one(property: impl Into<String>, related_entity: impl Into<String>) -> Self {
        Self::new(RelationshipKind::OneToOne, property, related_entity)
    }

    /// One-to-many relationship held in `property`.
    pub fn one_to_many(property: impl Into<String>, related_entity: impl Into<String>) -> Self {
        Self::new(RelationshipKind::OneToMany, property, related_entity)
    }

    /// Many-to-one relationship exposed as `property`.
    pub fn many_to_one(property: impl Into<String>, related_entity: impl Into<String>) -> Self {
        Self::new(RelationshipKind::ManyToOne, property, related_entity)
    }

    /// Many-to-many relationship exposed as `property`, stored in `junction_table`.
    pub fn many_to_many(
        property: impl Into<String>,
        related_entity: impl Into<String>,
        junction_table: impl Into<String>,
    ) -> Self {
        Self {
            junction_table: Some(junction_table.into()),
            ..Self::new(RelationshipKind::ManyToMany, property, related_entity)
        }
    }

    /// Replace the holding properties (composite foreign keys).
    pub fn with_properties<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.property_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add a reciprocal property on the related type.
    pub fn with_related_property(mut self, name: impl Into<String>) -> Self {
        self.related_property_names.push(name.into());
        self
    }

    /// Resolve the value on first access instead of on load.
    pub fn lazy(mut self) -> Self {
        self.autoload = false;
        self
    }

    /// Relationship identifier: the holding property names, comma-joined.
    pub fn id(&self) -> String {
        self.property_names.join(",")
    }

    /// The single holding property.
    pub fn property(&self) -> &str {
        self.property_names.first().map(String::as_str).unwrap_or_default()
    }
}
