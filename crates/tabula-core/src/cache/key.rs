//! Cache key derivation.
//!
//! A key is the entity type, a scope tag and a digest of the field-value set
//! the lookup was made with. Field values are held in a name-sorted map, so
//! the digest does not depend on the order values were supplied in.

use std::fmt;
use tabula_proto::{FieldValues, Value};

/// Scope of lookups by unique group (including the primary key).
const LOOKUP_SCOPE: &str = "lookup";
/// Scope of condition queries returning identifier lists.
const QUERY_SCOPE: &str = "query";
/// Scope of the unconditioned "select all" query.
const ALL_SCOPE: &str = "all";

/// A cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a lookup by unique group.
    ///
    /// Unique lookups compare strings without regard to case, so string
    /// values are lowercased before hashing.
    pub fn derive(entity_type: &str, values: &FieldValues) -> Self {
        let normalized: FieldValues = values
            .iter()
            .map(|(field, value)| (field.clone(), lowercase(value)))
            .collect();
        Self::scoped(entity_type, LOOKUP_SCOPE, &normalized)
    }

    /// Key for a condition query.
    pub fn derive_query(entity_type: &str, conditions: &FieldValues) -> Self {
        Self::scoped(entity_type, QUERY_SCOPE, conditions)
    }

    /// Key for the unconditioned query of an entity type.
    pub fn all(entity_type: &str) -> Self {
        Self(format!("{}:{}", entity_type, ALL_SCOPE))
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn scoped(entity_type: &str, scope: &str, values: &FieldValues) -> Self {
        let encoded = serde_json::to_vec(values).unwrap_or_else(|_| format!("{:?}", values).into_bytes());
        let digest = blake3::hash(&encoded);
        Self(format!(
            "{}:{}:{}",
            entity_type,
            scope,
            hex::encode(&digest.as_bytes()[..16])
        ))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn lowercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, Value)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_order_independent() {
        let mut a = FieldValues::new();
        a.insert("first".into(), Value::from("Ada"));
        a.insert("last".into(), Value::from("Lovelace"));
        let mut b = FieldValues::new();
        b.insert("last".into(), Value::from("Lovelace"));
        b.insert("first".into(), Value::from("Ada"));

        assert_eq!(CacheKey::derive("user", &a), CacheKey::derive("user", &b));
    }

    #[test]
    fn test_distinct_sets_differ() {
        let a = values(&[("email", "a@example.com".into())]);
        let b = values(&[("email", "b@example.com".into())]);
        let c = values(&[("name", "a@example.com".into())]);

        assert_ne!(CacheKey::derive("user", &a), CacheKey::derive("user", &b));
        assert_ne!(CacheKey::derive("user", &a), CacheKey::derive("user", &c));
        assert_ne!(CacheKey::derive("user", &a), CacheKey::derive("tag", &a));
    }

    #[test]
    fn test_scopes_do_not_collide() {
        let v = values(&[("user_id", Value::Int(1))]);
        assert_ne!(CacheKey::derive("user", &v), CacheKey::derive_query("user", &v));
        assert_ne!(CacheKey::all("user"), CacheKey::derive_query("user", &FieldValues::new()));
    }

    #[test]
    fn test_lookup_ignores_case() {
        let a = values(&[("email", "Ada@Example.com".into())]);
        let b = values(&[("email", "ada@example.com".into())]);
        assert_eq!(CacheKey::derive("user", &a), CacheKey::derive("user", &b));
        assert_ne!(
            CacheKey::derive_query("user", &a),
            CacheKey::derive_query("user", &b)
        );
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::derive("post", &values(&[("post_id", "abc".into())]));
        let parts: Vec<_> = key.as_str().split(':').collect();
        assert_eq!(parts[0], "post");
        assert_eq!(parts[1], "lookup");
        assert_eq!(parts[2].len(), 32);
    }
}
