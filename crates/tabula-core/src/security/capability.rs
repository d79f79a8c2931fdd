//! Capability-based access control.
//!
//! Capabilities are written as `action:scope` strings, for example
//! `create:*`, `edit:Page*` or `delete:Tag`; `admin` grants everything.

use super::{AccessControl, Action};
use std::collections::HashSet;
use thiserror::Error;

/// Capability parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The string is not a known capability.
    #[error("invalid capability format: {0}")]
    InvalidFormat(String),
}

/// Scope of entity types a capability covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityScope {
    /// Every entity type.
    All,
    /// One entity type.
    Entity(String),
    /// Entity types matching a pattern with a leading or trailing `*`.
    Pattern(String),
}

impl EntityScope {
    fn parse(scope: Option<&str>) -> Self {
        match scope {
            None | Some("*") => EntityScope::All,
            Some(s) if s.contains('*') => EntityScope::Pattern(s.to_string()),
            Some(s) => EntityScope::Entity(s.to_string()),
        }
    }

    /// Whether the scope covers an entity type.
    pub fn matches(&self, entity: &str) -> bool {
        match self {
            EntityScope::All => true,
            EntityScope::Entity(name) => name == entity,
            EntityScope::Pattern(pattern) => {
                if let Some(prefix) = pattern.strip_suffix('*') {
                    entity.starts_with(prefix)
                } else if let Some(suffix) = pattern.strip_prefix('*') {
                    entity.ends_with(suffix)
                } else {
                    entity == pattern
                }
            }
        }
    }
}

/// A granted capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Permission for one action on a scope of entity types.
    Action(Action, EntityScope),
    /// Every action on every entity type.
    Admin,
}

impl Capability {
    /// Parse a capability string.
    pub fn parse(s: &str) -> Result<Self, CapabilityError> {
        let (operation, scope) = match s.split_once(':') {
            Some((operation, scope)) => (operation, Some(scope)),
            None => (s, None),
        };
        let action = match operation {
            "admin" => return Ok(Capability::Admin),
            "create" => Action::Create,
            "edit" => Action::Edit,
            "delete" => Action::Delete,
            other => {
                return Err(CapabilityError::InvalidFormat(format!(
                    "unknown action: {}",
                    other
                )))
            }
        };
        Ok(Capability::Action(action, EntityScope::parse(scope)))
    }

    /// Whether the capability allows `action` on `entity`.
    pub fn allows(&self, entity: &str, action: Action) -> bool {
        match self {
            Capability::Admin => true,
            Capability::Action(granted, scope) => *granted == action && scope.matches(entity),
        }
    }
}

/// Access control backed by a set of capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilityAccess {
    capabilities: HashSet<Capability>,
}

impl CapabilityAccess {
    /// Create an access control that allows nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse capabilities from strings.
    pub fn from_strings(strings: &[&str]) -> Result<Self, CapabilityError> {
        let capabilities = strings
            .iter()
            .map(|s| Capability::parse(s))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { capabilities })
    }

    /// Grant a capability.
    pub fn grant(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Revoke a capability.
    pub fn revoke(&mut self, capability: &Capability) {
        self.capabilities.remove(capability);
    }

    /// Number of granted capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether nothing is granted.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl AccessControl for CapabilityAccess {
    fn authorize(&self, entity_type: &str, action: Action) -> bool {
        self.capabilities
            .iter()
            .any(|capability| capability.allows(entity_type, action))
    }
}
