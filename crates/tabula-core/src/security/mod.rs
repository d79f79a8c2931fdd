//! Access control.
//!
//! The engine asks an [`AccessControl`] implementation whether the current
//! actor may create, edit or delete instances of an entity type. Types may
//! borrow another type's rights through their schema's rights entity.

mod capability;

pub use capability::{Capability, CapabilityAccess, CapabilityError, EntityScope};

use std::fmt;

/// Mutating action on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Insert a new instance.
    Create,
    /// Update an existing instance.
    Edit,
    /// Remove an instance.
    Delete,
}

impl Action {
    /// Lowercase action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission identifier for an action on an entity type.
///
/// The type name is lowercased and path separators become dashes, so
/// `Blog::Post` and `edit` give `blog-post-edit`.
pub fn permission_id(entity_type: &str, action: Action) -> String {
    let name = entity_type
        .replace("::", "-")
        .replace(['\\', '/'], "-")
        .to_lowercase();
    format!("{}-{}", name, action)
}

/// Decides whether the current actor may perform an action.
pub trait AccessControl: Send + Sync {
    /// Whether `action` on instances of `entity_type` is allowed.
    fn authorize(&self, entity_type: &str, action: Action) -> bool;
}

/// Allows everything. For trusted contexts such as maintenance jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn authorize(&self, _entity_type: &str, _action: Action) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_id() {
        assert_eq!(permission_id("Page", Action::Edit), "page-edit");
        assert_eq!(permission_id("Blog::Post", Action::Create), "blog-post-create");
        assert_eq!(permission_id("App\\Tag", Action::Delete), "app-tag-delete");
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.authorize("anything", Action::Delete));
    }
}
