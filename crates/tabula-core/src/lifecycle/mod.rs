//! Entity lifecycle orchestration.
//!
//! An [`Engine`] owns the schema registry and the collaborators (store,
//! cache, access control). Work happens in a [`Session`]: reads go through
//! the cache unless the session tombstoned the key, and every save or delete
//! is planned first, then applied inside one atomic section whose commit
//! deletes the tombstoned keys from the cache.

mod delete;
mod keys;
mod load;
mod plan;
mod save;
mod values;

pub use plan::{Assignment, CascadePlan, Mode, PlannedMutation};

use crate::cache::{CacheKey, CacheLayer, CachedValue, ComputeFn, TombstoneSet};
use crate::catalog::{EntityDescriptor, Schema, SchemaError, SchemaRegistry};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::relation::RelationshipResolver;
use crate::security::{permission_id, AccessControl, Action, AllowAll};
use crate::store::RelationalStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The lifecycle engine.
pub struct Engine {
    registry: SchemaRegistry,
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn CacheLayer>,
    access: Arc<dyn AccessControl>,
    config: EngineConfig,
}

impl Engine {
    /// Start building an engine over a store and cache.
    pub fn builder(store: Arc<dyn RelationalStore>, cache: Arc<dyn CacheLayer>) -> EngineBuilder {
        EngineBuilder::new(store, cache)
    }

    /// Open a session. Tombstones live as long as the session.
    pub fn session(&self) -> Session<'_> {
        Session {
            engine: self,
            tombstones: TombstoneSet::new(),
        }
    }

    /// Register another entity type.
    ///
    /// Registration happens once per type; links to other types are not
    /// re-validated here.
    pub fn register(&self, descriptor: &dyn EntityDescriptor) -> Result<Arc<Schema>> {
        Ok(self.registry.register(descriptor)?)
    }

    /// Look up a registered schema.
    pub fn schema(&self, entity_type: &str) -> Result<Arc<Schema>> {
        Ok(self.registry.schema(entity_type)?)
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The relational store.
    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// The cache layer.
    pub fn cache(&self) -> &Arc<dyn CacheLayer> {
        &self.cache
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn CacheLayer>,
    access: Arc<dyn AccessControl>,
    config: EngineConfig,
    descriptors: Vec<Box<dyn EntityDescriptor>>,
}

impl EngineBuilder {
    /// Create a builder. Access control defaults to [`AllowAll`].
    pub fn new(store: Arc<dyn RelationalStore>, cache: Arc<dyn CacheLayer>) -> Self {
        Self {
            store,
            cache,
            access: Arc::new(AllowAll),
            config: EngineConfig::default(),
            descriptors: Vec::new(),
        }
    }

    /// Set the access-control service.
    pub fn with_access_control(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an entity type.
    pub fn register(mut self, descriptor: impl EntityDescriptor + 'static) -> Self {
        self.descriptors.push(Box::new(descriptor));
        self
    }

    /// Register every entity type and check the links between them.
    pub fn build(self) -> std::result::Result<Engine, SchemaError> {
        let registry = SchemaRegistry::new();
        for descriptor in &self.descriptors {
            registry.register(descriptor.as_ref())?;
        }
        registry.validate_links()?;

        info!(
            entities = self.descriptors.len(),
            cache_disabled = self.config.cache_disabled,
            "engine ready"
        );
        Ok(Engine {
            registry,
            store: self.store,
            cache: self.cache,
            access: self.access,
            config: self.config,
        })
    }
}

/// A unit of work against an engine.
///
/// Sessions are single-threaded; open one per request.
pub struct Session<'e> {
    engine: &'e Engine,
    tombstones: TombstoneSet,
}

impl<'e> Session<'e> {
    /// The engine this session runs on.
    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Keys invalidated by writes in this session.
    pub fn tombstones(&self) -> &TombstoneSet {
        &self.tombstones
    }

    fn schema(&self, entity_type: &str) -> Result<Arc<Schema>> {
        self.engine.schema(entity_type)
    }

    fn resolver(&self) -> RelationshipResolver<'_> {
        RelationshipResolver::new(&self.engine.registry, self.engine.store.as_ref())
    }

    fn authorize(&self, schema: &Schema, action: Action) -> Result<()> {
        let rights = schema.rights_entity();
        if self.engine.access.authorize(rights, action) {
            return Ok(());
        }
        let permission = permission_id(rights, action);
        debug!(entity = schema.entity_type(), %permission, "permission denied");
        Err(Error::PermissionDenied {
            entity: schema.entity_type().to_string(),
            action,
            permission,
        })
    }

    /// Read a key through the cache, or straight from `compute` when the
    /// cache is disabled or the key is tombstoned.
    fn read_through(&self, key: &CacheKey, compute: &mut ComputeFn<'_>) -> Result<Option<CachedValue>> {
        let config = &self.engine.config;
        if config.cache_disabled {
            self.engine.cache.delete(key);
            return compute(&mut Duration::ZERO);
        }
        if self.tombstones.contains(key) {
            debug!(%key, "key tombstoned, reading store");
            return compute(&mut Duration::ZERO);
        }
        self.engine
            .cache
            .get_with_set_callback(key, config.cache_ttl, compute)
    }

    /// Tombstone keys now and delete them from the cache once the enclosing
    /// atomic section commits.
    fn invalidate(&self, keys: BTreeSet<CacheKey>) {
        if keys.is_empty() {
            return;
        }
        self.tombstones.extend(keys.iter().cloned());
        debug!(keys = keys.len(), "tombstoned cache keys");

        let cache = Arc::clone(&self.engine.cache);
        let keys: Vec<CacheKey> = keys.into_iter().collect();
        self.engine.store.on_commit(Box::new(move || {
            for key in &keys {
                cache.delete(key);
            }
            debug!(keys = keys.len(), "deleted cache keys after commit");
        }));
    }

    /// Run `f` inside one atomic section, rolling back on error.
    fn atomic<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let store = &self.engine.store;
        store.begin_atomic()?;
        match f() {
            Ok(value) => {
                store.commit_atomic()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = store.rollback_atomic() {
                    warn!(error = %rollback, "rollback failed");
                }
                warn!(error = %err, "rolled back atomic section");
                Err(err)
            }
        }
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        let limit = self.engine.config.max_cascade_depth;
        if depth > limit {
            return Err(Error::Internal(format!(
                "cascade depth {} exceeds limit {}",
                depth, limit
            )));
        }
        Ok(())
    }
}
