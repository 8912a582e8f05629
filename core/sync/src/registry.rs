//! Entity repository contract and the registry the engine dispatches
//! through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use confab_common::{EntityKind, Error, Operation, Result};

/// Contract the entity repositories fulfil for the sync core.
///
/// Repositories own entity schemas and (de)serialization; the engine
/// hands them opaque payloads. `apply_server_change` must be idempotent:
/// the at-least-once delivery of server changes means the same mutation
/// may arrive twice after a crash.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Apply one inbound server mutation to local entity storage.
    ///
    /// # Errors
    /// - `Serialization` if the payload does not parse (the engine skips
    ///   the change and continues)
    /// - `Storage` if persistence fails (the engine aborts before the
    ///   cursor advances so the batch is re-fetched)
    async fn apply_server_change(
        &self,
        operation: Operation,
        entity_id: &str,
        payload: &str,
    ) -> Result<()>;

    /// Rewrite a locally generated entity id to the server-assigned one
    /// in the repository's own tables.
    async fn remap_entity_id(&self, local_id: &str, server_id: &str) -> Result<()>;
}

/// Registry of repositories keyed by entity kind.
///
/// A compile-time-checked extension point: adding a synced entity means
/// adding an [`EntityKind`] variant and registering its repository here.
pub struct RepositoryRegistry {
    handlers: HashMap<EntityKind, Arc<dyn EntityRepository>>,
}

impl RepositoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a repository for an entity kind.
    ///
    /// # Errors
    /// - Returns error if the kind is already registered
    pub fn register(
        &mut self,
        kind: EntityKind,
        repository: Arc<dyn EntityRepository>,
    ) -> Result<()> {
        if self.handlers.contains_key(&kind) {
            return Err(Error::AlreadyExists(format!(
                "repository for '{}' is already registered",
                kind
            )));
        }
        self.handlers.insert(kind, repository);
        Ok(())
    }

    /// Resolve the repository for a kind.
    pub fn get(&self, kind: EntityKind) -> Option<&Arc<dyn EntityRepository>> {
        self.handlers.get(&kind)
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for RepositoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
