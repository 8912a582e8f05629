//! Conflict records and the store that holds them until resolved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use confab_common::{now_millis, EntityKind, Result};

/// Conflict resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStrategy {
    /// Newest timestamp wins; ties go to the server.
    LastWriteWins,
    /// Local version wins unconditionally.
    ClientWins,
    /// Remote version wins unconditionally.
    ServerWins,
    /// A human must decide; the conflict stays stored until then.
    Manual,
}

impl ConflictStrategy {
    /// Storage form of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "LAST_WRITE_WINS",
            ConflictStrategy::ClientWins => "CLIENT_WINS",
            ConflictStrategy::ServerWins => "SERVER_WINS",
            ConflictStrategy::Manual => "MANUAL",
        }
    }

    /// Parse the storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LAST_WRITE_WINS" => Some(ConflictStrategy::LastWriteWins),
            "CLIENT_WINS" => Some(ConflictStrategy::ClientWins),
            "SERVER_WINS" => Some(ConflictStrategy::ServerWins),
            "MANUAL" => Some(ConflictStrategy::Manual),
            _ => None,
        }
    }
}

/// Which side of a conflict was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectedVersion {
    Local,
    Remote,
}

/// A detected divergence between a local and remote version of the same
/// entity since the client's last cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Server-assigned conflict id.
    pub id: String,
    /// Entity table name as sent on the wire. Kept as a string so a
    /// conflict on an unknown kind can still be displayed and discarded.
    pub entity_type: String,
    pub entity_id: String,
    /// Opaque local payload snapshot.
    pub local_version: String,
    /// Opaque remote payload snapshot.
    pub remote_version: String,
    /// Local change time (ms).
    pub timestamp: i64,
    /// Remote change time (ms).
    pub server_timestamp: i64,
    /// When the client stored the conflict (ms).
    #[serde(default = "now_millis")]
    pub detected_at: i64,
}

impl SyncConflict {
    /// Parsed entity kind, if the wire string names a known table.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        EntityKind::parse(&self.entity_type)
    }
}

/// The decision applied to a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub strategy: ConflictStrategy,
    pub selected: SelectedVersion,
    pub resolved_at: i64,
}

impl ConflictResolution {
    /// Record a decision made now.
    pub fn new(strategy: ConflictStrategy, selected: SelectedVersion) -> Self {
        Self {
            strategy,
            selected,
            resolved_at: now_millis(),
        }
    }
}

/// Store contract for undecided conflicts.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Insert a conflict. Idempotent by id so replayed responses do not
    /// duplicate entries.
    async fn insert(&self, conflict: SyncConflict) -> Result<()>;

    /// Fetch a conflict by id.
    async fn conflict(&self, id: &str) -> Result<Option<SyncConflict>>;

    /// All unresolved conflicts, oldest first.
    async fn unresolved(&self) -> Result<Vec<SyncConflict>>;

    /// Number of unresolved conflicts.
    async fn count_unresolved(&self) -> Result<usize>;

    /// Persist a resolution and remove the conflict from the unresolved
    /// set.
    ///
    /// # Errors
    /// - Conflict not found
    async fn record_resolution(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()>;
}
