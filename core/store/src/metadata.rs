//! Per-device sync metadata: cursors, tombstones, and the atomic
//! acknowledgement commit used by the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use confab_common::{DeviceId, EntityKind, Result};

use crate::conflict::SyncConflict;

/// Per-device sync progress marker.
///
/// Everything at or before `last_sync_timestamp` has been exchanged with
/// the server. The cursor is monotonically non-decreasing; an unset
/// cursor reads as epoch 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub device_id: DeviceId,
    pub last_sync_timestamp: i64,
    /// Raised when the server signalled that incremental history diverged
    /// and every local entity needs revalidation.
    pub needs_full_resync: bool,
}

/// Terminal deletion marker for an entity.
///
/// Exactly one tombstone exists per deleted entity. Before applying an
/// inbound CREATE/UPDATE the engine consults the tombstone; a change
/// stamped at or before `deleted_at` is obsolete and must not resurrect
/// the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub deleted_at: i64,
}

/// Store contract for cursors and tombstones.
#[async_trait]
pub trait SyncMetadataStore: Send + Sync {
    /// Read the cursor for a device, if one exists.
    async fn cursor(&self, device_id: &DeviceId) -> Result<Option<SyncCursor>>;

    /// Advance the cursor to `timestamp`, creating it if absent.
    ///
    /// Monotonicity is enforced here: a timestamp below the stored cursor
    /// is a no-op, so replayed responses cannot move the cursor backward.
    async fn advance_cursor(&self, device_id: &DeviceId, timestamp: i64) -> Result<()>;

    /// Reset the cursor to epoch and raise the revalidation flag.
    async fn mark_full_resync(&self, device_id: &DeviceId) -> Result<()>;

    /// Clear the revalidation flag once the caller has re-validated.
    async fn clear_full_resync(&self, device_id: &DeviceId) -> Result<()>;

    /// Record a tombstone. Idempotent per entity; the earliest deletion
    /// wins if written twice.
    async fn put_tombstone(&self, tombstone: Tombstone) -> Result<()>;

    /// Look up the tombstone for an entity.
    async fn tombstone(&self, kind: EntityKind, entity_id: &str) -> Result<Option<Tombstone>>;

    /// Number of recorded tombstones.
    async fn count_tombstones(&self) -> Result<usize>;
}

/// Atomic commit of a server acknowledgement.
///
/// Marks acknowledged records synced, rewrites server-assigned entity
/// ids, and inserts returned conflicts as one local unit of work, so a
/// crash mid-response cannot leave the log half-acknowledged.
#[async_trait]
pub trait SyncCommit: Send + Sync {
    async fn commit_server_ack(
        &self,
        synced_ids: &[String],
        remaps: &[(String, String)],
        conflicts: Vec<SyncConflict>,
    ) -> Result<()>;
}
