//! The local change log: durable, per-user append log of pending mutations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use confab_common::{now_millis, DeviceId, EntityKind, Operation, Result, UserId};

/// Propagation status of a change record.
///
/// Transitions only move forward: `Pending -> Synced`, or
/// `Pending -> Failed -> Pending` on retry. A record never leaves
/// `Synced`; stores enforce this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeStatus {
    Pending,
    Synced,
    Failed,
}

impl ChangeStatus {
    /// Storage/table form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "PENDING",
            ChangeStatus::Synced => "SYNCED",
            ChangeStatus::Failed => "FAILED",
        }
    }

    /// Parse the storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ChangeStatus::Pending),
            "SYNCED" => Some(ChangeStatus::Synced),
            "FAILED" => Some(ChangeStatus::Failed),
            _ => None,
        }
    }
}

/// One logical local mutation awaiting propagation.
///
/// Immutable once created apart from `status`/`last_error` and the
/// entity-id rewrite performed by [`ChangeLog::retarget`]. The payload is
/// an opaque serialized snapshot owned by the entity repositories; the
/// sync core never parses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Locally generated unique id for this record.
    pub id: String,
    /// Originating user.
    pub user_id: UserId,
    /// Originating device.
    pub device_id: DeviceId,
    /// Target entity table.
    pub entity_kind: EntityKind,
    /// Target entity id (locally generated until the server retargets it).
    pub entity_id: String,
    /// Mutation type. Set by the owning repository; never inferred here.
    pub operation: Operation,
    /// Opaque snapshot of the entity at mutation time. Empty for deletes.
    pub payload: String,
    /// Logical clock value, wall-clock milliseconds (single writer per device).
    pub timestamp: i64,
    /// Propagation status.
    pub status: ChangeStatus,
    /// Last failure message, if the record was quarantined.
    pub last_error: Option<String>,
}

impl ChangeRecord {
    /// Create a new pending record with a fresh id and current timestamp.
    pub fn new(
        user_id: UserId,
        device_id: DeviceId,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            device_id,
            entity_kind,
            entity_id: entity_id.into(),
            operation,
            payload: payload.into(),
            timestamp: now_millis(),
            status: ChangeStatus::Pending,
            last_error: None,
        }
    }
}

/// Store contract for the local change log.
///
/// All operations are safe to call concurrently with the entity
/// repositories writing their own tables. Where the backing store cannot
/// span both in one transaction, the log write must happen-after the
/// entity write, so a crash can only lose a not-yet-logged mutation
/// (under-sync, never ghost sync).
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// Append a record to the log.
    async fn append(&self, record: ChangeRecord) -> Result<()>;

    /// All pending records for a user, in timestamp order.
    async fn pending_for(&self, user_id: &UserId) -> Result<Vec<ChangeRecord>>;

    /// Fetch a single record by id.
    async fn get(&self, id: &str) -> Result<Option<ChangeRecord>>;

    /// Number of pending records across all users.
    async fn count_pending(&self) -> Result<usize>;

    /// Number of quarantined (failed) records across all users.
    async fn count_failed(&self) -> Result<usize>;

    /// Mark the given records as synced. Idempotent; unknown ids are
    /// ignored so acknowledgements can be replayed safely.
    async fn mark_synced(&self, ids: &[String]) -> Result<()>;

    /// Quarantine a record with a failure message.
    ///
    /// # Errors
    /// - Record not found
    /// - Record already `Synced` (status never moves backward)
    async fn mark_failed(&self, id: &str, error: &str) -> Result<()>;

    /// Return a quarantined record to the pending queue for retry.
    ///
    /// # Errors
    /// - Record not found
    /// - Record is not `Failed`
    async fn mark_pending(&self, id: &str) -> Result<()>;

    /// Rewrite a locally generated entity id to the canonical
    /// server-assigned one, across every record in the log.
    async fn retarget(&self, local_entity_id: &str, server_entity_id: &str) -> Result<()>;
}
