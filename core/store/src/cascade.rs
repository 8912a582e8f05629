//! Cascade-consistent delete glue.
//!
//! Entity repositories own the actual table deletions; this builder
//! produces the matching change-log records in dependent-then-parent
//! order and writes the tombstones that make the deletions terminal.

use tracing::debug;

use confab_common::{now_millis, DeviceId, EntityKind, Operation, Result, UserId};

use crate::change_log::{ChangeLog, ChangeRecord};
use crate::metadata::{SyncMetadataStore, Tombstone};

/// Ordered decomposition of a parent delete with dependents.
///
/// Dependent records are appended before the parent so a batched upload
/// never references a parent that is already gone on the server. Every
/// deleted entity gets exactly one tombstone; the parent's is written
/// last, after its change record exists, so the tombstone can never be
/// missing while the delete is in flight.
pub struct CascadeDelete {
    user_id: UserId,
    device_id: DeviceId,
    parent: (EntityKind, String),
    dependents: Vec<(EntityKind, String)>,
}

impl CascadeDelete {
    /// Start a cascade rooted at the parent entity.
    pub fn new(
        user_id: UserId,
        device_id: DeviceId,
        parent_kind: EntityKind,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            device_id,
            parent: (parent_kind, parent_id.into()),
            dependents: Vec::new(),
        }
    }

    /// Add a dependent entity to delete before the parent.
    pub fn dependent(mut self, kind: EntityKind, id: impl Into<String>) -> Self {
        self.dependents.push((kind, id.into()));
        self
    }

    /// Append the delete records and write the tombstones.
    ///
    /// Returns the appended records in the order they were logged.
    pub async fn execute<S>(self, store: &S) -> Result<Vec<ChangeRecord>>
    where
        S: ChangeLog + SyncMetadataStore,
    {
        let deleted_at = now_millis();
        let mut records = Vec::with_capacity(self.dependents.len() + 1);

        for (kind, id) in self
            .dependents
            .iter()
            .chain(std::iter::once(&self.parent))
        {
            let record = ChangeRecord::new(
                self.user_id.clone(),
                self.device_id.clone(),
                *kind,
                id.clone(),
                Operation::Delete,
                String::new(),
            );
            store.append(record.clone()).await?;
            records.push(record);
        }

        debug!(
            parent = %self.parent.1,
            dependents = self.dependents.len(),
            "Cascade delete logged"
        );

        for (kind, id) in &self.dependents {
            store
                .put_tombstone(Tombstone {
                    entity_kind: *kind,
                    entity_id: id.clone(),
                    deleted_at,
                })
                .await?;
        }
        store
            .put_tombstone(Tombstone {
                entity_kind: self.parent.0,
                entity_id: self.parent.1.clone(),
                deleted_at,
            })
            .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::ChangeStatus;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_dependents_logged_before_parent() {
        let store = MemoryStore::new();
        let records = CascadeDelete::new(
            UserId::new("alice").unwrap(),
            DeviceId::new("phone").unwrap(),
            EntityKind::Event,
            "evt-1",
        )
        .dependent(EntityKind::Vote, "v-1")
        .dependent(EntityKind::Vote, "v-2")
        .dependent(EntityKind::TimeSlot, "ts-1")
        .dependent(EntityKind::Participant, "p-1")
        .execute(&store)
        .await
        .unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records.last().unwrap().entity_kind, EntityKind::Event);
        assert!(records
            .iter()
            .all(|r| r.operation == Operation::Delete && r.payload.is_empty()));
        // Parent comes strictly after every dependent.
        assert!(records[..4].iter().all(|r| r.entity_kind != EntityKind::Event));
    }

    #[tokio::test]
    async fn test_one_tombstone_per_deleted_entity() {
        let store = MemoryStore::new();
        CascadeDelete::new(
            UserId::new("alice").unwrap(),
            DeviceId::new("phone").unwrap(),
            EntityKind::Event,
            "evt-1",
        )
        .dependent(EntityKind::Vote, "v-1")
        .execute(&store)
        .await
        .unwrap();

        assert_eq!(store.count_tombstones().await.unwrap(), 2);
        assert!(store
            .tombstone(EntityKind::Event, "evt-1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .tombstone(EntityKind::Vote, "v-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_records_are_pending_deletes() {
        let store = MemoryStore::new();
        let records = CascadeDelete::new(
            UserId::new("alice").unwrap(),
            DeviceId::new("phone").unwrap(),
            EntityKind::Scenario,
            "sc-1",
        )
        .execute(&store)
        .await
        .unwrap();

        let stored = store.get(&records[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Pending);
        assert_eq!(stored.operation, Operation::Delete);
    }
}
