//! In-memory store for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use confab_common::{DeviceId, EntityKind, Error, Result, UserId};

use crate::change_log::{ChangeLog, ChangeRecord, ChangeStatus};
use crate::conflict::{ConflictResolution, ConflictStore, SyncConflict};
use crate::metadata::{SyncCommit, SyncCursor, SyncMetadataStore, Tombstone};

#[derive(Default)]
struct Inner {
    changes: HashMap<String, ChangeRecord>,
    cursors: HashMap<String, SyncCursor>,
    tombstones: HashMap<(EntityKind, String), Tombstone>,
    conflicts: HashMap<String, SyncConflict>,
    resolutions: Vec<(String, ConflictResolution)>,
}

impl Inner {
    fn mark_synced_ids(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(record) = self.changes.get_mut(id) {
                record.status = ChangeStatus::Synced;
                record.last_error = None;
            }
        }
    }

    fn retarget_entity(&mut self, local_id: &str, server_id: &str) {
        for record in self.changes.values_mut() {
            if record.entity_id == local_id {
                record.entity_id = server_id.to_string();
            }
        }
    }

    fn insert_conflict(&mut self, conflict: SyncConflict) {
        self.conflicts.entry(conflict.id.clone()).or_insert(conflict);
    }
}

/// In-memory implementation of all store contracts.
///
/// All state is held behind one lock and lost on drop. Useful for tests
/// and for exercising the engine without a database file.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Recorded resolutions, oldest first (inspection helper for tests).
    pub fn resolutions(&self) -> Vec<(String, ConflictResolution)> {
        self.inner.read().unwrap().resolutions.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeLog for MemoryStore {
    async fn append(&self, record: ChangeRecord) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.changes.contains_key(&record.id) {
            return Err(Error::AlreadyExists(format!(
                "change record {} already in log",
                record.id
            )));
        }
        inner.changes.insert(record.id.clone(), record);
        Ok(())
    }

    async fn pending_for(&self, user_id: &UserId) -> Result<Vec<ChangeRecord>> {
        let inner = self.inner.read().unwrap();
        let mut pending: Vec<ChangeRecord> = inner
            .changes
            .values()
            .filter(|r| r.status == ChangeStatus::Pending && &r.user_id == user_id)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.timestamp);
        Ok(pending)
    }

    async fn get(&self, id: &str) -> Result<Option<ChangeRecord>> {
        Ok(self.inner.read().unwrap().changes.get(id).cloned())
    }

    async fn count_pending(&self) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .changes
            .values()
            .filter(|r| r.status == ChangeStatus::Pending)
            .count())
    }

    async fn count_failed(&self) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .changes
            .values()
            .filter(|r| r.status == ChangeStatus::Failed)
            .count())
    }

    async fn mark_synced(&self, ids: &[String]) -> Result<()> {
        self.inner.write().unwrap().mark_synced_ids(ids);
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let record = inner
            .changes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("change record {}", id)))?;
        if record.status == ChangeStatus::Synced {
            return Err(Error::Storage(format!(
                "change record {} is already synced and cannot fail",
                id
            )));
        }
        record.status = ChangeStatus::Failed;
        record.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_pending(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let record = inner
            .changes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("change record {}", id)))?;
        if record.status != ChangeStatus::Failed {
            return Err(Error::Storage(format!(
                "change record {} is {:?}, only failed records can be retried",
                id, record.status
            )));
        }
        record.status = ChangeStatus::Pending;
        Ok(())
    }

    async fn retarget(&self, local_entity_id: &str, server_entity_id: &str) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .retarget_entity(local_entity_id, server_entity_id);
        Ok(())
    }
}

#[async_trait]
impl SyncMetadataStore for MemoryStore {
    async fn cursor(&self, device_id: &DeviceId) -> Result<Option<SyncCursor>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .cursors
            .get(device_id.as_str())
            .cloned())
    }

    async fn advance_cursor(&self, device_id: &DeviceId, timestamp: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let cursor = inner
            .cursors
            .entry(device_id.as_str().to_string())
            .or_insert_with(|| SyncCursor {
                device_id: device_id.clone(),
                last_sync_timestamp: 0,
                needs_full_resync: false,
            });
        if timestamp > cursor.last_sync_timestamp {
            cursor.last_sync_timestamp = timestamp;
        }
        Ok(())
    }

    async fn mark_full_resync(&self, device_id: &DeviceId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let cursor = inner
            .cursors
            .entry(device_id.as_str().to_string())
            .or_insert_with(|| SyncCursor {
                device_id: device_id.clone(),
                last_sync_timestamp: 0,
                needs_full_resync: false,
            });
        cursor.last_sync_timestamp = 0;
        cursor.needs_full_resync = true;
        Ok(())
    }

    async fn clear_full_resync(&self, device_id: &DeviceId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(cursor) = inner.cursors.get_mut(device_id.as_str()) {
            cursor.needs_full_resync = false;
        }
        Ok(())
    }

    async fn put_tombstone(&self, tombstone: Tombstone) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let key = (tombstone.entity_kind, tombstone.entity_id.clone());
        match inner.tombstones.get_mut(&key) {
            // Earliest deletion wins on duplicate writes.
            Some(existing) => {
                if tombstone.deleted_at < existing.deleted_at {
                    existing.deleted_at = tombstone.deleted_at;
                }
            }
            None => {
                inner.tombstones.insert(key, tombstone);
            }
        }
        Ok(())
    }

    async fn tombstone(&self, kind: EntityKind, entity_id: &str) -> Result<Option<Tombstone>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .tombstones
            .get(&(kind, entity_id.to_string()))
            .cloned())
    }

    async fn count_tombstones(&self) -> Result<usize> {
        Ok(self.inner.read().unwrap().tombstones.len())
    }
}

#[async_trait]
impl ConflictStore for MemoryStore {
    async fn insert(&self, conflict: SyncConflict) -> Result<()> {
        self.inner.write().unwrap().insert_conflict(conflict);
        Ok(())
    }

    async fn conflict(&self, id: &str) -> Result<Option<SyncConflict>> {
        Ok(self.inner.read().unwrap().conflicts.get(id).cloned())
    }

    async fn unresolved(&self) -> Result<Vec<SyncConflict>> {
        let inner = self.inner.read().unwrap();
        let mut conflicts: Vec<SyncConflict> = inner.conflicts.values().cloned().collect();
        conflicts.sort_by_key(|c| c.detected_at);
        Ok(conflicts)
    }

    async fn count_unresolved(&self) -> Result<usize> {
        Ok(self.inner.read().unwrap().conflicts.len())
    }

    async fn record_resolution(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.conflicts.remove(conflict_id).is_none() {
            return Err(Error::NotFound(format!("conflict {}", conflict_id)));
        }
        inner
            .resolutions
            .push((conflict_id.to_string(), resolution));
        Ok(())
    }
}

#[async_trait]
impl SyncCommit for MemoryStore {
    async fn commit_server_ack(
        &self,
        synced_ids: &[String],
        remaps: &[(String, String)],
        conflicts: Vec<SyncConflict>,
    ) -> Result<()> {
        // Single lock acquisition makes the whole acknowledgement atomic.
        let mut inner = self.inner.write().unwrap();
        inner.mark_synced_ids(synced_ids);
        for (local_id, server_id) in remaps {
            inner.retarget_entity(local_id, server_id);
        }
        for conflict in conflicts {
            inner.insert_conflict(conflict);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_common::Operation;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    fn record(entity_id: &str, op: Operation) -> ChangeRecord {
        ChangeRecord::new(
            UserId::new("alice").unwrap(),
            DeviceId::new("phone").unwrap(),
            EntityKind::Event,
            entity_id,
            op,
            "{}",
        )
    }

    #[tokio::test]
    async fn test_append_and_pending() {
        let store = store();
        let r1 = record("evt-1", Operation::Create);
        let r2 = record("evt-2", Operation::Update);
        store.append(r1.clone()).await.unwrap();
        store.append(r2.clone()).await.unwrap();

        let alice = UserId::new("alice").unwrap();
        let pending = store.pending_for(&alice).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(store.count_pending().await.unwrap(), 2);

        let bob = UserId::new("bob").unwrap();
        assert!(store.pending_for(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_append_rejected() {
        let store = store();
        let r = record("evt-1", Operation::Create);
        store.append(r.clone()).await.unwrap();
        assert!(store.append(r).await.is_err());
    }

    #[tokio::test]
    async fn test_status_never_leaves_synced() {
        let store = store();
        let r = record("evt-1", Operation::Create);
        let id = r.id.clone();
        store.append(r).await.unwrap();

        store.mark_synced(&[id.clone()]).await.unwrap();
        assert!(store.mark_failed(&id, "boom").await.is_err());

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Synced);
    }

    #[tokio::test]
    async fn test_failed_retry_cycle() {
        let store = store();
        let r = record("evt-1", Operation::Create);
        let id = r.id.clone();
        store.append(r).await.unwrap();

        store.mark_failed(&id, "server hiccup").await.unwrap();
        assert_eq!(store.count_failed().await.unwrap(), 1);
        assert_eq!(store.count_pending().await.unwrap(), 0);

        store.mark_pending(&id).await.unwrap();
        assert_eq!(store.count_pending().await.unwrap(), 1);

        // Only failed records can be re-queued.
        assert!(store.mark_pending(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let store = store();
        let r = record("evt-1", Operation::Create);
        let id = r.id.clone();
        store.append(r).await.unwrap();

        store.mark_synced(&[id.clone()]).await.unwrap();
        store
            .mark_synced(&[id.clone(), "no-such-id".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retarget_rewrites_all_records() {
        let store = store();
        store.append(record("local-1", Operation::Create)).await.unwrap();
        store.append(record("local-1", Operation::Update)).await.unwrap();
        store.append(record("other", Operation::Create)).await.unwrap();

        store.retarget("local-1", "srv-42").await.unwrap();

        let alice = UserId::new("alice").unwrap();
        let pending = store.pending_for(&alice).await.unwrap();
        let retargeted = pending.iter().filter(|r| r.entity_id == "srv-42").count();
        assert_eq!(retargeted, 2);
        assert!(pending.iter().any(|r| r.entity_id == "other"));
    }

    #[tokio::test]
    async fn test_cursor_monotonic() {
        let store = store();
        let device = DeviceId::new("phone").unwrap();

        assert!(store.cursor(&device).await.unwrap().is_none());

        store.advance_cursor(&device, 100).await.unwrap();
        store.advance_cursor(&device, 50).await.unwrap();

        let cursor = store.cursor(&device).await.unwrap().unwrap();
        assert_eq!(cursor.last_sync_timestamp, 100);
    }

    #[tokio::test]
    async fn test_full_resync_resets_cursor() {
        let store = store();
        let device = DeviceId::new("phone").unwrap();
        store.advance_cursor(&device, 500).await.unwrap();

        store.mark_full_resync(&device).await.unwrap();
        let cursor = store.cursor(&device).await.unwrap().unwrap();
        assert_eq!(cursor.last_sync_timestamp, 0);
        assert!(cursor.needs_full_resync);

        store.clear_full_resync(&device).await.unwrap();
        let cursor = store.cursor(&device).await.unwrap().unwrap();
        assert!(!cursor.needs_full_resync);
    }

    #[tokio::test]
    async fn test_tombstone_earliest_deletion_wins() {
        let store = store();
        store
            .put_tombstone(Tombstone {
                entity_kind: EntityKind::Event,
                entity_id: "evt-1".into(),
                deleted_at: 200,
            })
            .await
            .unwrap();
        store
            .put_tombstone(Tombstone {
                entity_kind: EntityKind::Event,
                entity_id: "evt-1".into(),
                deleted_at: 100,
            })
            .await
            .unwrap();

        let t = store
            .tombstone(EntityKind::Event, "evt-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.deleted_at, 100);
        assert_eq!(store.count_tombstones().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflict_insert_idempotent_and_resolution() {
        let store = store();
        let conflict = SyncConflict {
            id: "c-1".into(),
            entity_type: "events".into(),
            entity_id: "evt-1".into(),
            local_version: "local".into(),
            remote_version: "remote".into(),
            timestamp: 100,
            server_timestamp: 200,
            detected_at: 1,
        };
        store.insert(conflict.clone()).await.unwrap();
        store.insert(conflict).await.unwrap();
        assert_eq!(store.count_unresolved().await.unwrap(), 1);

        store
            .record_resolution(
                "c-1",
                ConflictResolution::new(
                    crate::ConflictStrategy::ServerWins,
                    crate::SelectedVersion::Remote,
                ),
            )
            .await
            .unwrap();
        assert_eq!(store.count_unresolved().await.unwrap(), 0);
        assert_eq!(store.resolutions().len(), 1);

        assert!(store
            .record_resolution(
                "c-1",
                ConflictResolution::new(
                    crate::ConflictStrategy::ServerWins,
                    crate::SelectedVersion::Remote,
                ),
            )
            .await
            .is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_cursor_never_decreases(
            timestamps in proptest::collection::vec(0i64..1_000_000, 1..50)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let device = DeviceId::new("phone").unwrap();
                let mut max_seen = 0;
                for ts in timestamps {
                    store.advance_cursor(&device, ts).await.unwrap();
                    max_seen = max_seen.max(ts);
                    let cursor = store.cursor(&device).await.unwrap().unwrap();
                    assert_eq!(cursor.last_sync_timestamp, max_seen);
                }
            });
        }
    }

    #[tokio::test]
    async fn test_commit_server_ack_applies_everything() {
        let store = store();
        let r = record("local-1", Operation::Create);
        let id = r.id.clone();
        store.append(r).await.unwrap();

        let conflict = SyncConflict {
            id: "c-1".into(),
            entity_type: "votes".into(),
            entity_id: "v-1".into(),
            local_version: "a".into(),
            remote_version: "b".into(),
            timestamp: 1,
            server_timestamp: 2,
            detected_at: 3,
        };

        store
            .commit_server_ack(
                &[id.clone()],
                &[("local-1".to_string(), "srv-9".to_string())],
                vec![conflict],
            )
            .await
            .unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Synced);
        assert_eq!(stored.entity_id, "srv-9");
        assert_eq!(store.count_unresolved().await.unwrap(), 1);
    }
}
