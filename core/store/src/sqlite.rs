//! SQLite-backed store for on-device persistence.
//!
//! One database file holds the change log, per-device sync metadata,
//! tombstones, and conflicts, so the acknowledgement commit can span all
//! of them in a single transaction.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use confab_common::{DeviceId, EntityKind, Error, Operation, Result, UserId};

use crate::change_log::{ChangeLog, ChangeRecord, ChangeStatus};
use crate::conflict::{ConflictResolution, ConflictStore, SyncConflict};
use crate::metadata::{SyncCommit, SyncCursor, SyncMetadataStore, Tombstone};

/// SQLite implementation of all store contracts.
///
/// The connection is guarded by a mutex; store calls are short and run on
/// the calling thread, which matches the engine's expectation that only
/// the network RPC suspends.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open the store database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(storage_err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS change_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL,
                last_error TEXT
            );

            CREATE TABLE IF NOT EXISTS sync_cursors (
                device_id TEXT PRIMARY KEY,
                last_sync_timestamp INTEGER NOT NULL,
                needs_full_resync INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tombstones (
                entity_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                deleted_at INTEGER NOT NULL,
                PRIMARY KEY (entity_kind, entity_id)
            );

            CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                local_version TEXT NOT NULL,
                remote_version TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                server_timestamp INTEGER NOT NULL,
                detected_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conflict_resolutions (
                conflict_id TEXT PRIMARY KEY,
                strategy TEXT NOT NULL,
                selected TEXT NOT NULL,
                resolved_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_change_log_status
                ON change_log(status, user_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_change_log_entity
                ON change_log(entity_id);
            "#,
        )
        .map_err(storage_err)?;

        info!("Sync store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        device_id: row.get(2)?,
        entity_kind: row.get(3)?,
        entity_id: row.get(4)?,
        operation: row.get(5)?,
        payload: row.get(6)?,
        timestamp: row.get(7)?,
        status: row.get(8)?,
        last_error: row.get(9)?,
    })
}

/// Row image before enum/newtype validation.
struct RawRecord {
    id: String,
    user_id: String,
    device_id: String,
    entity_kind: String,
    entity_id: String,
    operation: String,
    payload: String,
    timestamp: i64,
    status: String,
    last_error: Option<String>,
}

impl RawRecord {
    fn into_record(self) -> Result<ChangeRecord> {
        let entity_kind = EntityKind::parse(&self.entity_kind).ok_or_else(|| {
            Error::Storage(format!("unknown entity kind in log: {}", self.entity_kind))
        })?;
        let operation = match self.operation.as_str() {
            "CREATE" => Operation::Create,
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            other => {
                return Err(Error::Storage(format!(
                    "unknown operation in log: {}",
                    other
                )))
            }
        };
        let status = ChangeStatus::parse(&self.status)
            .ok_or_else(|| Error::Storage(format!("unknown status in log: {}", self.status)))?;
        Ok(ChangeRecord {
            id: self.id,
            user_id: UserId::new(self.user_id)?,
            device_id: DeviceId::new(self.device_id)?,
            entity_kind,
            entity_id: self.entity_id,
            operation,
            payload: self.payload,
            timestamp: self.timestamp,
            status,
            last_error: self.last_error,
        })
    }
}

const SELECT_RECORD: &str = "SELECT id, user_id, device_id, entity_kind, entity_id, \
     operation, payload, timestamp, status, last_error FROM change_log";

#[async_trait]
impl ChangeLog for SqliteStore {
    async fn append(&self, record: ChangeRecord) -> Result<()> {
        debug!(change_id = %record.id, entity = %record.entity_id, "Appending change record");
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO change_log
                (id, user_id, device_id, entity_kind, entity_id, operation,
                 payload, timestamp, status, last_error)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    record.id,
                    record.user_id.as_str(),
                    record.device_id.as_str(),
                    record.entity_kind.as_str(),
                    record.entity_id,
                    record.operation.to_string(),
                    record.payload,
                    record.timestamp,
                    record.status.as_str(),
                    record.last_error,
                ],
            )
            .map_err(storage_err)?;
        if inserted == 0 {
            return Err(Error::AlreadyExists(format!(
                "change record {} already in log",
                record.id
            )));
        }
        Ok(())
    }

    async fn pending_for(&self, user_id: &UserId) -> Result<Vec<ChangeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE status = 'PENDING' AND user_id = ?1 ORDER BY timestamp",
                SELECT_RECORD
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([user_id.as_str()], row_to_record)
            .map_err(storage_err)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw.map_err(storage_err)?.into_record()?);
        }
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<ChangeRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_RECORD),
                [id],
                row_to_record,
            )
            .optional()
            .map_err(storage_err)?;
        raw.map(RawRecord::into_record).transpose()
    }

    async fn count_pending(&self) -> Result<usize> {
        self.count_with_status("PENDING")
    }

    async fn count_failed(&self) -> Result<usize> {
        self.count_with_status("FAILED")
    }

    async fn mark_synced(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(storage_err)?;
        mark_synced_in(&tx, ids)?;
        tx.commit().map_err(storage_err)
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let status: Option<String> = conn
            .query_row("SELECT status FROM change_log WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage_err)?;
        match status.as_deref() {
            None => return Err(Error::NotFound(format!("change record {}", id))),
            Some("SYNCED") => {
                return Err(Error::Storage(format!(
                    "change record {} is already synced and cannot fail",
                    id
                )))
            }
            Some(_) => {}
        }
        conn.execute(
            "UPDATE change_log SET status = 'FAILED', last_error = ?2 WHERE id = ?1",
            params![id, error],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn mark_pending(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute(
                "UPDATE change_log SET status = 'PENDING' WHERE id = ?1 AND status = 'FAILED'",
                [id],
            )
            .map_err(storage_err)?;
        if updated == 0 {
            return Err(Error::Storage(format!(
                "change record {} is not failed (or does not exist)",
                id
            )));
        }
        Ok(())
    }

    async fn retarget(&self, local_entity_id: &str, server_entity_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        retarget_in(&conn, local_entity_id, server_entity_id)
    }
}

impl SqliteStore {
    fn count_with_status(&self, status: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM change_log WHERE status = ?1",
                [status],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        Ok(count as usize)
    }
}

fn mark_synced_in(conn: &Connection, ids: &[String]) -> Result<()> {
    for id in ids {
        conn.execute(
            "UPDATE change_log SET status = 'SYNCED', last_error = NULL WHERE id = ?1",
            [id],
        )
        .map_err(storage_err)?;
    }
    Ok(())
}

fn retarget_in(conn: &Connection, local_id: &str, server_id: &str) -> Result<()> {
    debug!(local_id, server_id, "Retargeting entity id");
    conn.execute(
        "UPDATE change_log SET entity_id = ?2 WHERE entity_id = ?1",
        params![local_id, server_id],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn insert_conflict_in(conn: &Connection, conflict: &SyncConflict) -> Result<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO conflicts
        (id, entity_type, entity_id, local_version, remote_version,
         timestamp, server_timestamp, detected_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            conflict.id,
            conflict.entity_type,
            conflict.entity_id,
            conflict.local_version,
            conflict.remote_version,
            conflict.timestamp,
            conflict.server_timestamp,
            conflict.detected_at,
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
    Ok(SyncConflict {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        local_version: row.get(3)?,
        remote_version: row.get(4)?,
        timestamp: row.get(5)?,
        server_timestamp: row.get(6)?,
        detected_at: row.get(7)?,
    })
}

const SELECT_CONFLICT: &str = "SELECT id, entity_type, entity_id, local_version, \
     remote_version, timestamp, server_timestamp, detected_at FROM conflicts";

#[async_trait]
impl SyncMetadataStore for SqliteStore {
    async fn cursor(&self, device_id: &DeviceId) -> Result<Option<SyncCursor>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT last_sync_timestamp, needs_full_resync FROM sync_cursors WHERE device_id = ?1",
                [device_id.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(row.map(|(ts, flag)| SyncCursor {
            device_id: device_id.clone(),
            last_sync_timestamp: ts,
            needs_full_resync: flag != 0,
        }))
    }

    async fn advance_cursor(&self, device_id: &DeviceId, timestamp: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_cursors (device_id, last_sync_timestamp, needs_full_resync)
            VALUES (?1, ?2, 0)
            ON CONFLICT(device_id) DO UPDATE SET
                last_sync_timestamp = MAX(last_sync_timestamp, excluded.last_sync_timestamp)
            "#,
            params![device_id.as_str(), timestamp],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn mark_full_resync(&self, device_id: &DeviceId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_cursors (device_id, last_sync_timestamp, needs_full_resync)
            VALUES (?1, 0, 1)
            ON CONFLICT(device_id) DO UPDATE SET
                last_sync_timestamp = 0,
                needs_full_resync = 1
            "#,
            [device_id.as_str()],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn clear_full_resync(&self, device_id: &DeviceId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_cursors SET needs_full_resync = 0 WHERE device_id = ?1",
            [device_id.as_str()],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn put_tombstone(&self, tombstone: Tombstone) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tombstones (entity_kind, entity_id, deleted_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(entity_kind, entity_id) DO UPDATE SET
                deleted_at = MIN(deleted_at, excluded.deleted_at)
            "#,
            params![
                tombstone.entity_kind.as_str(),
                tombstone.entity_id,
                tombstone.deleted_at,
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn tombstone(&self, kind: EntityKind, entity_id: &str) -> Result<Option<Tombstone>> {
        let conn = self.conn.lock().unwrap();
        let deleted_at: Option<i64> = conn
            .query_row(
                "SELECT deleted_at FROM tombstones WHERE entity_kind = ?1 AND entity_id = ?2",
                params![kind.as_str(), entity_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(deleted_at.map(|deleted_at| Tombstone {
            entity_kind: kind,
            entity_id: entity_id.to_string(),
            deleted_at,
        }))
    }

    async fn count_tombstones(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tombstones", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ConflictStore for SqliteStore {
    async fn insert(&self, conflict: SyncConflict) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_conflict_in(&conn, &conflict)
    }

    async fn conflict(&self, id: &str) -> Result<Option<SyncConflict>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_CONFLICT),
            [id],
            row_to_conflict,
        )
        .optional()
        .map_err(storage_err)
    }

    async fn unresolved(&self) -> Result<Vec<SyncConflict>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY detected_at", SELECT_CONFLICT))
            .map_err(storage_err)?;
        let rows = stmt.query_map([], row_to_conflict).map_err(storage_err)?;
        let mut conflicts = Vec::new();
        for row in rows {
            conflicts.push(row.map_err(storage_err)?);
        }
        Ok(conflicts)
    }

    async fn count_unresolved(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM conflicts", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(count as usize)
    }

    async fn record_resolution(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(storage_err)?;
        let removed = tx
            .execute("DELETE FROM conflicts WHERE id = ?1", [conflict_id])
            .map_err(storage_err)?;
        if removed == 0 {
            return Err(Error::NotFound(format!("conflict {}", conflict_id)));
        }
        let selected = match resolution.selected {
            crate::SelectedVersion::Local => "LOCAL",
            crate::SelectedVersion::Remote => "REMOTE",
        };
        tx.execute(
            r#"
            INSERT OR REPLACE INTO conflict_resolutions
            (conflict_id, strategy, selected, resolved_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                conflict_id,
                resolution.strategy.as_str(),
                selected,
                resolution.resolved_at,
            ],
        )
        .map_err(storage_err)?;
        tx.commit().map_err(storage_err)
    }
}

#[async_trait]
impl SyncCommit for SqliteStore {
    async fn commit_server_ack(
        &self,
        synced_ids: &[String],
        remaps: &[(String, String)],
        conflicts: Vec<SyncConflict>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(storage_err)?;
        mark_synced_in(&tx, synced_ids)?;
        for (local_id, server_id) in remaps {
            retarget_in(&tx, local_id, server_id)?;
        }
        for conflict in &conflicts {
            insert_conflict_in(&tx, conflict)?;
        }
        tx.commit().map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_common::Operation;

    fn record(entity_id: &str) -> ChangeRecord {
        ChangeRecord::new(
            UserId::new("alice").unwrap(),
            DeviceId::new("phone").unwrap(),
            EntityKind::Vote,
            entity_id,
            Operation::Create,
            r#"{"score":1}"#,
        )
    }

    #[tokio::test]
    async fn test_append_get_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let r = record("v-1");
        let id = r.id.clone();
        store.append(r).await.unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.entity_kind, EntityKind::Vote);
        assert_eq!(stored.operation, Operation::Create);
        assert_eq!(stored.status, ChangeStatus::Pending);
        assert_eq!(stored.payload, r#"{"score":1}"#);

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_ordering_and_counts() {
        let store = SqliteStore::in_memory().unwrap();
        let mut r1 = record("v-1");
        r1.timestamp = 200;
        let mut r2 = record("v-2");
        r2.timestamp = 100;
        store.append(r1).await.unwrap();
        store.append(r2).await.unwrap();

        let alice = UserId::new("alice").unwrap();
        let pending = store.pending_for(&alice).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].entity_id, "v-2");
        assert_eq!(store.count_pending().await.unwrap(), 2);
        assert_eq!(store.count_failed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_synced_is_terminal() {
        let store = SqliteStore::in_memory().unwrap();
        let r = record("v-1");
        let id = r.id.clone();
        store.append(r).await.unwrap();

        store.mark_synced(&[id.clone()]).await.unwrap();
        assert!(store.mark_failed(&id, "late failure").await.is_err());
        assert!(store.mark_pending(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_cursor_persistence_and_monotonicity() {
        let store = SqliteStore::in_memory().unwrap();
        let device = DeviceId::new("phone").unwrap();

        store.advance_cursor(&device, 300).await.unwrap();
        store.advance_cursor(&device, 100).await.unwrap();
        let cursor = store.cursor(&device).await.unwrap().unwrap();
        assert_eq!(cursor.last_sync_timestamp, 300);

        store.mark_full_resync(&device).await.unwrap();
        let cursor = store.cursor(&device).await.unwrap().unwrap();
        assert_eq!(cursor.last_sync_timestamp, 0);
        assert!(cursor.needs_full_resync);
    }

    #[tokio::test]
    async fn test_tombstone_upsert_keeps_earliest() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_tombstone(Tombstone {
                entity_kind: EntityKind::Event,
                entity_id: "evt-1".into(),
                deleted_at: 500,
            })
            .await
            .unwrap();
        store
            .put_tombstone(Tombstone {
                entity_kind: EntityKind::Event,
                entity_id: "evt-1".into(),
                deleted_at: 400,
            })
            .await
            .unwrap();

        let t = store
            .tombstone(EntityKind::Event, "evt-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.deleted_at, 400);
        assert!(store
            .tombstone(EntityKind::Vote, "evt-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_server_ack_is_transactional() {
        let store = SqliteStore::in_memory().unwrap();
        let r = record("local-1");
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
                &[("local-1".to_string(), "srv-7".to_string())],
                vec![conflict.clone()],
            )
            .await
            .unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ChangeStatus::Synced);
        assert_eq!(stored.entity_id, "srv-7");

        // Replaying the same acknowledgement changes nothing.
        store
            .commit_server_ack(
                &[id.clone()],
                &[("local-1".to_string(), "srv-7".to_string())],
                vec![conflict],
            )
            .await
            .unwrap();
        assert_eq!(store.count_unresolved().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolution_removes_conflict() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert(SyncConflict {
                id: "c-9".into(),
                entity_type: "events".into(),
                entity_id: "evt-1".into(),
                local_version: "l".into(),
                remote_version: "r".into(),
                timestamp: 100,
                server_timestamp: 200,
                detected_at: 1,
            })
            .await
            .unwrap();

        store
            .record_resolution(
                "c-9",
                ConflictResolution::new(
                    crate::ConflictStrategy::LastWriteWins,
                    crate::SelectedVersion::Remote,
                ),
            )
            .await
            .unwrap();
        assert_eq!(store.count_unresolved().await.unwrap(), 0);
        assert!(store.conflict("c-9").await.unwrap().is_none());
        assert!(store.record_resolution("c-9", ConflictResolution::new(
            crate::ConflictStrategy::Manual,
            crate::SelectedVersion::Local,
        ))
        .await
        .is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.db");

        let r = record("v-1");
        let id = r.id.clone();
        {
            let store = SqliteStore::open(&path).unwrap();
            store.append(r).await.unwrap();
            store
                .advance_cursor(&DeviceId::new("phone").unwrap(), 42)
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
        let cursor = store
            .cursor(&DeviceId::new("phone").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_sync_timestamp, 42);
    }
}
