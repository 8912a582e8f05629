//! Core sync engine that orchestrates all sync operations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use confab_common::{now_millis, DeviceId, EntityKind, Error, Operation, Result, UserId};
use confab_store::{
    ChangeLog, ChangeRecord, ConflictResolution, ConflictStore, ConflictStrategy, SelectedVersion,
    SyncCommit, SyncConflict, SyncMetadataStore, Tombstone,
};

use crate::events::{SyncEvent, SyncEvents};
use crate::registry::RepositoryRegistry;
use crate::resolver::{resolve, Resolution};
use crate::transport::{ServerChange, SyncRequest, SyncTransport, WireChange};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound for the sync RPC.
    pub request_timeout: Duration,
    /// Strategy applied automatically to incoming conflicts. `None` (or
    /// `Manual`) leaves conflicts stored for explicit resolution.
    pub default_strategy: Option<ConflictStrategy>,
    /// Events retained per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            default_strategy: None,
            event_capacity: 64,
        }
    }
}

/// Result of one sync call.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Local changes the server acknowledged.
    pub synced_count: usize,
    /// Conflicts the server reported (stored, possibly auto-resolved).
    pub conflicts_found: usize,
    /// Server changes applied to entity repositories.
    pub applied_count: usize,
    /// Server changes skipped (unknown kind, tombstoned, bad payload).
    pub skipped_count: usize,
    /// Cursor position after the call.
    pub new_cursor: i64,
    /// The server demanded a full resync.
    pub requires_full_sync: bool,
    pub duration: Duration,
}

/// Snapshot of sync health for one device, safe to poll while a sync
/// is in progress.
#[derive(Debug, Clone)]
pub struct SyncStateSnapshot {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync_timestamp: i64,
    pub needs_full_resync: bool,
    pub pending_changes: usize,
    pub failed_changes: usize,
    pub unresolved_conflicts: usize,
}

/// Main engine coordinating change-log synchronization.
///
/// Generic over the store bundle and the transport; both are injected
/// at construction. At most one `sync` call runs per `(user, device)`
/// pair at a time; a second call is rejected with
/// [`Error::SyncInProgress`].
pub struct SyncEngine<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    repositories: RepositoryRegistry,
    events: SyncEvents,
    /// Reachability signal owned by an external probe.
    online: watch::Receiver<bool>,
    in_flight: Mutex<HashSet<(String, String)>>,
    config: SyncConfig,
}

/// Whether an inbound server change reached a repository.
enum ApplyOutcome {
    Applied,
    Skipped,
}

impl<S, T> SyncEngine<S, T>
where
    S: ChangeLog + SyncMetadataStore + ConflictStore + SyncCommit,
    T: SyncTransport,
{
    /// Create a new sync engine.
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        repositories: RepositoryRegistry,
        online: watch::Receiver<bool>,
        config: SyncConfig,
    ) -> Self {
        let events = SyncEvents::new(config.event_capacity);
        Self {
            store,
            transport,
            repositories,
            events,
            online,
            in_flight: Mutex::new(HashSet::new()),
            config,
        }
    }

    /// Subscribe to the engine's event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Whether the user has pending changes, without a round-trip.
    pub async fn has_pending(&self, user_id: &UserId) -> Result<bool> {
        Ok(!self.store.pending_for(user_id).await?.is_empty())
    }

    /// Perform one full sync exchange for a device.
    ///
    /// Idempotent and safe to call on every reconnect: a transport or
    /// server failure leaves all local state exactly as it was, and
    /// acknowledgements replay harmlessly.
    pub async fn sync(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        credential: &str,
    ) -> Result<SyncOutcome> {
        let started = Instant::now();
        let _guard = self.acquire_flight(user_id, device_id)?;

        self.events.emit(SyncEvent::Started {
            timestamp: now_millis(),
        });
        info!(user = %user_id, device = %device_id, "Starting sync");

        let result = self.sync_exchange(user_id, device_id, credential).await;
        match result {
            Ok(mut outcome) => {
                outcome.duration = started.elapsed();
                info!(
                    synced = outcome.synced_count,
                    conflicts = outcome.conflicts_found,
                    applied = outcome.applied_count,
                    skipped = outcome.skipped_count,
                    duration = ?outcome.duration,
                    "Sync completed"
                );
                self.events.emit(SyncEvent::Completed {
                    timestamp: now_millis(),
                    synced_count: outcome.synced_count,
                });
                Ok(outcome)
            }
            Err(err) => {
                warn!(user = %user_id, device = %device_id, %err, "Sync failed");
                self.events.emit(SyncEvent::Failed {
                    reason: err.to_string(),
                    timestamp: now_millis(),
                });
                Err(err)
            }
        }
    }

    async fn sync_exchange(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        credential: &str,
    ) -> Result<SyncOutcome> {
        let pending = self.store.pending_for(user_id).await?;
        let cursor = self
            .store
            .cursor(device_id)
            .await?
            .map(|c| c.last_sync_timestamp)
            .unwrap_or(0);

        let request = SyncRequest {
            user_id: user_id.clone(),
            device_id: device_id.clone(),
            cursor,
            changes: pending.iter().map(WireChange::from).collect(),
        };
        debug!(pending = pending.len(), cursor, "Sync exchange");

        // The only suspension point; nothing local has been mutated yet,
        // so any failure here leaves the log untouched for the next try.
        let response = self
            .transport
            .exchange(credential, &request, self.config.request_timeout)
            .await?;

        if !response.success {
            return Err(Error::ServerRejected {
                status: 200,
                message: response
                    .message
                    .unwrap_or_else(|| "sync rejected without message".to_string()),
            });
        }

        // (a) Acknowledgements, id retargets, and conflict storage are
        // committed as one local unit of work.
        let synced_ids: Vec<String> = response
            .synced_changes
            .iter()
            .map(|ack| ack.change_id.clone())
            .collect();
        let mut remaps: Vec<(String, String, EntityKind)> = Vec::new();
        for ack in &response.synced_changes {
            let Some(server_id) = &ack.server_entity_id else {
                continue;
            };
            match pending.iter().find(|r| r.id == ack.change_id) {
                Some(record) if &record.entity_id != server_id => {
                    remaps.push((record.entity_id.clone(), server_id.clone(), record.entity_kind));
                }
                Some(_) => {}
                None => {
                    warn!(change_id = %ack.change_id, "Server acknowledged a change we did not send");
                }
            }
        }
        let remap_pairs: Vec<(String, String)> = remaps
            .iter()
            .map(|(local, server, _)| (local.clone(), server.clone()))
            .collect();
        self.store
            .commit_server_ack(&synced_ids, &remap_pairs, response.conflicts.clone())
            .await?;

        for (local_id, server_id, kind) in &remaps {
            debug!(%local_id, %server_id, %kind, "Propagating server-assigned id");
            match self.repositories.get(*kind) {
                Some(repo) => repo.remap_entity_id(local_id, server_id).await?,
                None => warn!(%kind, "No repository registered to receive id remap"),
            }
        }

        // (b) Surface conflicts; auto-resolve only if configured.
        let conflicts_found = response.conflicts.len();
        for conflict in &response.conflicts {
            self.events.emit(SyncEvent::ConflictDetected {
                conflict: conflict.clone(),
            });
        }
        if let Some(strategy) = self.config.default_strategy {
            if strategy != ConflictStrategy::Manual {
                for conflict in &response.conflicts {
                    if let Err(err) = self
                        .apply_resolution(user_id, device_id, conflict, strategy)
                        .await
                    {
                        warn!(conflict_id = %conflict.id, %err, "Auto-resolution failed");
                    }
                }
            }
        }

        // (c) Apply server changes, oldest first as sent.
        let total = response.server_changes.len();
        let mut applied_count = 0;
        let mut skipped_count = 0;
        for (done, change) in response.server_changes.iter().enumerate() {
            match self.apply_server_change(change).await? {
                ApplyOutcome::Applied => applied_count += 1,
                ApplyOutcome::Skipped => skipped_count += 1,
            }
            self.events.emit(SyncEvent::Progress {
                done: done + 1,
                total,
            });
        }

        // (d)/(e) Only now is it safe to move the cursor; a crash above
        // re-fetches the same batch (at-least-once).
        if response.requires_full_sync {
            warn!(device = %device_id, "Server requires full resync, resetting cursor");
            self.store.mark_full_resync(device_id).await?;
            self.events.emit(SyncEvent::FullResyncRequired {
                device_id: device_id.clone(),
            });
        } else {
            self.store
                .advance_cursor(device_id, response.new_timestamp)
                .await?;
            // A completed exchange from the current cursor is the
            // revalidation a previous full-resync demand asked for.
            self.store.clear_full_resync(device_id).await?;
        }

        Ok(SyncOutcome {
            synced_count: synced_ids.len(),
            conflicts_found,
            applied_count,
            skipped_count,
            new_cursor: if response.requires_full_sync {
                0
            } else {
                cursor.max(response.new_timestamp)
            },
            requires_full_sync: response.requires_full_sync,
            duration: Duration::ZERO,
        })
    }

    /// Apply one inbound change, honoring tombstones and skipping what
    /// cannot be routed.
    async fn apply_server_change(&self, change: &ServerChange) -> Result<ApplyOutcome> {
        let Some(kind) = EntityKind::parse(&change.entity_type) else {
            warn!(
                entity_type = %change.entity_type,
                entity_id = %change.entity_id,
                "Skipping server change for unknown entity type"
            );
            return Ok(ApplyOutcome::Skipped);
        };

        match change.operation {
            Operation::Create | Operation::Update => {
                if let Some(tombstone) = self.store.tombstone(kind, &change.entity_id).await? {
                    if tombstone.deleted_at >= change.timestamp {
                        debug!(
                            %kind,
                            entity_id = %change.entity_id,
                            "Skipping stale change for deleted entity"
                        );
                        return Ok(ApplyOutcome::Skipped);
                    }
                }
            }
            Operation::Delete => {
                // The tombstone must exist before anything else can race
                // a stale update past the deletion.
                self.store
                    .put_tombstone(Tombstone {
                        entity_kind: kind,
                        entity_id: change.entity_id.clone(),
                        deleted_at: change.timestamp,
                    })
                    .await?;
            }
        }

        let Some(repo) = self.repositories.get(kind) else {
            warn!(%kind, "No repository registered; skipping server change");
            return Ok(ApplyOutcome::Skipped);
        };
        match repo
            .apply_server_change(change.operation, &change.entity_id, &change.payload)
            .await
        {
            Ok(()) => Ok(ApplyOutcome::Applied),
            Err(Error::Serialization(msg)) => {
                // A payload that does not parse will not parse on the
                // re-fetch either; skip it instead of wedging the queue.
                warn!(
                    %kind,
                    entity_id = %change.entity_id,
                    %msg,
                    "Skipping server change with malformed payload"
                );
                Ok(ApplyOutcome::Skipped)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve a stored conflict with an explicit strategy.
    ///
    /// `Manual` leaves the conflict stored and reports
    /// [`Resolution::RequiresManual`]. Any selection is persisted, the
    /// conflict removed, the winning version applied locally when the
    /// remote side won, and a corrective change enqueued so the decision
    /// propagates on the next sync.
    pub async fn resolve_conflict(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        conflict_id: &str,
        strategy: ConflictStrategy,
    ) -> Result<Resolution> {
        let conflict = self
            .store
            .conflict(conflict_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conflict {}", conflict_id)))?;
        self.apply_resolution(user_id, device_id, &conflict, strategy)
            .await
    }

    async fn apply_resolution(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        conflict: &SyncConflict,
        strategy: ConflictStrategy,
    ) -> Result<Resolution> {
        let resolution = resolve(conflict, strategy);
        let selected = match resolution {
            Resolution::RequiresManual => {
                debug!(conflict_id = %conflict.id, "Conflict awaits manual resolution");
                return Ok(resolution);
            }
            Resolution::Selected(selected) => selected,
        };

        let payload = match selected {
            SelectedVersion::Local => &conflict.local_version,
            SelectedVersion::Remote => &conflict.remote_version,
        };
        let kind = conflict.entity_kind();

        if selected == SelectedVersion::Remote {
            match kind.and_then(|k| self.repositories.get(k)) {
                Some(repo) => {
                    repo.apply_server_change(Operation::Update, &conflict.entity_id, payload)
                        .await?
                }
                None => warn!(
                    entity_type = %conflict.entity_type,
                    "No repository to apply winning remote version"
                ),
            }
        }

        match kind {
            Some(kind) => {
                self.store
                    .append(ChangeRecord::new(
                        user_id.clone(),
                        device_id.clone(),
                        kind,
                        conflict.entity_id.clone(),
                        Operation::Update,
                        payload.clone(),
                    ))
                    .await?;
            }
            None => warn!(
                entity_type = %conflict.entity_type,
                "Unknown entity type; resolution applied but not propagated"
            ),
        }

        self.store
            .record_resolution(&conflict.id, ConflictResolution::new(strategy, selected))
            .await?;
        info!(conflict_id = %conflict.id, ?selected, "Conflict resolved");
        Ok(resolution)
    }

    /// Snapshot of sync health for a device.
    pub async fn sync_state(&self, device_id: &DeviceId) -> Result<SyncStateSnapshot> {
        let cursor = self.store.cursor(device_id).await?;
        let is_syncing = self
            .in_flight
            .lock()
            .unwrap()
            .iter()
            .any(|(_, device)| device.as_str() == device_id.as_str());
        Ok(SyncStateSnapshot {
            is_online: *self.online.borrow(),
            is_syncing,
            last_sync_timestamp: cursor
                .as_ref()
                .map(|c| c.last_sync_timestamp)
                .unwrap_or(0),
            needs_full_resync: cursor.map(|c| c.needs_full_resync).unwrap_or(false),
            pending_changes: self.store.count_pending().await?,
            failed_changes: self.store.count_failed().await?,
            unresolved_conflicts: self.store.count_unresolved().await?,
        })
    }

    fn acquire_flight<'a>(
        &'a self,
        user_id: &UserId,
        device_id: &DeviceId,
    ) -> Result<FlightGuard<'a>> {
        let key = (
            user_id.as_str().to_string(),
            device_id.as_str().to_string(),
        );
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(key.clone()) {
            return Err(Error::SyncInProgress(format!(
                "sync already running for {}/{}",
                user_id, device_id
            )));
        }
        Ok(FlightGuard {
            key,
            in_flight: &self.in_flight,
        })
    }
}

/// Removes the device from the in-flight set when the sync call ends,
/// on success, error, or cancellation alike.
struct FlightGuard<'a> {
    key: (String, String),
    in_flight: &'a Mutex<HashSet<(String, String)>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.key);
    }
}
