//! Broadcast fan-out of sync lifecycle events.

use tokio::sync::broadcast;

use confab_common::DeviceId;
use confab_store::SyncConflict;

/// Lifecycle events emitted by the sync engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A sync call started.
    Started { timestamp: i64 },
    /// Server changes are being applied.
    Progress { done: usize, total: usize },
    /// A sync call finished successfully.
    Completed { timestamp: i64, synced_count: usize },
    /// A sync call failed; local state is unchanged.
    Failed { reason: String, timestamp: i64 },
    /// The server reported a conflict; it is now stored unresolved.
    ConflictDetected { conflict: SyncConflict },
    /// The server demanded a full resync; the cursor was reset.
    FullResyncRequired { device_id: DeviceId },
}

/// Fan-out channel for sync events.
///
/// Every subscriber owns its own broadcast receiver, so a slow or absent
/// listener can lag or drop events but can never block the engine.
/// Delivery is best-effort.
pub struct SyncEvents {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncEvents {
    /// Create a channel retaining up to `capacity` undelivered events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: SyncEvent) {
        // No subscribers is fine; delivery is best-effort.
        let _ = self.tx.send(event);
    }
}
