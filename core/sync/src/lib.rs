//! Confab Sync Engine
//!
//! Offline-first synchronization for the Confab event planner, including:
//! - Change-log draining against a single `/sync` RPC
//! - Conflict detection, storage, and resolution strategies
//! - Tombstone discipline so deletes are never resurrected
//! - Broadcast event stream for UI and telemetry
//! - Retry strategy with exponential backoff for callers
//! - Scheduling on demand, periodically, or on reconnect

pub mod engine;
pub mod events;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod transport;

// Re-export main types
pub use engine::{SyncConfig, SyncEngine, SyncOutcome, SyncStateSnapshot};
pub use events::{SyncEvent, SyncEvents};
pub use registry::{EntityRepository, RepositoryRegistry};
pub use resolver::{resolve, Resolution};
pub use retry::{retry, retry_with_config, RetryConfig, RetryExecutor};
pub use scheduler::{SchedulerConfig, SyncMode, SyncScheduler, SyncSchedulerHandle, SyncTrigger};
pub use transport::{
    AckedChange, HttpTransport, ServerChange, SyncRequest, SyncResponse, SyncTransport, WireChange,
};

// Strategy types live with the conflict store; surface them here too.
pub use confab_store::{ConflictStrategy, SelectedVersion, SyncConflict};
