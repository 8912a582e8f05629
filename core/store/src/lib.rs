//! Persisted sync state for Confab.
//!
//! This crate owns the three logical tables the sync engine operates on:
//! the per-user change log of pending mutations, the per-device sync
//! metadata (cursor plus tombstones), and the unresolved-conflict table.
//! Contracts are trait-based so the engine receives an explicitly
//! constructed store handle; `MemoryStore` backs tests and development,
//! `SqliteStore` backs real devices.

pub mod cascade;
pub mod change_log;
pub mod conflict;
pub mod memory;
pub mod metadata;
pub mod sqlite;

pub use cascade::CascadeDelete;
pub use change_log::{ChangeLog, ChangeRecord, ChangeStatus};
pub use conflict::{
    ConflictResolution, ConflictStore, ConflictStrategy, SelectedVersion, SyncConflict,
};
pub use memory::MemoryStore;
pub use metadata::{SyncCommit, SyncCursor, SyncMetadataStore, Tombstone};
pub use sqlite::SqliteStore;
