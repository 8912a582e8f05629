//! Common utilities and types shared across Confab modules.
//!
//! This module provides foundational types used throughout the sync core,
//! ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{now_millis, DeviceId, EntityKind, Operation, UserId};
