//! Common types used throughout the Confab sync core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "UserId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a device.
///
/// Sync cursors and the single-flight discipline are keyed per device;
/// each device is assumed to be the single writer of its own change log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new DeviceId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "DeviceId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of entity kinds the sync core knows how to route.
///
/// The wire format carries these as table-name strings; anything that
/// does not parse is treated as an unknown kind and skipped by the
/// engine rather than failing the batch. Adding a new synced entity
/// means adding a variant here, which the compiler then enforces at
/// every dispatch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Event,
    Participant,
    Vote,
    TimeSlot,
    Location,
    Scenario,
}

impl EntityKind {
    /// All known kinds, in cascade-dependency order (dependents first).
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Vote,
        EntityKind::TimeSlot,
        EntityKind::Participant,
        EntityKind::Location,
        EntityKind::Scenario,
        EntityKind::Event,
    ];

    /// Wire/table name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Event => "events",
            EntityKind::Participant => "participants",
            EntityKind::Vote => "votes",
            EntityKind::TimeSlot => "timeSlots",
            EntityKind::Location => "locations",
            EntityKind::Scenario => "scenarios",
        }
    }

    /// Parse a wire/table name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "events" => Some(EntityKind::Event),
            "participants" => Some(EntityKind::Participant),
            "votes" => Some(EntityKind::Vote),
            "timeSlots" => Some(EntityKind::TimeSlot),
            "locations" => Some(EntityKind::Location),
            "scenarios" => Some(EntityKind::Scenario),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of mutation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

/// Current wall-clock time in milliseconds since the epoch.
///
/// Used as the logical clock for change records and cursors. Monotonic
/// per device under the single-writer assumption; cross-device skew is
/// a known limitation of last-write-wins comparison.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
