//! Pure conflict resolution.

use confab_store::{ConflictStrategy, SelectedVersion, SyncConflict};

/// Outcome of resolving a conflict against a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// One side was selected.
    Selected(SelectedVersion),
    /// A human must decide; the conflict stays stored.
    RequiresManual,
}

/// Map a conflict and a strategy to a winning version.
///
/// `LastWriteWins` compares the local change time against the server's;
/// the larger timestamp wins and ties go to the server. The comparison
/// uses client-supplied wall clocks, so cross-device skew can misorder
/// writes; that semantics is kept deliberately rather than papered over.
pub fn resolve(conflict: &SyncConflict, strategy: ConflictStrategy) -> Resolution {
    match strategy {
        ConflictStrategy::LastWriteWins => {
            if conflict.timestamp > conflict.server_timestamp {
                Resolution::Selected(SelectedVersion::Local)
            } else {
                Resolution::Selected(SelectedVersion::Remote)
            }
        }
        ConflictStrategy::ClientWins => Resolution::Selected(SelectedVersion::Local),
        ConflictStrategy::ServerWins => Resolution::Selected(SelectedVersion::Remote),
        ConflictStrategy::Manual => Resolution::RequiresManual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(local_ts: i64, server_ts: i64) -> SyncConflict {
        SyncConflict {
            id: "c-1".into(),
            entity_type: "events".into(),
            entity_id: "evt-1".into(),
            local_version: "local".into(),
            remote_version: "remote".into(),
            timestamp: local_ts,
            server_timestamp: server_ts,
            detected_at: 0,
        }
    }

    #[test]
    fn test_last_write_wins_remote_newer() {
        assert_eq!(
            resolve(&conflict(100, 200), ConflictStrategy::LastWriteWins),
            Resolution::Selected(SelectedVersion::Remote)
        );
    }

    #[test]
    fn test_last_write_wins_local_newer() {
        assert_eq!(
            resolve(&conflict(300, 200), ConflictStrategy::LastWriteWins),
            Resolution::Selected(SelectedVersion::Local)
        );
    }

    #[test]
    fn test_last_write_wins_tie_goes_to_server() {
        assert_eq!(
            resolve(&conflict(200, 200), ConflictStrategy::LastWriteWins),
            Resolution::Selected(SelectedVersion::Remote)
        );
    }

    #[test]
    fn test_unconditional_strategies() {
        let c = conflict(100, 200);
        assert_eq!(
            resolve(&c, ConflictStrategy::ClientWins),
            Resolution::Selected(SelectedVersion::Local)
        );
        assert_eq!(
            resolve(&c, ConflictStrategy::ServerWins),
            Resolution::Selected(SelectedVersion::Remote)
        );
    }

    #[test]
    fn test_manual_requires_decision() {
        assert_eq!(
            resolve(&conflict(100, 200), ConflictStrategy::Manual),
            Resolution::RequiresManual
        );
    }
}
