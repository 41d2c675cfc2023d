//! Synchronization metadata surfaced to the UI.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// Authentication and sync status.
///
/// `last_synced_at` only moves forward, and only from confirmed remote writes
/// or accepted remote snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub is_authenticated: bool,
    pub last_synced_at: Option<Timestamp>,
    pub sync_error: Option<String>,
}

impl SyncMetadata {
    /// Move `last_synced_at` to `stamp` if it is later than the current value.
    ///
    /// Returns whether the value changed.
    pub fn advance_synced_at(&mut self, stamp: Timestamp) -> bool {
        match self.last_synced_at {
            Some(current) if current >= stamp => false,
            _ => {
                self.last_synced_at = Some(stamp);
                true
            }
        }
    }

    /// Whether a snapshot stamped `stamp` is newer than anything already seen.
    pub fn is_newer(&self, stamp: &Timestamp) -> bool {
        self.last_synced_at.is_none_or(|current| *stamp > current)
    }
}
