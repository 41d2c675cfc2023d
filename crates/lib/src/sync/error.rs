//! Error types for the synchronization module.
//!
//! None of these cross the engine boundary. The engine logs them and reflects
//! them in [`SyncMetadata::sync_error`](crate::model::SyncMetadata) through
//! [`SyncError::user_message`].

use thiserror::Error;

use super::state::{PhaseEvent, SyncPhase};
use crate::constants::CONNECTION_LOST_MESSAGE;

/// Errors that can occur during synchronization operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The initial point read of the user's record failed.
    #[error("Failed to read remote record '{key}': {reason}")]
    RemoteRead { key: String, reason: String },

    /// Creating the record for a first-time user failed.
    #[error("Failed to create remote record '{key}': {reason}")]
    RecordCreate { key: String, reason: String },

    /// A debounced outbound write failed.
    #[error("Failed to write remote record '{key}': {reason}")]
    RemoteWrite { key: String, reason: String },

    /// The change-notification stream failed or was closed.
    #[error("Change stream for '{key}' disconnected: {reason}")]
    ListenerDisconnected { key: String, reason: String },

    /// A phase change was requested that the state machine does not allow.
    #[error("Invalid sync phase transition: {event} while {from}")]
    InvalidPhaseTransition { from: SyncPhase, event: PhaseEvent },

    /// The engine's background writer is gone (session ended).
    #[error("No active session to synchronize")]
    NotAttached,

    /// The session is attached but its record has not been loaded yet.
    #[error("The signed-in user's record has not been loaded yet")]
    NotLoaded,
}

impl SyncError {
    /// Text stored in `sync_error` for the UI to surface.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::RemoteRead { reason, .. } => {
                format!("Failed to load your profile: {reason}")
            }
            SyncError::RecordCreate { reason, .. } => {
                format!("Failed to create your profile: {reason}")
            }
            SyncError::RemoteWrite { reason, .. } => format!("Failed to save changes: {reason}"),
            SyncError::ListenerDisconnected { .. } => CONNECTION_LOST_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Check if this error came from talking to the remote store.
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteRead { .. }
                | SyncError::RecordCreate { .. }
                | SyncError::RemoteWrite { .. }
                | SyncError::ListenerDisconnected { .. }
        )
    }

    /// Check if this is an outbound write failure.
    pub fn is_write_error(&self) -> bool {
        matches!(self, SyncError::RemoteWrite { .. })
    }

    /// Check if this is a change-stream failure.
    pub fn is_listener_error(&self) -> bool {
        matches!(self, SyncError::ListenerDisconnected { .. })
    }

    /// Check if this is a rejected phase transition.
    pub fn is_phase_error(&self) -> bool {
        matches!(self, SyncError::InvalidPhaseTransition { .. })
    }
}

impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
