//! Error types for remote document store adapters.

use thiserror::Error;

/// Errors reported by a [`RemoteStore`](super::RemoteStore).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The store could not be reached or refused the request temporarily.
    #[error("Remote store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The stored document does not have the expected shape.
    #[error("Record '{key}' is malformed: {source}")]
    InvalidDocument {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The outgoing patch could not be encoded.
    #[error("Failed to encode patch for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The change stream was closed by the server.
    #[error("Subscription to '{key}' closed")]
    SubscriptionClosed { key: String },
}

impl RemoteError {
    /// Check if retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Unavailable { .. } | RemoteError::SubscriptionClosed { .. }
        )
    }

    /// Check if this error indicates bad data rather than a bad connection.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            RemoteError::InvalidDocument { .. } | RemoteError::Encode { .. }
        )
    }
}

impl From<RemoteError> for crate::Error {
    fn from(err: RemoteError) -> Self {
        crate::Error::Remote(err)
    }
}
