//! Error types for the local durable cache.

use thiserror::Error;

/// Errors that can occur while reading or writing the local cache.
///
/// Cache writes are fire-and-forget: the store logs these and carries on.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache file failed.
    #[error("Cache file I/O failed for '{namespace}': {source}")]
    FileIo {
        namespace: String,
        #[source]
        source: std::io::Error,
    },

    /// The cached value could not be encoded.
    #[error("Failed to serialize cached value for '{namespace}': {source}")]
    SerializationFailed {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },

    /// The cached blob is corrupt or from an unsupported version.
    #[error("Failed to deserialize cached value for '{namespace}': {source}")]
    DeserializationFailed {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, CacheError::FileIo { .. })
    }

    /// Check if the cached data itself is unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CacheError::DeserializationFailed { .. })
    }

    /// The cache namespace this error refers to.
    pub fn namespace(&self) -> &str {
        match self {
            CacheError::FileIo { namespace, .. }
            | CacheError::SerializationFailed { namespace, .. }
            | CacheError::DeserializationFailed { namespace, .. } => namespace,
        }
    }
}

impl From<CacheError> for crate::Error {
    fn from(err: CacheError) -> Self {
        crate::Error::Cache(err)
    }
}
