//!
//! crs-sync: keeps a user's CRS calculator state in step with their remote record.
//!
//! The library holds the calculator inputs, user profile and assessment history
//! of one signed-in user in an in-process reactive store, and synchronizes them
//! with a per-user record in a remote document store across sessions, tabs and
//! devices.
//!
//! ## Core Concepts
//!
//! * **Store (`store::Store`)**: The single owner of application state. Offers
//!   snapshot reads, shallow partial updates and synchronous change listeners,
//!   and caches the CRS profile locally on every change.
//! * **Remote store (`remote::RemoteStore`)**: The document store seam: point
//!   read, merge-write with a server timestamp, and a change subscription.
//! * **Session provider (`session::SessionProvider`)**: The auth seam, a stream
//!   of "signed in as X" / "signed out" notifications.
//! * **Sync engine (`sync::SyncEngine`)**: Per session, loads (or creates) the
//!   user's record, merges newer remote snapshots into the store and pushes
//!   debounced local changes back. `sync::SessionMonitor` drives it from a
//!   session provider.
//! * **Sync phase (`sync::SyncPhase`)**: The state machine that keeps inbound
//!   merges from being written straight back out.

pub mod clock;
pub mod constants;
pub mod model;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;

pub use clock::{Clock, SystemClock, Timestamp};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use store::{AppState, StatePatch, Store, Subscription};
pub use sync::{SessionMonitor, SyncConfig, SyncEngine};

/// Result type used throughout the crs-sync library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the crs-sync library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured synchronization errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),

    /// Structured remote store errors from the remote module
    #[error(transparent)]
    Remote(remote::RemoteError),

    /// Structured local cache errors from the store module
    #[error(transparent)]
    Cache(store::CacheError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Sync(_) => "sync",
            Error::Remote(_) => "remote",
            Error::Cache(_) => "cache",
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Cache(cache_err) => cache_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if retrying the failed operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote(remote_err) => remote_err.is_transient(),
            Error::Sync(sync_err) => sync_err.is_remote_error(),
            _ => false,
        }
    }

    /// Check if this error indicates malformed or corrupt data.
    pub fn is_data_error(&self) -> bool {
        match self {
            Error::Remote(remote_err) => remote_err.is_data_error(),
            Error::Cache(cache_err) => cache_err.is_corrupt(),
            _ => false,
        }
    }

    /// Check if this error is sync-related.
    pub fn is_sync_error(&self) -> bool {
        matches!(self, Error::Sync(_))
    }

    /// Check if this error came from the remote store.
    pub fn is_remote_error(&self) -> bool {
        matches!(self, Error::Remote(_))
    }

    /// Check if this error came from the local cache.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Error::Cache(_))
    }
}
