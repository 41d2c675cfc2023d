//! Synchronization between the store and the signed-in user's remote record.
//!
//! The [`SyncEngine`] owns the per-session machinery:
//!
//! - the initial load, which reads (or creates) the user's record and seeds
//!   the store,
//! - a change listener that merges newer remote snapshots into the store,
//! - a write-behind synchronizer that pushes debounced local changes.
//!
//! [`SessionMonitor`] feeds it session changes from a
//! [`SessionProvider`](crate::session::SessionProvider). Remote failures never
//! escape the engine; they are logged and surfaced through
//! [`SyncMetadata::sync_error`](crate::model::SyncMetadata).

mod config;
mod engine;
mod error;
mod listener;
mod loader;
mod monitor;
mod state;
mod writer;

pub use config::{RetryPolicy, SyncConfig};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use monitor::SessionMonitor;
pub use state::{PhaseEvent, SyncPhase};
