//! Remote document store seam.
//!
//! Each user has one record, keyed by session id:
//!
//! ```json
//! {
//!   "userProfile": { ... },
//!   "crsData": { ... },
//!   "assessmentHistory": [ ... ],
//!   "updatedAt": "2024-01-01T00:00:00.000Z"
//! }
//! ```
//!
//! The engine uses three primitives: point read, merge-write (an upsert that
//! keeps unrelated top-level fields and stamps `updatedAt` server-side), and a
//! change subscription that emits the full record on every change, including
//! changes made by this engine.

mod errors;
mod in_memory;

pub use errors::RemoteError;
pub use in_memory::{InMemoryRemote, RemoteOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    Result,
    clock::Timestamp,
    model::{AssessmentHistory, CrsProfile, UserProfile},
    store::AppState,
};

/// A user's remote record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub user_profile: UserProfile,
    pub crs_data: CrsProfile,
    #[serde(default)]
    pub assessment_history: AssessmentHistory,
    pub updated_at: Timestamp,
}

/// Fields the engine writes. The server adds `updatedAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub user_profile: UserProfile,
    pub crs_data: CrsProfile,
    pub assessment_history: AssessmentHistory,
}

impl RecordPatch {
    /// The full synced subset of the current state.
    pub fn from_state(state: &AppState) -> Self {
        Self {
            user_profile: (*state.user_profile).clone(),
            crs_data: (*state.crs_data).clone(),
            assessment_history: (*state.assessment_history).clone(),
        }
    }

    /// The record this patch produces once stamped with `updated_at`.
    pub fn into_record(self, updated_at: Timestamp) -> RemoteRecord {
        RemoteRecord {
            user_profile: self.user_profile,
            crs_data: self.crs_data,
            assessment_history: self.assessment_history,
            updated_at,
        }
    }
}

/// Change notifications for one record.
///
/// Items are full snapshots. An `Err` item or the end of the stream means the
/// connection was lost.
pub type RecordStream = mpsc::UnboundedReceiver<std::result::Result<RemoteRecord, RemoteError>>;

/// A remote document store holding one record per user.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Point read. `Ok(None)` when the record does not exist.
    async fn get(&self, key: &str) -> Result<Option<RemoteRecord>>;

    /// Merge `patch` into the record (creating it if needed) and return the
    /// server timestamp stored in `updatedAt`.
    async fn merge_write(&self, key: &str, patch: &RecordPatch) -> Result<Timestamp>;

    /// Subscribe to changes of the record.
    ///
    /// If the record exists, its current value is the first item.
    async fn subscribe(&self, key: &str) -> Result<RecordStream>;
}
