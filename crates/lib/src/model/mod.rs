//! Data model owned by the reactive store.
//!
//! * [`UserProfile`]: identity and preferences of the signed-in user, or the guest.
//! * [`CrsProfile`]: the scoring inputs plus the cached last score.
//! * [`AssessmentHistory`]: bounded, newest-first list of [`AssessmentRecord`]s.
//! * [`SyncMetadata`]: authentication flag, last confirmed sync and the current error.
//!
//! All types serialize with camelCase field names, matching the remote record.

mod crs;
mod history;
mod metadata;
mod profile;

pub use crs::{CrsProfile, EducationLevel, LanguageScores, MaritalStatus, Scorer};
pub use history::{AssessmentHistory, AssessmentRecord};
pub use metadata::SyncMetadata;
pub use profile::{Preferences, Role, UserProfile};
