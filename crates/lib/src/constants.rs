//! Constants used throughout the crs-sync library.
//!
//! Central definitions for reserved identifiers, storage keys and limits.

/// Maximum number of entries kept in an assessment history.
pub const ASSESSMENT_HISTORY_LIMIT: usize = 50;

/// Default quiet period before a local change is pushed to the remote record.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// Namespace of the local durable cache holding the CRS profile.
pub const CRS_CACHE_NAMESPACE: &str = "crs-storage";

/// User id carried by the guest profile when nobody is signed in.
pub const GUEST_UID: &str = "guest";

/// Display name carried by the guest profile.
pub const GUEST_DISPLAY_NAME: &str = "Guest";

/// Remote record field holding the user profile.
pub const FIELD_USER_PROFILE: &str = "userProfile";

/// Remote record field holding the CRS profile.
pub const FIELD_CRS_DATA: &str = "crsData";

/// Remote record field holding the assessment history.
pub const FIELD_ASSESSMENT_HISTORY: &str = "assessmentHistory";

/// Remote record field holding the server timestamp of the last write.
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// `sync_error` text shown while the change stream is down.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection to sync server lost";
