//! Authentication session seam.
//!
//! The auth provider is an external service. The engine only needs its
//! session-change stream: `None` means signed out, `Some(session)` means a
//! session started or was replaced.

mod local;

pub use local::LocalSessionProvider;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identity attributes exposed by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Stable user id, also the key of the user's remote record
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Avatar reference
    pub photo_url: Option<String>,
}

impl Session {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// Stream of session changes. Dropping the receiver unsubscribes.
pub type SessionStream = mpsc::UnboundedReceiver<Option<Session>>;

/// Source of session-change notifications.
pub trait SessionProvider: Send + Sync {
    /// Subscribe to session changes.
    ///
    /// Implementations emit the current session (or `None`) immediately, then
    /// every later change, in order.
    fn session_changes(&self) -> SessionStream;

    /// The session as of now.
    fn current_session(&self) -> Option<Session>;
}
