//! User profile types.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{GUEST_DISPLAY_NAME, GUEST_UID},
    session::Session,
};

/// Role of a user within the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Display and notification preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// UI theme name (`system`, `light`, `dark`)
    pub theme: String,
    /// Preferred interface language
    pub language: String,
    /// Whether the user opted into draw and policy update emails
    pub email_updates: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "system".to_string(),
            language: "en".to_string(),
            email_updates: false,
        }
    }
}

/// Identity, role and free-text fields of the current user.
///
/// One profile exists per session. It is replaced wholesale when the session
/// changes and reset to [`UserProfile::guest`] on sign-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub role: Role,
    pub onboarded: bool,
    pub bio: String,
    pub target_province: Option<String>,
    pub notes: String,
    pub preferences: Preferences,
}

impl UserProfile {
    /// The fixed profile used while nobody is signed in.
    pub fn guest() -> Self {
        Self {
            uid: GUEST_UID.to_string(),
            display_name: GUEST_DISPLAY_NAME.to_string(),
            email: None,
            photo_url: None,
            role: Role::User,
            onboarded: false,
            bio: String::new(),
            target_province: None,
            notes: String::new(),
            preferences: Preferences::default(),
        }
    }

    /// Synthesize the default profile for a user that has no remote record yet.
    ///
    /// Falls back to the local part of the email, then to "User", when the
    /// session carries no display name.
    pub fn from_session(session: &Session) -> Self {
        let display_name = session
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                session
                    .email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .filter(|local| !local.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "User".to_string());

        Self {
            uid: session.uid.clone(),
            display_name,
            email: session.email.clone(),
            photo_url: session.photo_url.clone(),
            ..Self::guest()
        }
    }

    /// Whether this is the guest placeholder rather than a real user.
    pub fn is_guest(&self) -> bool {
        self.uid == GUEST_UID
    }
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::guest()
    }
}
