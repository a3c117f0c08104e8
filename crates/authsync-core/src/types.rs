use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NO_SESSION_LABEL: &str = "No session";

/// User record as issued by the identity provider. Stored and exposed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
            user_metadata: Map::new(),
        }
    }

    /// String metadata value, `None` when missing, non-string or blank.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// Opaque credential bundle issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    #[must_use]
    pub fn new(access_token: impl Into<String>, user: User) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expires_in: None,
            expires_at: None,
            user,
        }
    }
}

/// Log label for an optional session: the user's email, or a placeholder.
#[must_use]
pub fn session_label(session: Option<&Session>) -> &str {
    session
        .and_then(|session| session.user.email.as_deref())
        .unwrap_or(NO_SESSION_LABEL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    MfaChallengeVerified,
}

impl AuthChangeEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
            Self::MfaChallengeVerified => "MFA_CHALLENGE_VERIFIED",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INITIAL_SESSION" => Some(Self::InitialSession),
            "SIGNED_IN" => Some(Self::SignedIn),
            "SIGNED_OUT" => Some(Self::SignedOut),
            "TOKEN_REFRESHED" => Some(Self::TokenRefreshed),
            "USER_UPDATED" => Some(Self::UserUpdated),
            "PASSWORD_RECOVERY" => Some(Self::PasswordRecovery),
            "MFA_CHALLENGE_VERIFIED" => Some(Self::MfaChallengeVerified),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One session-change notification from the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    #[serde(default)]
    pub session: Option<Session>,
}

impl AuthStateChange {
    #[must_use]
    pub fn new(event: AuthChangeEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::new(AuthChangeEvent::SignedOut, None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutScope {
    #[default]
    Global,
    Local,
    Others,
}

impl SignOutScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
            Self::Others => "others",
        }
    }
}
