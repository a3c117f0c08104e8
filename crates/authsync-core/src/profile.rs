//! Application-side profile records, created lazily on first sign-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::types::User;

/// PostgREST code for "no rows returned" on a single-object select.
pub const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProfileStoreError {
    pub message: String,
    pub code: Option<String>,
}

impl ProfileStoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new("JSON object requested, multiple (or no) rows returned").with_code(NO_ROWS_CODE)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code.as_deref() == Some(NO_ROWS_CODE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl NewProfile {
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            full_name: user.metadata_str("full_name").map(str::to_string),
            avatar_url: user.metadata_str("avatar_url").map(str::to_string),
        }
    }
}

/// Read/insert pair over the profile table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Select by id. Stores may report a missing row either as `Ok(None)` or
    /// as an error carrying [`NO_ROWS_CODE`].
    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRef>, ProfileStoreError>;

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), ProfileStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileProvisioning {
    AlreadyExists,
    Created,
    LookupFailed,
    InsertFailed,
}

/// Make sure `user` has a profile row. Failures are logged, never returned.
pub async fn ensure_user_profile(store: &dyn ProfileStore, user: &User) -> ProfileProvisioning {
    debug!(user_id = %user.id, "ensuring user profile exists");

    let existing = match store.find_profile(&user.id).await {
        Ok(existing) => existing,
        Err(err) if err.is_not_found() => None,
        Err(err) => {
            error!(user_id = %user.id, error = %err, code = ?err.code, "profile lookup failed");
            return ProfileProvisioning::LookupFailed;
        }
    };

    if existing.is_some() {
        debug!(user_id = %user.id, "profile already exists");
        return ProfileProvisioning::AlreadyExists;
    }

    info!(user_id = %user.id, "creating profile");
    match store.insert_profile(&NewProfile::for_user(user)).await {
        Ok(()) => {
            info!(user_id = %user.id, "profile created");
            ProfileProvisioning::Created
        }
        Err(err) => {
            error!(user_id = %user.id, error = %err, code = ?err.code, "profile insert failed");
            ProfileProvisioning::InsertFailed
        }
    }
}
