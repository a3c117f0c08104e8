use serde::Serialize;

use crate::types::{AuthChangeEvent, AuthStateChange, Session, User};

/// Locally mirrored auth state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            user: None,
            session: None,
            loading: true,
            error: None,
        }
    }
}

impl AuthSnapshot {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.session.is_some()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }

    /// Copy a provider session in. A present session clears any stale error.
    pub fn update_session(&mut self, session: Option<Session>) {
        self.user = session.as_ref().map(|session| session.user.clone());
        if session.is_some() {
            self.error = None;
        }
        self.session = session;
    }

    pub fn clear(&mut self) {
        self.session = None;
        self.user = None;
        self.error = None;
    }

    /// Apply one provider notification. Returns the user whose profile should
    /// be provisioned, if any.
    pub fn apply_change(&mut self, change: &AuthStateChange) -> Option<User> {
        match change.event {
            AuthChangeEvent::SignedOut => {
                self.clear();
                self.loading = false;
                None
            }
            AuthChangeEvent::SignedIn | AuthChangeEvent::TokenRefreshed => {
                self.update_session(change.session.clone());
                self.loading = false;
                change.session.as_ref().map(|session| session.user.clone())
            }
            _ => {
                let incoming = change
                    .session
                    .as_ref()
                    .map(|session| session.access_token.as_str());
                if self.access_token() != incoming {
                    self.update_session(change.session.clone());
                    self.loading = false;
                }
                None
            }
        }
    }
}
