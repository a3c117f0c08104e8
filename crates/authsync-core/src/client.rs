use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{AuthStateChange, Session, SignOutScope};

const SESSION_MISSING_MARKERS: [&str; 2] = ["session_not_found", "Session not found"];

/// Error reported by the identity provider. Only the message, HTTP status and
/// provider error code are inspected; everything else is opaque.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The server no longer knows the session the client holds.
    #[must_use]
    pub fn is_session_missing(&self) -> bool {
        SESSION_MISSING_MARKERS
            .iter()
            .any(|marker| self.message.contains(marker))
    }

    /// Sign-out failures that still leave the user signed out remotely.
    #[must_use]
    pub fn is_sign_out_absorbable(&self) -> bool {
        self.is_session_missing() || self.status == Some(403)
    }
}

/// One listener registration with the identity provider.
///
/// Dropping the subscription unsubscribes; the provider side observes the
/// closed channel and stops delivering.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: mpsc::UnboundedReceiver<AuthStateChange>,
}

pub type AuthListener = mpsc::UnboundedSender<AuthStateChange>;

impl AuthSubscription {
    /// New registration: the provider keeps the listener, the caller the subscription.
    #[must_use]
    pub fn channel() -> (AuthListener, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Next notification, or `None` once the provider dropped the listener.
    pub async fn recv(&mut self) -> Option<AuthStateChange> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

/// Client contract of the hosted identity provider.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    fn on_auth_state_change(&self) -> AuthSubscription;

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError>;
}
