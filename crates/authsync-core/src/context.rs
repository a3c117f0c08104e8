//! Ambient access to the mounted provider from code running inside it.

use std::future::Future;

use crate::provider::{AuthHandle, AuthProvider};

tokio::task_local! {
    static AUTH_CONTEXT: AuthHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthContextError {
    #[error("use_auth must be used within an AuthProvider")]
    OutsideProvider,
}

impl AuthProvider {
    /// Run `future` with this provider installed as the ambient auth context.
    pub async fn scope<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        AUTH_CONTEXT.scope(self.handle(), future).await
    }

    /// Synchronous variant of [`AuthProvider::scope`].
    pub fn sync_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        AUTH_CONTEXT.sync_scope(self.handle(), f)
    }
}

/// Handle of the provider whose scope the caller runs in.
pub fn use_auth() -> Result<AuthHandle, AuthContextError> {
    AUTH_CONTEXT
        .try_with(AuthHandle::clone)
        .map_err(|_| AuthContextError::OutsideProvider)
}
