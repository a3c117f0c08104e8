//! Auth provider: mirrors the identity provider's session into a local
//! `watch` cell and owns the single listener registration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{AuthSubscription, IdentityClient};
use crate::profile::{ProfileStore, ensure_user_profile};
use crate::state::AuthSnapshot;
use crate::types::{Session, SignOutScope, User, session_label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Create a profile row for users that sign in without one.
    pub provision_profiles: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            provision_profiles: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutOutcome {
    /// The provider revoked the session.
    Remote,
    /// The provider no longer knew the session.
    AlreadyInvalid,
    /// Remote sign-out failed; the local-only sign-out succeeded.
    LocalFallback,
    /// Both the remote and the local-only sign-out failed.
    LocalFallbackFailed,
}

struct Shared {
    client: Arc<dyn IdentityClient>,
    profiles: Arc<dyn ProfileStore>,
    options: ProviderOptions,
    state: watch::Sender<AuthSnapshot>,
    mounted: AtomicBool,
    unmounted: Notify,
}

impl Shared {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    fn update(&self, apply: impl FnOnce(&mut AuthSnapshot)) {
        if !self.is_mounted() {
            return;
        }
        self.state.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            apply(snapshot);
            *snapshot != before
        });
    }

    fn provision(&self, user: User) {
        if !self.options.provision_profiles {
            return;
        }
        let profiles = Arc::clone(&self.profiles);
        tokio::spawn(async move {
            ensure_user_profile(profiles.as_ref(), &user).await;
        });
    }

    async fn listen(self: Arc<Self>, mut subscription: AuthSubscription) {
        while let Some(change) = subscription.recv().await {
            if !self.is_mounted() {
                break;
            }
            info!(
                event = %change.event,
                user = session_label(change.session.as_ref()),
                "auth state changed"
            );

            let mut provision = None;
            self.update(|snapshot| provision = snapshot.apply_change(&change));
            if let Some(user) = provision {
                self.provision(user);
            }
        }
        subscription.unsubscribe();
        debug!("auth listener stopped");
    }

    async fn initialize(self: Arc<Self>) {
        debug!("initializing auth");
        match self.client.get_session().await {
            Ok(session) => self.apply_initial_session(session),
            Err(err) if err.is_session_missing() => {
                warn!(error = %err, "session not found on server, clearing local session");
                if let Err(local_err) = self.client.sign_out(SignOutScope::Local).await {
                    warn!(error = %local_err, "local sign-out after missing session failed");
                }
                self.update(|snapshot| {
                    snapshot.clear();
                    snapshot.loading = false;
                });
            }
            Err(err) => {
                error!(error = %err, status = ?err.status, "failed to get initial session");
                self.update(|snapshot| {
                    snapshot.error = Some(err.message.clone());
                    snapshot.loading = false;
                });
            }
        }
    }

    fn apply_initial_session(&self, session: Option<Session>) {
        if !self.is_mounted() {
            return;
        }
        info!(user = session_label(session.as_ref()), "initial session");
        let user = session.as_ref().map(|session| session.user.clone());
        self.update(|snapshot| {
            snapshot.update_session(session);
            snapshot.loading = false;
        });
        if let Some(user) = user {
            self.provision(user);
        }
    }

    async fn sign_out(&self) -> SignOutOutcome {
        info!("starting sign-out");
        self.update(AuthSnapshot::clear);

        let err = match self.client.sign_out(SignOutScope::Global).await {
            Ok(()) => {
                info!("sign-out successful");
                return SignOutOutcome::Remote;
            }
            Err(err) => err,
        };

        if err.is_sign_out_absorbable() {
            info!(error = %err, status = ?err.status, "session already invalid on server");
            return SignOutOutcome::AlreadyInvalid;
        }

        warn!(error = %err, status = ?err.status, "remote sign-out failed, forcing local sign-out");
        match self.client.sign_out(SignOutScope::Local).await {
            Ok(()) => SignOutOutcome::LocalFallback,
            Err(local_err) => {
                error!(error = %local_err, "failed to clear local session");
                SignOutOutcome::LocalFallbackFailed
            }
        }
    }
}

/// Owner of the mirrored auth state. Unmounts on drop.
pub struct AuthProvider {
    shared: Arc<Shared>,
    listener: Option<JoinHandle<()>>,
}

impl AuthProvider {
    /// Subscribe to the identity provider, then fetch the current session.
    ///
    /// Must be called from within a tokio runtime: the listener and the
    /// initial fetch run as background tasks.
    pub fn mount(client: Arc<dyn IdentityClient>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self::mount_with(client, profiles, ProviderOptions::default())
    }

    pub fn mount_with(
        client: Arc<dyn IdentityClient>,
        profiles: Arc<dyn ProfileStore>,
        options: ProviderOptions,
    ) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::default());
        let shared = Arc::new(Shared {
            client,
            profiles,
            options,
            state,
            mounted: AtomicBool::new(true),
            unmounted: Notify::new(),
        });

        let subscription = shared.client.on_auth_state_change();
        let listener = tokio::spawn(Arc::clone(&shared).listen(subscription));
        tokio::spawn(Arc::clone(&shared).initialize());

        Self {
            shared,
            listener: Some(listener),
        }
    }

    #[must_use]
    pub fn handle(&self) -> AuthHandle {
        AuthHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.shared.state.subscribe()
    }

    pub async fn sign_out(&self) -> SignOutOutcome {
        self.shared.sign_out().await
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.shared.is_mounted()
    }

    /// Stop mirroring and drop the listener registration. Idempotent.
    pub fn unmount(&mut self) {
        self.shared.mounted.store(false, Ordering::Release);
        self.shared.unmounted.notify_waiters();
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!("auth provider unmounted");
        }
    }
}

impl Drop for AuthProvider {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Cheap, cloneable view of a mounted provider.
#[derive(Clone)]
pub struct AuthHandle {
    shared: Arc<Shared>,
}

impl AuthHandle {
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.shared.state.borrow().user.clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.shared.state.borrow().session.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.shared.state.borrow().error.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.shared.state.subscribe()
    }

    /// Wait until the initial load finished and return the state at that point.
    /// Returns the current state right away once the provider is unmounted.
    pub async fn settled(&self) -> AuthSnapshot {
        let mut receiver = self.subscribe();
        let unmounted = self.shared.unmounted.notified();
        tokio::pin!(unmounted);
        unmounted.as_mut().enable();
        if !self.shared.is_mounted() {
            return self.snapshot();
        }

        tokio::select! {
            result = receiver.wait_for(|snapshot| !snapshot.loading) => match result {
                Ok(snapshot) => snapshot.clone(),
                Err(_) => self.snapshot(),
            },
            () = &mut unmounted => self.snapshot(),
        }
    }

    pub async fn sign_out(&self) -> SignOutOutcome {
        self.shared.sign_out().await
    }
}

impl std::fmt::Debug for AuthHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandle")
            .field("snapshot", &*self.shared.state.borrow())
            .field("mounted", &self.shared.is_mounted())
            .finish()
    }
}
