use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use authsync_core::{
    AuthChangeEvent, AuthListener, AuthStateChange, AuthSubscription, IdentityClient, NewProfile,
    ProfileRef, ProfileStore, ProfileStoreError, ProviderError, Session, SignOutScope,
};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HostedAuthConfig;
use crate::error::{HostedError, profile_error, provider_error};

const PGRST_OBJECT: &str = "application/vnd.pgrst.object+json";

struct Inner {
    config: HostedAuthConfig,
    http: reqwest::Client,
    timeout: Duration,
    session: Mutex<Option<Session>>,
    listeners: Mutex<Vec<AuthListener>>,
}

/// Hosted auth API + profile table client. Keeps the current session in
/// memory and fans session changes out to every registered listener.
#[derive(Clone)]
pub struct HostedAuthClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HostedAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAuthClient")
            .field("config", &self.inner.config)
            .field("has_session", &lock(&self.inner.session).is_some())
            .finish()
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HostedAuthClient {
    #[must_use]
    pub fn new(config: HostedAuthConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        Self {
            inner: Arc::new(Inner {
                config,
                http: reqwest::Client::new(),
                timeout,
                session: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HostedAuthConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn auth_endpoint(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.inner.config.base_url,
            path.trim().trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn profile_endpoint(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.inner.config.base_url, self.inner.config.profile_table
        )
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        lock(&self.inner.session).clone()
    }

    /// Store `session` as the current one and announce it as a sign-in.
    pub fn set_session(&self, session: Session) {
        self.store_session(session, AuthChangeEvent::SignedIn);
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, HostedError> {
        let email = email.trim().to_lowercase();
        let request = self
            .inner
            .http
            .post(self.auth_endpoint("token?grant_type=password"))
            .json(&PasswordGrant {
                email: &email,
                password,
            });
        let session: Session = decode_json(self.send(request, None).await?).await?;
        info!(user_id = %session.user.id, "signed in with password");
        Ok(self.store_session(session, AuthChangeEvent::SignedIn))
    }

    /// Exchange the stored refresh token for a new session. Caller driven.
    pub async fn refresh_session(&self) -> Result<Session, HostedError> {
        let refresh_token = self
            .current_session()
            .and_then(|session| session.refresh_token)
            .ok_or(HostedError::NoSession)?;
        let request = self
            .inner
            .http
            .post(self.auth_endpoint("token?grant_type=refresh_token"))
            .json(&RefreshGrant {
                refresh_token: &refresh_token,
            });
        let session: Session = decode_json(self.send(request, None).await?).await?;
        debug!(user_id = %session.user.id, "session refreshed");
        Ok(self.store_session(session, AuthChangeEvent::TokenRefreshed))
    }

    fn store_session(&self, mut session: Session, event: AuthChangeEvent) -> Session {
        if session.expires_at.is_none() {
            session.expires_at = session
                .expires_in
                .map(|expires_in| Utc::now().timestamp() + expires_in);
        }
        *lock(&self.inner.session) = Some(session.clone());
        self.notify(AuthStateChange::new(event, Some(session.clone())));
        session
    }

    fn remove_session(&self) {
        lock(&self.inner.session).take();
        self.notify(AuthStateChange::signed_out());
    }

    fn notify(&self, change: AuthStateChange) {
        let mut listeners = lock(&self.inner.listeners);
        listeners.retain(|listener| listener.send(change.clone()).is_ok());
        debug!(event = %change.event, listeners = listeners.len(), "auth change delivered");
    }

    fn bearer(&self) -> String {
        self.current_session()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.inner.config.anon_key.clone())
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, HostedError> {
        let bearer = bearer.unwrap_or(self.inner.config.anon_key.as_str());
        request
            .header("apikey", &self.inner.config.anon_key)
            .bearer_auth(bearer)
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.inner.timeout)
            .send()
            .await
            .map_err(|error| HostedError::Request {
                message: error.to_string(),
            })
    }

    async fn logout(&self, access_token: &str, scope: SignOutScope) -> Result<(), HostedError> {
        let request = self
            .inner
            .http
            .post(self.auth_endpoint(&format!("logout?scope={}", scope.as_str())));
        ensure_success(self.send(request, Some(access_token)).await?).await
    }
}

#[async_trait]
impl IdentityClient for HostedAuthClient {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.current_session())
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        let (listener, subscription) = AuthSubscription::channel();
        // Registration and the initial read happen under the listeners lock so
        // a concurrent store either shows up in INITIAL_SESSION or is notified.
        let mut listeners = lock(&self.inner.listeners);
        let initial = AuthStateChange::new(AuthChangeEvent::InitialSession, self.current_session());
        if listener.send(initial).is_ok() {
            listeners.push(listener);
        }
        subscription
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError> {
        let access_token = self
            .current_session()
            .map(|session| session.access_token)
            .filter(|_| scope != SignOutScope::Local);
        if let Some(access_token) = access_token {
            match self.logout(&access_token, scope).await {
                Ok(()) => {}
                Err(error)
                    if matches!(
                        error.status(),
                        Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND)
                    ) =>
                {
                    debug!(error = %error, "session already gone on server");
                }
                Err(error) => {
                    warn!(error = %error, scope = scope.as_str(), "logout request failed");
                    return Err(provider_error(error));
                }
            }
        }

        if scope != SignOutScope::Others {
            self.remove_session();
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for HostedAuthClient {
    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRef>, ProfileStoreError> {
        let bearer = self.bearer();
        let request = self
            .inner
            .http
            .get(self.profile_endpoint())
            .query(&[("id", format!("eq.{user_id}")), ("select", "id".to_string())])
            .header(reqwest::header::ACCEPT, PGRST_OBJECT);
        let response = self
            .send(request, Some(bearer.as_str()))
            .await
            .map_err(profile_error)?;
        decode_json::<ProfileRef>(response)
            .await
            .map(Some)
            .map_err(profile_error)
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), ProfileStoreError> {
        let bearer = self.bearer();
        let request = self
            .inner
            .http
            .post(self.profile_endpoint())
            .header("prefer", "return=minimal")
            .json(profile);
        let response = self
            .send(request, Some(bearer.as_str()))
            .await
            .map_err(profile_error)?;
        ensure_success(response).await.map_err(profile_error)
    }
}

async fn read_body(response: reqwest::Response) -> Result<(StatusCode, Vec<u8>), HostedError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| HostedError::Read {
        message: error.to_string(),
    })?;
    if !status.is_success() {
        return Err(HostedError::Http {
            status,
            body: String::from_utf8_lossy(&bytes).trim().to_string(),
        });
    }
    Ok((status, bytes.to_vec()))
}

async fn ensure_success(response: reqwest::Response) -> Result<(), HostedError> {
    read_body(response).await.map(|_| ())
}

async fn decode_json<T>(response: reqwest::Response) -> Result<T, HostedError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let (_, bytes) = read_body(response).await?;
    serde_json::from_slice::<T>(&bytes).map_err(|error| HostedError::Decode {
        message: error.to_string(),
    })
}
