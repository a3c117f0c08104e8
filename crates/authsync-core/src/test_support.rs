use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::client::{AuthListener, AuthSubscription, IdentityClient, ProviderError};
use crate::profile::{NewProfile, ProfileRef, ProfileStore, ProfileStoreError};
use crate::types::{AuthStateChange, Session, SignOutScope, User};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn session(token: &str, user_id: &str) -> Session {
    Session::new(
        token,
        User::new(user_id, Some(format!("{user_id}@example.com"))),
    )
}

struct IdentityState {
    session: Result<Option<Session>, ProviderError>,
    sign_out_results: VecDeque<Result<(), ProviderError>>,
    sign_out_calls: Vec<SignOutScope>,
    get_session_calls: usize,
    listeners: Vec<AuthListener>,
    gate: Option<Arc<Notify>>,
}

pub(crate) struct FakeIdentityClient {
    state: Mutex<IdentityState>,
}

impl FakeIdentityClient {
    pub(crate) fn with_session(session: Option<Session>) -> Self {
        Self {
            state: Mutex::new(IdentityState {
                session: Ok(session),
                sign_out_results: VecDeque::new(),
                sign_out_calls: Vec::new(),
                get_session_calls: 0,
                listeners: Vec::new(),
                gate: None,
            }),
        }
    }

    pub(crate) fn failing(error: ProviderError) -> Self {
        let client = Self::with_session(None);
        lock(&client.state).session = Err(error);
        client
    }

    /// Hold `get_session` until the returned notify fires.
    pub(crate) fn hold_get_session(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.state).gate = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn queue_sign_out(&self, result: Result<(), ProviderError>) {
        lock(&self.state).sign_out_results.push_back(result);
    }

    pub(crate) fn emit(&self, change: AuthStateChange) {
        let mut state = lock(&self.state);
        state.listeners.retain(|listener| listener.send(change.clone()).is_ok());
    }

    pub(crate) fn sign_out_calls(&self) -> Vec<SignOutScope> {
        lock(&self.state).sign_out_calls.clone()
    }

    pub(crate) fn get_session_calls(&self) -> usize {
        lock(&self.state).get_session_calls
    }

    pub(crate) fn open_listeners(&self) -> usize {
        lock(&self.state)
            .listeners
            .iter()
            .filter(|listener| !listener.is_closed())
            .count()
    }
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let gate = {
            let mut state = lock(&self.state);
            state.get_session_calls += 1;
            state.gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        lock(&self.state).session.clone()
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        let (listener, subscription) = AuthSubscription::channel();
        lock(&self.state).listeners.push(listener);
        subscription
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError> {
        let mut state = lock(&self.state);
        state.sign_out_calls.push(scope);
        state.sign_out_results.pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default)]
struct ProfileState {
    rows: HashSet<String>,
    lookups: usize,
    lookup_error: Option<ProfileStoreError>,
    insert_error: Option<ProfileStoreError>,
    inserted: Vec<NewProfile>,
}

#[derive(Default)]
pub(crate) struct FakeProfileStore {
    state: Mutex<ProfileState>,
    inserts: Notify,
}

impl FakeProfileStore {
    pub(crate) fn seed(&self, user_id: &str) {
        lock(&self.state).rows.insert(user_id.to_string());
    }

    pub(crate) fn fail_lookup_with(&self, error: ProfileStoreError) {
        lock(&self.state).lookup_error = Some(error);
    }

    pub(crate) fn fail_insert_with(&self, error: ProfileStoreError) {
        lock(&self.state).insert_error = Some(error);
    }

    pub(crate) fn inserted(&self) -> Vec<NewProfile> {
        lock(&self.state).inserted.clone()
    }

    pub(crate) fn lookups(&self) -> usize {
        lock(&self.state).lookups
    }

    pub(crate) async fn wait_for_inserts(&self, count: usize) -> Vec<NewProfile> {
        loop {
            let inserted = self.inserted();
            if inserted.len() >= count {
                return inserted;
            }
            self.inserts.notified().await;
        }
    }
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRef>, ProfileStoreError> {
        let mut state = lock(&self.state);
        state.lookups += 1;
        if let Some(error) = state.lookup_error.clone() {
            return Err(error);
        }
        Ok(state.rows.contains(user_id).then(|| ProfileRef {
            id: user_id.to_string(),
        }))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), ProfileStoreError> {
        let result = {
            let mut state = lock(&self.state);
            if let Some(error) = state.insert_error.clone() {
                Err(error)
            } else {
                state.rows.insert(profile.id.clone());
                state.inserted.push(profile.clone());
                Ok(())
            }
        };
        self.inserts.notify_one();
        result
    }
}
