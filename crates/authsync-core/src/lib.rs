//! Client-side auth state mirror.
//!
//! An [`AuthProvider`] subscribes to a hosted identity provider through the
//! [`IdentityClient`] contract, mirrors the current session and user into a
//! `watch` cell, creates a profile row on sign-in through [`ProfileStore`],
//! and offers a best-effort sign-out. Code running inside
//! [`AuthProvider::scope`] reaches it with [`use_auth`].

pub mod client;
pub mod context;
pub mod profile;
pub mod provider;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::{AuthListener, AuthSubscription, IdentityClient, ProviderError};
pub use context::{AuthContextError, use_auth};
pub use profile::{
    NO_ROWS_CODE, NewProfile, ProfileProvisioning, ProfileRef, ProfileStore, ProfileStoreError,
    ensure_user_profile,
};
pub use provider::{AuthHandle, AuthProvider, ProviderOptions, SignOutOutcome};
pub use state::AuthSnapshot;
pub use types::{AuthChangeEvent, AuthStateChange, Session, SignOutScope, User, session_label};
