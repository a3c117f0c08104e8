//! Hosted backend for `authsync-core`: a token/logout auth API and a REST
//! profile table, both reached over HTTP with the project's anon key.

pub mod client;
pub mod config;
pub mod error;

pub use client::HostedAuthClient;
pub use config::{ConfigError, HostedAuthConfig};
pub use error::HostedError;
