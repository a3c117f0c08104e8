use authsync_core::{ProfileStoreError, ProviderError};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostedError {
    #[error("hosted_request_failed:{message}")]
    Request { message: String },
    #[error("hosted_read_failed:{message}")]
    Read { message: String },
    #[error("hosted_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("hosted_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("hosted_no_session")]
    NoSession,
}

impl HostedError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Auth API error body. The API has used both shapes over time.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// REST (profile table) error body.
#[derive(Debug, Default, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

pub fn provider_error(error: HostedError) -> ProviderError {
    match error {
        HostedError::Http { status, body } => auth_error_from_body(status, &body),
        HostedError::NoSession => ProviderError::new("Auth session missing!").with_status(400),
        other => ProviderError::new(other.to_string()),
    }
}

pub fn profile_error(error: HostedError) -> ProfileStoreError {
    match error {
        HostedError::Http { status, body } => rest_error_from_body(status, &body),
        other => ProfileStoreError::new(other.to_string()),
    }
}

pub fn auth_error_from_body(status: StatusCode, body: &str) -> ProviderError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or(parsed.error.clone());
    let detail = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .or_else(|| non_empty(body))
        .unwrap_or_else(|| status.to_string());

    let message = match code.as_deref() {
        Some(code) if !detail.contains(code) => format!("{code}: {detail}"),
        _ => detail,
    };
    let error = ProviderError::new(message).with_status(status.as_u16());
    match code {
        Some(code) => error.with_code(code),
        None => error,
    }
}

pub fn rest_error_from_body(status: StatusCode, body: &str) -> ProfileStoreError {
    let parsed: RestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (parsed.message, parsed.details) {
        (Some(message), Some(details)) => format!("{message} ({details})"),
        (Some(message), None) => message,
        (None, _) => non_empty(body).unwrap_or_else(|| status.to_string()),
    };
    let error = ProfileStoreError::new(message);
    match parsed.code {
        Some(code) => error.with_code(code),
        None => error,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
