use tracing::warn;

pub const ENV_BASE_URL: &str = "AUTHSYNC_URL";
pub const ENV_ANON_KEY: &str = "AUTHSYNC_ANON_KEY";
pub const ENV_PROFILE_TABLE: &str = "AUTHSYNC_PROFILE_TABLE";
pub const ENV_TIMEOUT_MS: &str = "AUTHSYNC_TIMEOUT_MS";

pub const DEFAULT_PROFILE_TABLE: &str = "profiles";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const MIN_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("anon key must not be empty")]
    MissingAnonKey,
    #[error("profile table must be a plain identifier")]
    InvalidProfileTable,
}

#[derive(Clone, PartialEq, Eq)]
pub struct HostedAuthConfig {
    pub base_url: String,
    pub anon_key: String,
    pub profile_table: String,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for HostedAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAuthConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"***")
            .field("profile_table", &self.profile_table)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl HostedAuthConfig {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        let anon_key = anon_key.trim();
        if anon_key.is_empty() {
            return Err(ConfigError::MissingAnonKey);
        }
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            anon_key: anon_key.to_string(),
            profile_table: DEFAULT_PROFILE_TABLE.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        })
    }

    pub fn with_profile_table(mut self, table: &str) -> Result<Self, ConfigError> {
        self.profile_table = normalize_table_name(table)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.max(MIN_TIMEOUT_MS);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env_non_empty(ENV_BASE_URL).ok_or(ConfigError::EmptyBaseUrl)?;
        let anon_key = env_non_empty(ENV_ANON_KEY).ok_or(ConfigError::MissingAnonKey)?;
        let mut config = Self::new(&base_url, &anon_key)?;

        if let Some(table) = env_non_empty(ENV_PROFILE_TABLE) {
            config = config.with_profile_table(&table)?;
        }
        if let Some(raw) = env_non_empty(ENV_TIMEOUT_MS) {
            match raw.parse::<u64>() {
                Ok(timeout_ms) => config = config.with_timeout_ms(timeout_ms),
                Err(_) => warn!(
                    value = %raw,
                    default_ms = DEFAULT_TIMEOUT_MS,
                    "ignoring unparseable {ENV_TIMEOUT_MS}"
                ),
            }
        }
        Ok(config)
    }
}

pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(ConfigError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(ConfigError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn normalize_table_name(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(ConfigError::InvalidProfileTable);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
