//! # Sync Configuration
//!
//! Settings for the survey synchronization core, built through
//! [`SyncConfigBuilder`] with fail-fast validation.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig::builder()
//!     .kobo_url("https://kf.example.org")
//!     .database_path("/var/lib/survey-sync/sync.db")
//!     .artifact_dir("/var/lib/survey-sync/artifacts")
//!     .cache_ttl(Duration::from_secs(300))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing paths and out-of-range values fail at `build()` with
//! [`Error::Config`] instead of surfacing later inside a worker.
//!
//! ```should_panic
//! use core_runtime::config::SyncConfig;
//!
//! let config = SyncConfig::builder()
//!     .database_path("/tmp/sync.db")
//!     .build()
//!     .expect("Should fail - artifact directory missing");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Platform root used when none is configured.
pub const DEFAULT_KOBO_URL: &str = "https://kobo.unhcr.org";

/// `Authorization` header scheme sent with every platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthScheme {
    /// `Authorization: Token <key>`
    #[default]
    Token,
    /// `Authorization: Bearer <key>`
    Bearer,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Token => "Token",
            AuthScheme::Bearer => "Bearer",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "token" => Ok(AuthScheme::Token),
            "bearer" => Ok(AuthScheme::Bearer),
            other => Err(Error::Config(format!("Unknown auth scheme: {}", other))),
        }
    }
}

/// Configuration for the sync core.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Platform root, without trailing slash
    pub kobo_url: String,

    /// Lifetime of cached GET responses. Zero disables caching.
    pub cache_ttl: Duration,

    /// Maximum number of cached responses
    pub cache_capacity: usize,

    /// Pending resources older than this are classified stalled
    pub stale_after: Duration,

    /// Export polls allowed before a resource is failed
    pub max_poll_attempts: u32,

    /// Linear backoff step; poll `n` waits `step * n`
    pub poll_backoff_step: Duration,

    pub auth_scheme: AuthScheme,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Root directory downloaded artifacts are written under
    pub artifact_dir: PathBuf,
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Base of every REST call: `{kobo_url}/api/v2/`.
    pub fn api_base_url(&self) -> String {
        format!("{}/api/v2/", self.kobo_url)
    }

    pub fn cache_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.kobo_url.trim().is_empty() {
            return Err(Error::Config("Platform URL cannot be empty".to_string()));
        }

        if !(self.kobo_url.starts_with("http://") || self.kobo_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Platform URL must use http or https: {}",
                self.kobo_url
            )));
        }

        if self.max_poll_attempts == 0 {
            return Err(Error::Config(
                "max_poll_attempts must be greater than 0".to_string(),
            ));
        }

        if self.poll_backoff_step.is_zero() {
            return Err(Error::Config(
                "poll_backoff_step must be greater than 0".to_string(),
            ));
        }

        if self.stale_after.is_zero() {
            return Err(Error::Config(
                "stale_after must be greater than 0".to_string(),
            ));
        }

        if self.cache_enabled() && self.cache_capacity == 0 {
            return Err(Error::Config(
                "cache_capacity must be greater than 0 when caching is enabled. \
                 Set cache_ttl to 0 to disable the cache."
                    .to_string(),
            ));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.artifact_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Artifact directory cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`SyncConfig`] instances.
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    kobo_url: Option<String>,
    cache_ttl: Option<Duration>,
    cache_capacity: Option<usize>,
    stale_after: Option<Duration>,
    max_poll_attempts: Option<u32>,
    poll_backoff_step: Option<Duration>,
    auth_scheme: Option<AuthScheme>,
    request_timeout: Option<Duration>,
    database_path: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
}

impl SyncConfigBuilder {
    /// Platform root, e.g. `https://kf.kobotoolbox.org`.
    ///
    /// Default: [`DEFAULT_KOBO_URL`]
    pub fn kobo_url(mut self, url: impl Into<String>) -> Self {
        self.kobo_url = Some(url.into());
        self
    }

    /// Default: 600 seconds
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Default: 512 entries
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Default: 1 hour
    pub fn stale_after(mut self, threshold: Duration) -> Self {
        self.stale_after = Some(threshold);
        self
    }

    /// Default: 5
    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    /// Default: 30 seconds
    pub fn poll_backoff_step(mut self, step: Duration) -> Self {
        self.poll_backoff_step = Some(step);
        self
    }

    pub fn auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = Some(scheme);
        self
    }

    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn artifact_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.artifact_dir = Some(path.into());
        self
    }

    /// Builds and validates the final `SyncConfig`.
    pub fn build(self) -> Result<SyncConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let artifact_dir = self.artifact_dir.ok_or_else(|| {
            Error::Config(
                "Artifact directory is required. Use .artifact_dir() to set it.".to_string(),
            )
        })?;

        let kobo_url = self
            .kobo_url
            .unwrap_or_else(|| DEFAULT_KOBO_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let config = SyncConfig {
            kobo_url,
            cache_ttl: self.cache_ttl.unwrap_or(Duration::from_secs(600)),
            cache_capacity: self.cache_capacity.unwrap_or(512),
            stale_after: self.stale_after.unwrap_or(Duration::from_secs(3600)),
            max_poll_attempts: self.max_poll_attempts.unwrap_or(5),
            poll_backoff_step: self.poll_backoff_step.unwrap_or(Duration::from_secs(30)),
            auth_scheme: self.auth_scheme.unwrap_or_default(),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            database_path,
            artifact_dir,
        };

        config.validate()?;

        Ok(config)
    }
}
