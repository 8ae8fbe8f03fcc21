//! Client configuration
//!
//! One TOML file covers the whole client:
//!
//! ```toml
//! api_base_url = "https://hr.example.com/api/"
//! request_timeout_secs = 30
//! session_file = "/var/lib/attend/session.json"
//!
//! [stream]
//! url = "wss://hr.example.com/ws/admin/"
//! heartbeat_secs = 30
//!
//! [stream.reconnect]
//! initial_backoff_ms = 500
//! max_attempts = 10
//!
//! [review]
//! anomaly_cap = 200
//! ```
//!
//! Every key is optional.

use attend_gateway::ApiConfig;
use attend_review::{ReviewConfig, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "ATTEND_CONFIG";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that was tried
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Not valid TOML or wrong value types
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// No `session_file` and no home directory to default under
    #[error("no session file configured and HOME is not set")]
    NoSessionLocation,
}

/// Settings for every client component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST API base URL
    pub api_base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Where the session is persisted; `~/.attend/session.json` when unset
    pub session_file: Option<PathBuf>,
    /// Live stream settings
    pub stream: StreamConfig,
    /// Review view settings
    pub review: ReviewConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api = ApiConfig::default();
        Self {
            api_base_url: api.base_url,
            request_timeout_secs: api.request_timeout_secs,
            session_file: None,
            stream: StreamConfig::default(),
            review: ReviewConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `LoadError::Parse` on malformed input
    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `LoadError::Read` if the file cannot be read, `LoadError::Parse` if it
    /// is not valid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// With API base URL
    #[inline]
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// With session file
    #[inline]
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// With stream settings
    #[inline]
    #[must_use]
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// With review settings
    #[inline]
    #[must_use]
    pub fn with_review(mut self, review: ReviewConfig) -> Self {
        self.review = review;
        self
    }

    /// REST settings for the gateway
    #[must_use]
    pub fn api(&self) -> ApiConfig {
        ApiConfig::new()
            .with_base_url(self.api_base_url.clone())
            .with_request_timeout_secs(self.request_timeout_secs)
    }

    /// Session file, defaulting under `home`
    ///
    /// # Errors
    /// `LoadError::NoSessionLocation` when neither is available
    pub fn session_path(&self, home: Option<&Path>) -> Result<PathBuf, LoadError> {
        if let Some(path) = &self.session_file {
            return Ok(path.clone());
        }
        home.map(|home| home.join(".attend").join("session.json"))
            .ok_or(LoadError::NoSessionLocation)
    }
}
