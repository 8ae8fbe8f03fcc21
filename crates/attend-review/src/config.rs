//! Review session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Live stream connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket endpoint; the access token is appended as `?token=`
    pub url: String,
    /// Give up opening the connection after this many seconds
    pub connect_timeout_secs: u64,
    /// Ping interval; no pong within one interval counts as disconnection
    pub heartbeat_secs: u64,
    /// Reconnection policy
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws/admin/".to_string(),
            connect_timeout_secs: 10,
            heartbeat_secs: 30,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Create with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set endpoint
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set connect timeout
    #[inline]
    #[must_use]
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set heartbeat interval
    #[inline]
    #[must_use]
    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat_secs = secs;
        self
    }

    /// Set reconnection policy
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Connect timeout as a duration
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// Heartbeat interval as a duration
    #[inline]
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

/// Exponential backoff between reconnection attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect at all
    pub enabled: bool,
    /// First delay
    pub initial_backoff_ms: u64,
    /// Delay ceiling
    pub max_backoff_ms: u64,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set delay bounds
    #[inline]
    #[must_use]
    pub fn with_backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.initial_backoff_ms = initial;
        self.max_backoff_ms = max.max(initial);
        self
    }

    /// Set attempt limit
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Fresh backoff state for this policy
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempts: 0,
        }
    }
}

/// Backoff state across consecutive failed connections
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    /// Delay before the next attempt, or `None` to stop reconnecting
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        if self.policy.max_attempts.is_some_and(|max| self.attempts >= max) {
            return None;
        }

        let factor = 1u64.checked_shl(self.attempts.min(32)).unwrap_or(u64::MAX);
        let delay = self
            .policy
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.policy.max_backoff_ms);
        self.attempts += 1;

        Some(Duration::from_millis(delay))
    }

    /// Forget previous failures
    #[inline]
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failed attempts
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Reconciler settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Maximum anomalies kept; oldest are dropped beyond it
    pub anomaly_cap: Option<usize>,
}

impl ReviewConfig {
    /// Set anomaly cap
    #[inline]
    #[must_use]
    pub fn with_anomaly_cap(mut self, cap: usize) -> Self {
        self.anomaly_cap = Some(cap);
        self
    }
}
