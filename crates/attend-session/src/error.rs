//! Error types shared by the attendance client layers
//!
//! [`ClientError`] is the taxonomy surfaced to callers:
//! - Missing or expired credentials
//! - Transport failures
//! - Non-2xx business responses
//! - Undecodable response bodies

/// Errors surfaced by the session, gateway and review layers.
///
/// `Clone` so a single renewal outcome can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// No session present when one is required
    #[error("not authenticated")]
    Unauthenticated,

    /// Renewal failed or the retried request was still unauthorized
    #[error("session expired, re-authentication required")]
    SessionExpired,

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx business response, passed through for the caller to render
    #[error("server returned {status}: {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A successful response whose body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Both variants end with a cleared session and a trip back to login.
    #[inline]
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::SessionExpired)
    }

    /// Check if error is transport-level
    #[inline]
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// HTTP status for server errors
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Failures of a [`SessionPersistence`](crate::SessionPersistence) adapter
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Storage medium I/O failed
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored session could not be encoded or decoded
    #[error("stored session is malformed: {0}")]
    Format(#[from] serde_json::Error),
}
