//! Attend Gateway - authenticated HTTP access to the attendance API
//!
//! Wraps every outbound call with bearer authentication and transparent,
//! single-flight token renewal:
//! - [`AuthenticatedGateway`]: attach credential, renew on 401, resend once
//! - [`HttpTransport`]: the seam between the gateway and the wire
//! - [`HttpTokenRenewer`]: the renewal call used by the refresh coordinator
//! - [`AuthApi`] / [`EmployeeApi`]: typed endpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use attend_gateway::{build_gateway, ApiConfig, AuthApi};
//! use attend_session::FilePersistence;
//! use std::sync::Arc;
//!
//! let gateway = build_gateway(&ApiConfig::new(), Arc::new(FilePersistence::new("session.json")))?;
//! let profile = AuthApi::new(gateway.clone()).login("alice", "secret").await?;
//! let pending: Vec<serde_json::Value> = gateway.get_json("review/pending/").await?;
//! ```

#![warn(unreachable_pub)]

pub mod auth;
pub mod config;
pub mod employee;
pub mod endpoints;
pub mod gateway;
pub mod renewer;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use auth::{AuthApi, RegisterRequest, RegisteredUser, Registration, UserProfile};
pub use config::{ApiConfig, ConfigError};
pub use employee::{AttendanceRecord, CheckoutReceipt, EmployeeApi, ProfileStatus, ProfileUpdate, TodayStatus};
pub use gateway::AuthenticatedGateway;
pub use renewer::HttpTokenRenewer;
pub use request::{ApiRequest, ApiResponse, Attempt, AuthMode, Method};
pub use transport::{HttpTransport, ReqwestTransport};

use attend_session::{RefreshCoordinator, SessionPersistence, SessionStore};
use chrono::Utc;
use std::sync::Arc;

/// Wire a gateway over `transport`, restoring any persisted session.
#[must_use]
pub fn gateway_over(
    transport: Arc<dyn HttpTransport>,
    persistence: Arc<dyn SessionPersistence>,
) -> Arc<AuthenticatedGateway> {
    let store = Arc::new(SessionStore::restore(persistence, Utc::now()));
    let renewer = Arc::new(HttpTokenRenewer::new(transport.clone()));
    let coordinator = Arc::new(RefreshCoordinator::new(store, renewer));
    Arc::new(AuthenticatedGateway::new(transport, coordinator))
}

/// Wire the production gateway from configuration.
///
/// # Errors
/// `ConfigError` if the HTTP transport cannot be built
pub fn build_gateway(
    config: &ApiConfig,
    persistence: Arc<dyn SessionPersistence>,
) -> Result<Arc<AuthenticatedGateway>, ConfigError> {
    let transport = Arc::new(ReqwestTransport::new(config)?);
    Ok(gateway_over(transport, persistence))
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
