//! Attend Session - credential ownership for the attendance client
//!
//! Owns everything about "who is calling":
//! - The current [`Session`] (access + refresh token pair)
//! - The [`SessionStore`], the single source of truth for authentication
//! - The [`SessionPersistence`] port used to survive process restarts
//! - The [`RefreshCoordinator`], which guarantees at most one in-flight
//!   token renewal across any number of concurrent callers
//! - The [`ClientError`] taxonomy shared by every layer above
//!
//! # Example
//!
//! ```rust,ignore
//! use attend_session::{RefreshCoordinator, SessionStore, MemoryPersistence};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SessionStore::new(Arc::new(MemoryPersistence::new())));
//! let coordinator = RefreshCoordinator::new(store.clone(), renewer);
//!
//! // Returns immediately while the access token is still valid
//! let access = coordinator.ensure_fresh(chrono::Utc::now()).await?;
//! ```

#![warn(unreachable_pub)]

pub mod coordinator;
pub mod error;
pub mod persistence;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use coordinator::{RefreshCoordinator, RenewedAccess, TokenRenewer};
pub use error::{ClientError, PersistenceError};
pub use persistence::{FilePersistence, MemoryPersistence, SessionPersistence};
pub use session::{jwt_expiry, Session};
pub use store::SessionStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
