//! Attend Review - real-time administrator review queue
//!
//! Keeps pending verifications and anomalies consistent between a bulk
//! snapshot and a live event stream:
//! - [`Reconciler`]: buffer until snapshot, replay, then apply live
//! - [`ReviewSession`]: runs the reconciler and the connection supervisor
//! - [`ActionDispatcher`]: approve / reject / batch-approve with immediate local removal
//! - [`WsConnector`]: WebSocket live stream with heartbeat
//!
//! # Example
//!
//! ```rust,ignore
//! use attend_review::{ReconnectPolicy, ReviewConfig, ReviewSession, StreamConfig, WsConnector};
//! use std::sync::Arc;
//!
//! let connector = Arc::new(WsConnector::new(StreamConfig::default()));
//! let session = ReviewSession::open(gateway, connector, &ReviewConfig::default(), ReconnectPolicy::default());
//! let view = session.wait_for(|v| v.is_ready()).await;
//! session.dispatcher().approve(&"E1".into(), "").await?;
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod dispatcher;
pub mod event;
pub mod model;
pub mod reconciler;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod view;

// Re-exports for convenience
pub use config::{Backoff, ReconnectPolicy, ReviewConfig, StreamConfig};
pub use dispatcher::{ActionDispatcher, BatchReport};
pub use event::{MalformedEvent, StreamEvent};
pub use model::{AnomalyAlert, AnomalyId, EmployeeId, PendingVerificationItem, Severity};
pub use reconciler::Reconciler;
pub use session::ReviewSession;
pub use snapshot::Snapshot;
pub use stream::{FrameStream, StreamConnector, WsConnector};
pub use view::{LoadState, PendingFilter, ReviewView, StreamState};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
