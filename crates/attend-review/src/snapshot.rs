//! Point-in-time review queue snapshot

use crate::model::{AnomalyAlert, PendingVerificationItem};
use attend_gateway::{endpoints, AuthenticatedGateway};
use attend_session::ClientError;

/// Pending verifications and anomalies as the server lists them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Pending verifications, newest check-in first
    pub pending: Vec<PendingVerificationItem>,
    /// Anomalies, newest first
    pub anomalies: Vec<AnomalyAlert>,
}

impl Snapshot {
    /// Create snapshot
    #[inline]
    #[must_use]
    pub fn new(pending: Vec<PendingVerificationItem>, anomalies: Vec<AnomalyAlert>) -> Self {
        Self { pending, anomalies }
    }

    /// Fetch both lists concurrently.
    ///
    /// # Errors
    /// The first gateway error from either request
    pub async fn fetch(gateway: &AuthenticatedGateway) -> Result<Self, ClientError> {
        let (pending, anomalies) = tokio::try_join!(
            gateway.get_json::<Vec<PendingVerificationItem>>(endpoints::REVIEW_PENDING),
            gateway.get_json::<Vec<AnomalyAlert>>(endpoints::REVIEW_ANOMALIES),
        )?;

        tracing::debug!(
            "Fetched snapshot: {} pending, {} anomalies",
            pending.len(),
            anomalies.len()
        );
        Ok(Self { pending, anomalies })
    }
}
