//! Single-flight access token renewal
//!
//! `Idle -> Refreshing -> Idle` on success, `Idle -> Refreshing -> (session
//! cleared) -> Idle` on failure. While `Refreshing`, every other caller is
//! parked as a waiter and resumed with the one renewal outcome.

use crate::error::ClientError;
use crate::store::SessionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// New access credential returned by the renewal endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct RenewedAccess {
    /// New access token
    pub access_token: String,
    /// Rotated refresh token, when the server rotates them
    pub refresh_token: Option<String>,
}

impl RenewedAccess {
    /// Renewal without refresh rotation
    #[inline]
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    /// With rotated refresh token
    #[inline]
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

impl std::fmt::Debug for RenewedAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewedAccess")
            .field("rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    /// Perform one renewal call against the server
    async fn renew(&self, refresh_token: &str) -> Result<RenewedAccess, ClientError>;
}

/// A caller parked until the in-flight renewal resolves
type Waiter = oneshot::Sender<Result<String, ClientError>>;

#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        waiters: Vec<Waiter>,
    },
}

/// Serializes renewal so N concurrent failures produce one renewal call
pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    renewer: Arc<dyn TokenRenewer>,
    state: Mutex<RefreshState>,
    renewals: AtomicU64,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("renewals", &self.renewal_count())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator for `store`
    #[must_use]
    pub fn new(store: Arc<SessionStore>, renewer: Arc<dyn TokenRenewer>) -> Self {
        Self {
            store,
            renewer,
            state: Mutex::new(RefreshState::Idle),
            renewals: AtomicU64::new(0),
        }
    }

    /// The store this coordinator renews
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Check if a renewal is in flight
    #[inline]
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Callers parked on the in-flight renewal
    #[must_use]
    pub fn waiting(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Refreshing { waiters } => waiters.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Number of renewal calls issued to the server
    #[inline]
    #[must_use]
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Return a usable access token, renewing it first if it has expired.
    ///
    /// Joins an in-flight renewal instead of returning the old token.
    ///
    /// # Errors
    /// - `ClientError::Unauthenticated` if there is no session
    /// - `ClientError::SessionExpired` if renewal failed (session is cleared)
    pub async fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<String, ClientError> {
        let session = self.store.get().ok_or(ClientError::Unauthenticated)?;
        if !session.is_access_expired(now) && !self.is_refreshing() {
            return Ok(session.access_token().to_owned());
        }

        tracing::debug!("Access token expired, renewing");
        self.single_flight(session.access_token()).await
    }

    /// Renew after the server rejected `rejected_access`.
    ///
    /// If another caller already replaced that token, the current one is
    /// returned without a second renewal call.
    ///
    /// # Errors
    /// Same as [`ensure_fresh`](Self::ensure_fresh).
    pub async fn renew_after_rejection(&self, rejected_access: &str) -> Result<String, ClientError> {
        self.single_flight(rejected_access).await
    }

    async fn single_flight(&self, stale_access: &str) -> Result<String, ClientError> {
        let joined = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => {
                    let session = self.store.get().ok_or(ClientError::Unauthenticated)?;
                    if session.access_token() != stale_access {
                        return Ok(session.access_token().to_owned());
                    }
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = joined {
            tracing::debug!("Joining in-flight token renewal");
            return rx.await.unwrap_or_else(|_| {
                Err(ClientError::Network("token renewal abandoned".to_string()))
            });
        }

        let in_flight = InFlight {
            state: &self.state,
            finished: false,
        };
        let outcome = self.run_renewal().await;

        let waiters = in_flight.finish();
        tracing::debug!("Resuming {} waiting callers", waiters.len());
        for waiter in waiters {
            // A waiter whose caller went away is simply dropped
            let _ = waiter.send(outcome.clone());
        }

        outcome
    }

    async fn run_renewal(&self) -> Result<String, ClientError> {
        let session = self.store.get().ok_or(ClientError::Unauthenticated)?;
        self.renewals.fetch_add(1, Ordering::SeqCst);

        match self.renewer.renew(session.refresh_token()).await {
            Ok(renewed) => match self.store.replace_access(session.refresh_token(), renewed) {
                Some(next) => {
                    tracing::info!("Access token renewed");
                    Ok(next.access_token().to_owned())
                }
                // Logged out or logged in again during renewal; the current session wins
                None => self
                    .store
                    .get()
                    .map(|current| current.access_token().to_owned())
                    .ok_or(ClientError::Unauthenticated),
            },
            Err(e) => {
                tracing::error!("Token renewal failed, clearing session: {}", e);
                self.store.clear();
                Err(ClientError::SessionExpired)
            }
        }
    }
}

/// Returns the coordinator to `Idle` even if the leading future is dropped.
struct InFlight<'a> {
    state: &'a Mutex<RefreshState>,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self) -> Vec<Waiter> {
        self.finished = true;
        take_waiters(self.state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let abandoned = take_waiters(self.state);
            tracing::warn!("Token renewal abandoned with {} waiters", abandoned.len());
        }
    }
}

fn take_waiters(state: &Mutex<RefreshState>) -> Vec<Waiter> {
    match std::mem::take(&mut *state.lock()) {
        RefreshState::Refreshing { waiters } => waiters,
        RefreshState::Idle => Vec::new(),
    }
}
