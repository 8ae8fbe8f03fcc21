//! Authenticated request gateway
//!
//! Every outbound call goes through [`AuthenticatedGateway::send`]:
//! 1. Attach the current access token (renewing first if it has expired)
//! 2. On a 401, renew through the [`RefreshCoordinator`] and resend once
//! 3. On a second 401, clear the session (unless a new login replaced it)
//!    and fail with `SessionExpired`
//!
//! Every other status is handed back untouched.

use crate::request::{ApiRequest, ApiResponse, Attempt, AuthMode};
use crate::transport::HttpTransport;
use attend_session::{ClientError, RefreshCoordinator, SessionStore};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// What to do with a response, given which attempt produced it
#[derive(Debug, PartialEq, Eq)]
enum Decision<'a> {
    /// Hand the response to the caller
    Deliver,
    /// Renew the rejected credential and resend
    RenewAndRetry { rejected: &'a str },
    /// Retried request still unauthorized
    Expire { rejected: &'a str },
}

fn decide<'a>(attempt: Attempt, credential: Option<&'a str>, response: &ApiResponse) -> Decision<'a> {
    let Some(rejected) = credential else {
        return Decision::Deliver;
    };
    if !response.is_unauthorized() {
        return Decision::Deliver;
    }
    match attempt.next() {
        Some(_) => Decision::RenewAndRetry { rejected },
        None => Decision::Expire { rejected },
    }
}

/// Wraps a transport with bearer auth and one-shot renewal on 401
pub struct AuthenticatedGateway {
    transport: Arc<dyn HttpTransport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl std::fmt::Debug for AuthenticatedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedGateway")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedGateway {
    /// Create gateway
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    /// Session store behind this gateway
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        self.coordinator.store()
    }

    /// Refresh coordinator behind this gateway
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// A currently valid access token, renewing it first if needed.
    ///
    /// Used by callers that authenticate outside HTTP (the live stream).
    ///
    /// # Errors
    /// `Unauthenticated` without a session, `SessionExpired` if renewal failed
    pub async fn fresh_access_token(&self) -> Result<String, ClientError> {
        self.coordinator.ensure_fresh(Utc::now()).await
    }

    /// Send `request`, renewing and resending at most once on a 401.
    ///
    /// # Errors
    /// - `ClientError::Unauthenticated` if auth is required and there is no session
    /// - `ClientError::SessionExpired` if renewal failed or the resend was rejected
    /// - `ClientError::Network` on transport failure
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut credential = self.credential_for(request).await?;
        let mut attempt = Attempt::Initial;

        loop {
            let response = self
                .transport
                .execute(request, credential.as_deref())
                .await?;

            match decide(attempt, credential.as_deref(), &response) {
                Decision::Deliver => return Ok(response),
                Decision::RenewAndRetry { rejected } => {
                    tracing::debug!("{} {} unauthorized, renewing", request.method(), request.path());
                    let renewed = self.coordinator.renew_after_rejection(rejected).await?;
                    credential = Some(renewed);
                    attempt = Attempt::Retry;
                }
                Decision::Expire { rejected } => {
                    tracing::error!(
                        "{} {} still unauthorized after renewal, ending session",
                        request.method(),
                        request.path()
                    );
                    self.store().clear_if_current(rejected);
                    return Err(ClientError::SessionExpired);
                }
            }
        }
    }

    /// Send and decode a 2xx JSON body; non-2xx becomes `ClientError::Server`.
    ///
    /// # Errors
    /// Everything [`send`](Self::send) returns, plus `Server` and `Decode`
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ClientError> {
        self.send(request).await?.into_success()?.json()
    }

    /// GET `path` and decode the body
    ///
    /// # Errors
    /// See [`execute_json`](Self::execute_json)
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute_json(&ApiRequest::get(path)).await
    }

    /// POST `body` to `path` and decode the response body
    ///
    /// # Errors
    /// See [`execute_json`](Self::execute_json)
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute_json(&ApiRequest::post_json(path, body)?).await
    }

    async fn credential_for(&self, request: &ApiRequest) -> Result<Option<String>, ClientError> {
        match request.auth() {
            AuthMode::Anonymous => Ok(None),
            AuthMode::Required => self.fresh_access_token().await.map(Some),
            AuthMode::Optional => match self.fresh_access_token().await {
                Ok(token) => Ok(Some(token)),
                Err(ClientError::Unauthenticated) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }
}
