//! Login, registration and logout

use crate::endpoints;
use crate::gateway::AuthenticatedGateway;
use crate::request::{ApiRequest, AuthMode};
use attend_session::{ClientError, Session};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Who signed in, as reported by the login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Login name
    pub username: String,
    /// Employee identifier
    #[serde(default)]
    pub employee_id: Option<String>,
    /// Department
    #[serde(default)]
    pub department: Option<String>,
    /// Designation
    #[serde(default)]
    pub designation: Option<String>,
    /// Staff or superuser
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Deserialize)]
struct LoginReply {
    access: String,
    refresh: String,
    #[serde(flatten)]
    profile: UserProfile,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// New account details
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    /// Login name
    pub username: String,
    /// Password
    pub password: String,
    /// Employee identifier
    pub employee_id: String,
    /// Contact email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Registration acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    /// Server message
    #[serde(default)]
    pub message: Option<String>,
    /// Created account
    #[serde(default)]
    pub user: Option<RegisteredUser>,
}

/// Account created by registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredUser {
    /// Server-side user id
    pub id: u64,
    /// Login name
    pub username: String,
    /// Employee identifier
    #[serde(default)]
    pub employee_id: Option<String>,
}

/// Session lifecycle endpoints
#[derive(Debug, Clone)]
pub struct AuthApi {
    gateway: Arc<AuthenticatedGateway>,
}

impl AuthApi {
    /// Create API
    #[inline]
    #[must_use]
    pub fn new(gateway: Arc<AuthenticatedGateway>) -> Self {
        Self { gateway }
    }

    /// Sign in and store the resulting session.
    ///
    /// # Errors
    /// `ClientError::Server` for rejected credentials, `Network`/`Decode` otherwise
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ClientError> {
        let request = ApiRequest::post_json(endpoints::LOGIN, &Credentials { username, password })?
            .with_auth(AuthMode::Anonymous);
        let reply: LoginReply = self.gateway.execute_json(&request).await?;

        self.gateway
            .store()
            .set(Session::new(reply.access, reply.refresh));
        tracing::info!("Signed in as {}", reply.profile.username);

        Ok(reply.profile)
    }

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    /// `ClientError::Server` if the server refuses the registration
    pub async fn register(&self, details: &RegisterRequest) -> Result<Registration, ClientError> {
        let request =
            ApiRequest::post_json(endpoints::REGISTER, details)?.with_auth(AuthMode::Anonymous);
        self.gateway.execute_json(&request).await
    }

    /// Drop the session locally
    pub fn logout(&self) {
        self.gateway.store().clear();
        tracing::info!("Signed out");
    }
}
