//! Token renewal over HTTP

use crate::endpoints;
use crate::request::{ApiRequest, AuthMode};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use attend_session::{ClientError, RenewedAccess, TokenRenewer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshReply {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Calls `auth/token/refresh/` directly on the transport.
///
/// Bypasses the gateway on purpose: a 401 here must end the session, not
/// trigger another renewal.
pub struct HttpTokenRenewer {
    transport: Arc<dyn HttpTransport>,
}

impl HttpTokenRenewer {
    /// Create renewer
    #[inline]
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenRenewer for HttpTokenRenewer {
    async fn renew(&self, refresh_token: &str) -> Result<RenewedAccess, ClientError> {
        let request = ApiRequest::post_json(
            endpoints::TOKEN_REFRESH,
            &RefreshBody {
                refresh: refresh_token,
            },
        )?
        .with_auth(AuthMode::Anonymous);

        let reply: RefreshReply = self
            .transport
            .execute(&request, None)
            .await?
            .into_success()?
            .json()?;

        let renewed = RenewedAccess::new(reply.access);
        Ok(match reply.refresh {
            Some(rotated) => renewed.with_refresh_token(rotated),
            None => renewed,
        })
    }
}
