//! HTTP transport seam
//!
//! The gateway only knows [`HttpTransport`]; [`ReqwestTransport`] is the
//! production implementation.

use crate::config::{ApiConfig, ConfigError};
use crate::request::{ApiRequest, ApiResponse, Method};
use async_trait::async_trait;
use attend_session::ClientError;
use reqwest::Url;

/// Sends one request and returns whatever the server answered
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute `request`, attaching `bearer` as the authorization credential
    ///
    /// Any HTTP status is a successful transport outcome; only failures to
    /// exchange a request/response are errors.
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ClientError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: Url,
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create transport from configuration
    ///
    /// # Errors
    /// `ConfigError` if the base URL is invalid or the client cannot be built
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url()?,
            http,
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing)
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Base URL requests are resolved against
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.base_url.join(request.path()).map_err(|e| {
            ClientError::Network(format!("invalid request path {:?}: {}", request.path(), e))
        })?;

        let mut builder = match request.method() {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        tracing::debug!("{} {}", request.method(), request.path());
        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;
        tracing::debug!("{} {} -> {}", request.method(), request.path(), status);

        Ok(ApiResponse::new(status, body))
    }
}

fn network_error(e: reqwest::Error) -> ClientError {
    ClientError::Network(e.to_string())
}
