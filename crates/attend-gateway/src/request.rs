//! Immutable request and response values passed through the gateway

use attend_session::ClientError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// How the gateway treats a missing session for this request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Fail fast with `Unauthenticated` when there is no session
    #[default]
    Required,
    /// Attach a credential if one exists, otherwise send unauthenticated
    Optional,
    /// Never attach a credential (login, registration, renewal)
    Anonymous,
}

/// An outbound API call, relative to the configured base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<JsonValue>,
    auth: AuthMode,
}

impl ApiRequest {
    /// GET `path`
    #[inline]
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            auth: AuthMode::Required,
        }
    }

    /// POST `path` with a JSON body
    #[inline]
    #[must_use]
    pub fn post(path: impl Into<String>, body: JsonValue) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            auth: AuthMode::Required,
        }
    }

    /// POST `path` with a serializable body
    ///
    /// # Errors
    /// `ClientError::Decode` if `body` cannot be represented as JSON
    pub fn post_json<B: Serialize + ?Sized>(
        path: impl Into<String>,
        body: &B,
    ) -> Result<Self, ClientError> {
        Ok(Self::post(path, serde_json::to_value(body)?))
    }

    /// With auth mode
    #[inline]
    #[must_use]
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    /// Method
    #[inline]
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the API base
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// JSON body
    #[inline]
    #[must_use]
    pub fn body(&self) -> Option<&JsonValue> {
        self.body.as_ref()
    }

    /// Auth mode
    #[inline]
    #[must_use]
    pub fn auth(&self) -> AuthMode {
        self.auth
    }
}

/// Raw response: status code and body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    status: u16,
    body: String,
}

impl ApiResponse {
    /// Create response
    #[inline]
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 with a JSON body
    #[must_use]
    pub fn ok_json(body: &JsonValue) -> Self {
        Self::new(200, body.to_string())
    }

    /// Status code
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Body text
    #[inline]
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// 2xx
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401
    #[inline]
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Turn a non-2xx response into `ClientError::Server`
    ///
    /// # Errors
    /// `ClientError::Server` carrying the status and body
    pub fn into_success(self) -> Result<Self, ClientError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Server {
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Decode the body. An empty body decodes as JSON `null`.
    ///
    /// # Errors
    /// `ClientError::Decode` if the body does not match `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let text = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(text).map_err(ClientError::from)
    }
}

/// Position of a send in the gateway's retry sequence.
///
/// A request is sent at most twice: once, and once more after renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// First send with the credential at hand
    Initial,
    /// The single resend after renewal
    Retry,
}

impl Attempt {
    /// Attempt that follows this one, if any
    #[inline]
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Attempt::Initial => Some(Attempt::Retry),
            Attempt::Retry => None,
        }
    }
}
