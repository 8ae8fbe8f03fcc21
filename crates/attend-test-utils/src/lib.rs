//! Testing utilities for the attend workspace
//!
//! Shared fakes and fixtures:
//! - [`ScriptedTransport`]: routed HTTP fake that records every call
//! - [`ScriptedConnector`]: live stream fake driven from the test
//! - JWT-shaped tokens, wire payloads and ready-made gateways

#![allow(missing_docs)]

use async_trait::async_trait;
use attend_gateway::{
    gateway_over, ApiRequest, ApiResponse, AuthenticatedGateway, HttpTokenRenewer, HttpTransport, Method,
};
use attend_review::{FrameStream, StreamConnector};
use attend_session::{ClientError, MemoryPersistence, RefreshCoordinator, Session, SessionStore};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Unsigned JWT-shaped token for `subject` expiring at unix time `exp`
pub fn jwt(subject: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({"sub": subject, "exp": exp}).to_string());
    format!("{header}.{payload}.test-signature")
}

/// Token valid for another hour
pub fn live_jwt(subject: &str) -> String {
    jwt(subject, (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp())
}

/// Token that expired a minute ago
pub fn expired_jwt(subject: &str) -> String {
    jwt(subject, (chrono::Utc::now() - chrono::Duration::minutes(1)).timestamp())
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// One request as the transport saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<JsonValue>,
}

pub type Handler = Arc<dyn Fn(&RecordedCall) -> Result<ApiResponse, ClientError> + Send + Sync>;

struct Route {
    handler: Handler,
    gate: Option<Arc<Semaphore>>,
}

/// HTTP fake answering from per-route handlers; unrouted calls get 404
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `method path` with `handler`
    pub fn on<F>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(&RecordedCall) -> Result<ApiResponse, ClientError> + Send + Sync + 'static,
    {
        self.routes.lock().insert(
            (method, path.to_string()),
            Route {
                handler: Arc::new(handler),
                gate: None,
            },
        );
    }

    /// Always answer with `status` and `body`
    pub fn on_json(&self, method: Method, path: &str, status: u16, body: JsonValue) {
        let text = body.to_string();
        self.on(method, path, move |_| Ok(ApiResponse::new(status, text.clone())));
    }

    /// 200 with `body` when the bearer is `accepted`, 401 otherwise
    pub fn on_bearer(&self, method: Method, path: &str, accepted: impl Into<String>, body: JsonValue) {
        let accepted = accepted.into();
        let text = body.to_string();
        self.on(method, path, move |call| {
            Ok(if call.bearer.as_deref() == Some(accepted.as_str()) {
                ApiResponse::new(200, text.clone())
            } else {
                ApiResponse::new(401, r#"{"detail":"token_not_valid"}"#)
            })
        });
    }

    /// Hold calls to `method path` until the test adds permits, one per call.
    ///
    /// The route must already exist.
    pub fn gate(&self, method: Method, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        if let Some(route) = self.routes.lock().get_mut(&(method, path.to_string())) {
            route.gate = Some(gate.clone());
        }
        gate
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, ClientError> {
        let call = RecordedCall {
            method: request.method(),
            path: request.path().to_string(),
            bearer: bearer.map(str::to_string),
            body: request.body().cloned(),
        };
        self.calls.lock().push(call.clone());

        let route = self
            .routes
            .lock()
            .get(&(call.method, call.path.clone()))
            .map(|r| (r.handler.clone(), r.gate.clone()));
        let Some((handler, gate)) = route else {
            return Ok(ApiResponse::new(404, "no route"));
        };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        handler(&call)
    }
}

/// Gateway over `transport` already holding a session
pub fn signed_in_gateway(transport: Arc<ScriptedTransport>, access: &str, refresh: &str) -> Arc<AuthenticatedGateway> {
    gateway_with_session(transport, Session::new(access, refresh))
}

/// Gateway holding `session` as if just logged in; an expired access token
/// is kept (startup restore would refuse it)
pub fn gateway_with_session(transport: Arc<ScriptedTransport>, session: Session) -> Arc<AuthenticatedGateway> {
    let store = Arc::new(SessionStore::new(Arc::new(MemoryPersistence::new())));
    store.set(session);
    let renewer = Arc::new(HttpTokenRenewer::new(transport.clone()));
    let coordinator = Arc::new(RefreshCoordinator::new(store, renewer));
    Arc::new(AuthenticatedGateway::new(transport, coordinator))
}

/// Gateway over `transport` without a session
pub fn signed_out_gateway(transport: Arc<ScriptedTransport>) -> Arc<AuthenticatedGateway> {
    gateway_over(transport, Arc::new(MemoryPersistence::new()))
}

// ---------------------------------------------------------------------------
// Live stream
// ---------------------------------------------------------------------------

/// Test side of one fake stream connection
#[derive(Debug)]
pub struct StreamHandle {
    pub token: String,
    frames: mpsc::UnboundedSender<Result<String, ClientError>>,
}

impl StreamHandle {
    /// Push a text frame; `false` once the client stopped listening
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.frames.send(Ok(frame.into())).is_ok()
    }

    /// End the connection with a transport error
    pub fn fail(self, reason: &str) {
        let _ = self.frames.send(Err(ClientError::Network(reason.to_string())));
    }

    /// Client still listening
    pub fn is_open(&self) -> bool {
        !self.frames.is_closed()
    }
}

/// Connections opened through a [`ScriptedConnector`], in order
pub struct StreamConnections {
    opened: mpsc::UnboundedReceiver<StreamHandle>,
}

impl StreamConnections {
    /// Next connection; panics after five seconds
    pub async fn next(&mut self) -> StreamHandle {
        tokio::time::timeout(Duration::from_secs(5), self.opened.recv())
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("no stream connection opened"))
    }
}

/// Live stream fake; each successful connect hands a [`StreamHandle`] to the test
pub struct ScriptedConnector {
    opened: mpsc::UnboundedSender<StreamHandle>,
    refusals: Mutex<VecDeque<ClientError>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, StreamConnections) {
        let (opened, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            opened,
            refusals: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
        });
        (connector, StreamConnections { opened: rx })
    }

    /// Fail the next connect with `error`
    pub fn refuse_next(&self, error: ClientError) {
        self.refusals.lock().push_back(error);
    }

    /// Connect calls so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, access_token: &str) -> Result<FrameStream, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.refusals.lock().pop_front() {
            return Err(error);
        }

        let (frames, rx) = mpsc::unbounded_channel();
        let _ = self.opened.send(StreamHandle {
            token: access_token.to_string(),
            frames,
        });

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

pub fn pending_json(employee_id: &str, confidence: f64) -> JsonValue {
    json!({
        "employee_id": employee_id,
        "employee_name": format!("Employee {employee_id}"),
        "check_in_time": "2024-03-01T09:00:00Z",
        "confidence_score": confidence,
        "image_url": format!("/media/checkins/{employee_id}.jpg"),
    })
}

pub fn anomaly_json(id: u64) -> JsonValue {
    json!({
        "id": id,
        "employee_name": "Employee E1",
        "type": "low_confidence",
        "severity": "medium",
    })
}

pub fn pending_event(employee_id: &str, confidence: f64) -> String {
    json!({"event": "attendance.pending", "payload": pending_json(employee_id, confidence)}).to_string()
}

pub fn updated_event(employee_id: &str) -> String {
    json!({"event": "attendance.updated", "employee_id": employee_id}).to_string()
}

pub fn anomaly_event(id: u64) -> String {
    json!({"event": "anomaly.created", "payload": anomaly_json(id)}).to_string()
}

// ---------------------------------------------------------------------------
// Async helpers
// ---------------------------------------------------------------------------

/// Poll `condition` until it holds; panics after five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
