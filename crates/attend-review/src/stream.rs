//! Live event stream
//!
//! [`StreamConnector`] opens one authenticated connection and yields text
//! frames until it ends. [`WsConnector`] is the WebSocket implementation:
//! - Access token passed as `?token=`
//! - Connect timeout
//! - Ping heartbeat; no traffic within one interval after a ping ends the stream

use crate::config::StreamConfig;
use async_trait::async_trait;
use attend_session::ClientError;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// Frames from one connection. An `Err` item ends the connection; so does the
/// end of the stream (server closed).
pub type FrameStream = BoxStream<'static, Result<String, ClientError>>;

/// Opens authenticated live connections
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Connect using `access_token`.
    ///
    /// # Errors
    /// `ClientError::Network` if the connection cannot be opened,
    /// `ClientError::Server` if the handshake is refused
    async fn connect(&self, access_token: &str) -> Result<FrameStream, ClientError>;
}

const FRAME_BUFFER: usize = 64;

/// WebSocket connector
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: StreamConfig,
}

impl WsConnector {
    /// Create connector
    #[inline]
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Connection settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Endpoint URL carrying `access_token`
    ///
    /// # Errors
    /// `ClientError::Network` if the configured URL is not a `ws`/`wss` URL
    pub fn endpoint(&self, access_token: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| ClientError::Network(format!("invalid stream url {}: {}", self.config.url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::Network(format!(
                "stream url must use ws or wss, got {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("token", access_token);
        Ok(url)
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, access_token: &str) -> Result<FrameStream, ClientError> {
        let url = self.endpoint(access_token)?;
        let connect_timeout = self.config.connect_timeout();

        let (socket, _response) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ClientError::Network(format!(
                    "stream connect timed out after {}s",
                    connect_timeout.as_secs()
                ))
            })?
            .map_err(handshake_error)?;

        tracing::debug!("WebSocket open to {}", self.config.url);

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        tokio::spawn(pump(socket, tx, self.config.heartbeat()));

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

fn handshake_error(error: tungstenite::Error) -> ClientError {
    match error {
        tungstenite::Error::Http(response) => ClientError::Server {
            status: response.status().as_u16(),
            body: response
                .body()
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
        },
        other => ClientError::Network(other.to_string()),
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Forward text frames to `tx` and keep the connection alive until either side goes away
async fn pump(socket: Socket, tx: mpsc::Sender<Result<String, ClientError>>, heartbeat: Duration) {
    let (mut sink, mut source) = socket.split();
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            message = source.next() => {
                awaiting_pong = false;
                let frame = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::debug!("Ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(reason))) => {
                        tracing::info!("Stream closed by server: {:?}", reason);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(ClientError::Network(e.to_string()))).await;
                        break;
                    }
                    None => break,
                };
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if awaiting_pong {
                    let _ = tx
                        .send(Err(ClientError::Network(format!(
                            "no heartbeat reply within {}s",
                            heartbeat.as_secs()
                        ))))
                        .await;
                    break;
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    let _ = tx.send(Err(ClientError::Network(e.to_string()))).await;
                    break;
                }
                awaiting_pong = true;
            }
            () = tx.closed() => break,
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_token() {
        let connector = WsConnector::new(StreamConfig::new().with_url("ws://localhost:8000/ws/admin/"));
        let url = connector.endpoint("abc.def.ghi").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/admin/?token=abc.def.ghi");
    }

    #[test]
    fn endpoint_keeps_existing_query() {
        let connector = WsConnector::new(StreamConfig::new().with_url("wss://example.com/ws/?v=2"));
        let url = connector.endpoint("t").unwrap();
        assert_eq!(url.query(), Some("v=2&token=t"));
    }

    #[test]
    fn endpoint_rejects_http_url() {
        let connector = WsConnector::new(StreamConfig::new().with_url("http://example.com/ws/"));
        assert!(matches!(connector.endpoint("t"), Err(ClientError::Network(_))));
    }

    #[tokio::test]
    async fn connect_refused_is_network_error() {
        let connector = WsConnector::new(
            StreamConfig::new()
                .with_url("ws://127.0.0.1:9/ws/")
                .with_connect_timeout_secs(2),
        );
        let result = connector.connect("t").await;
        assert!(matches!(result, Err(ClientError::Network(_))));
    }
}
