//! Review session: the running snapshot + stream synchronization
//!
//! Two tasks per session:
//! - the reconciler task owns the [`Reconciler`] and applies inputs in order,
//!   publishing each new [`ReviewView`] through a `watch` channel
//! - the supervisor task runs one connection generation at a time (snapshot
//!   fetch concurrently with the live stream) and reconnects with backoff
//!
//! Every input carries the generation it belongs to; the reconciler drops
//! inputs from superseded generations.

use crate::config::{ReconnectPolicy, ReviewConfig};
use crate::dispatcher::ActionDispatcher;
use crate::model::EmployeeId;
use crate::reconciler::Reconciler;
use crate::snapshot::Snapshot;
use crate::stream::StreamConnector;
use crate::view::{ReviewView, StreamState};
use attend_gateway::AuthenticatedGateway;
use attend_session::ClientError;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;

const INPUT_BUFFER: usize = 256;

/// Messages to the reconciler task
#[derive(Debug)]
pub(crate) enum Input {
    /// A new connection generation starts
    Resync { generation: u64 },
    /// Raw text frame from the stream
    Frame { generation: u64, frame: String },
    /// Snapshot fetch finished
    Snapshot {
        generation: u64,
        result: Result<Snapshot, ClientError>,
    },
    /// Stream connectivity changed
    Stream { generation: u64, state: StreamState },
    /// Server confirmed decisions; applies regardless of generation
    Confirmed {
        ids: Vec<EmployeeId>,
        ack: Option<oneshot::Sender<()>>,
    },
    /// Tear down
    Close,
}

/// Owns the reconciler; single writer of the view
async fn reconcile_task(
    mut reconciler: Reconciler,
    mut inputs: mpsc::Receiver<Input>,
    views: watch::Sender<ReviewView>,
) {
    let mut current = 0;

    while let Some(input) = inputs.recv().await {
        match input {
            Input::Resync { generation } => {
                current = generation;
                reconciler.begin_sync();
            }
            Input::Frame { generation, frame } if generation == current => {
                reconciler.ingest_frame(&frame);
            }
            Input::Snapshot { generation, result } if generation == current => match result {
                Ok(snapshot) => reconciler.apply_snapshot(snapshot),
                Err(e) => reconciler.snapshot_failed(e.to_string()),
            },
            Input::Stream { generation, state } if generation == current => {
                reconciler.set_stream(state);
            }
            Input::Confirmed { ids, ack } => {
                reconciler.confirm_removed(&ids);
                publish(&views, &reconciler);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                continue;
            }
            Input::Close => {
                reconciler.close();
                publish(&views, &reconciler);
                break;
            }
            stale => {
                tracing::trace!("Discarding input from superseded connection: {:?}", stale);
                continue;
            }
        }
        publish(&views, &reconciler);
    }
}

fn publish(views: &watch::Sender<ReviewView>, reconciler: &Reconciler) {
    let revision = reconciler.view().revision();
    if views.borrow().revision() != revision {
        views.send_replace(reconciler.view().clone());
    }
}

/// How a connection generation ended
#[derive(Debug, PartialEq, Eq)]
enum GenerationEnd {
    /// Connection lost or refused; reconnect per policy
    Dropped { reason: String, delivered: bool },
    /// Credentials gone; wait for a manual resync
    Terminal(String),
    /// Manual resync requested
    Resync,
    /// Reconciler task gone
    Closed,
}

struct Supervisor {
    gateway: Arc<AuthenticatedGateway>,
    connector: Arc<dyn StreamConnector>,
    inputs: mpsc::Sender<Input>,
    reconnect: ReconnectPolicy,
    resync: Arc<Notify>,
}

impl Supervisor {
    async fn run(self) {
        let mut backoff = self.reconnect.backoff();
        let mut generation = 0u64;

        loop {
            generation += 1;
            if self.inputs.send(Input::Resync { generation }).await.is_err() {
                return;
            }

            let reason = match self.run_generation(generation).await {
                GenerationEnd::Closed => return,
                GenerationEnd::Resync => {
                    tracing::info!("Resynchronizing review view");
                    backoff.reset();
                    continue;
                }
                GenerationEnd::Terminal(reason) => {
                    tracing::error!("Review stream stopped: {}", reason);
                    if !self.report_down(generation, reason).await {
                        return;
                    }
                    self.resync.notified().await;
                    backoff.reset();
                    continue;
                }
                GenerationEnd::Dropped { reason, delivered } => {
                    if delivered {
                        backoff.reset();
                    }
                    reason
                }
            };

            tracing::warn!("Review stream disconnected: {}", reason);
            if !self.report_down(generation, reason).await {
                return;
            }

            match backoff.next_delay() {
                Some(delay) => {
                    tracing::info!("Reconnecting review stream in {:?}", delay);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.resync.notified() => backoff.reset(),
                    }
                }
                None => {
                    tracing::warn!(
                        "Not reconnecting review stream after {} attempts",
                        backoff.attempts()
                    );
                    self.resync.notified().await;
                    backoff.reset();
                }
            }
        }
    }

    /// Snapshot fetch and live stream, concurrently, until the stream ends
    async fn run_generation(&self, generation: u64) -> GenerationEnd {
        if self
            .inputs
            .send(Input::Stream {
                generation,
                state: StreamState::Connecting,
            })
            .await
            .is_err()
        {
            return GenerationEnd::Closed;
        }

        let snapshot = async {
            let result = Snapshot::fetch(&self.gateway).await;
            let _ = self.inputs.send(Input::Snapshot { generation, result }).await;
        };
        let stream = self.stream(generation);
        tokio::pin!(snapshot, stream);

        let mut snapshot_done = false;
        let end = loop {
            tokio::select! {
                () = &mut snapshot, if !snapshot_done => snapshot_done = true,
                end = &mut stream => break end,
                () = self.resync.notified() => return GenerationEnd::Resync,
            }
        };

        // An in-flight snapshot still lands in this generation
        if !snapshot_done && end != GenerationEnd::Closed {
            snapshot.await;
        }
        end
    }

    async fn stream(&self, generation: u64) -> GenerationEnd {
        let token = match self.gateway.fresh_access_token().await {
            Ok(token) => token,
            Err(e) if e.requires_reauthentication() => return GenerationEnd::Terminal(e.to_string()),
            Err(e) => {
                return GenerationEnd::Dropped {
                    reason: e.to_string(),
                    delivered: false,
                }
            }
        };

        let mut frames = match self.connector.connect(&token).await {
            Ok(frames) => frames,
            Err(e) => {
                return GenerationEnd::Dropped {
                    reason: e.to_string(),
                    delivered: false,
                }
            }
        };

        tracing::info!("Review stream connected (generation {})", generation);
        let live = Input::Stream {
            generation,
            state: StreamState::Live,
        };
        if self.inputs.send(live).await.is_err() {
            return GenerationEnd::Closed;
        }

        let mut delivered = false;
        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => {
                    delivered = true;
                    if self.inputs.send(Input::Frame { generation, frame }).await.is_err() {
                        return GenerationEnd::Closed;
                    }
                }
                Err(e) => {
                    return GenerationEnd::Dropped {
                        reason: e.to_string(),
                        delivered,
                    }
                }
            }
        }

        GenerationEnd::Dropped {
            reason: "closed by server".to_string(),
            delivered,
        }
    }

    async fn report_down(&self, generation: u64, reason: String) -> bool {
        self.inputs
            .send(Input::Stream {
                generation,
                state: StreamState::Disconnected(reason),
            })
            .await
            .is_ok()
    }
}

/// An open administrator review screen.
///
/// Dropping the session aborts both tasks; [`close`](Self::close) also
/// publishes a final `Closed` view.
#[derive(Debug)]
pub struct ReviewSession {
    gateway: Arc<AuthenticatedGateway>,
    inputs: mpsc::Sender<Input>,
    views: watch::Receiver<ReviewView>,
    resync: Arc<Notify>,
    supervisor: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

impl ReviewSession {
    /// Start synchronizing. Must be called within a tokio runtime.
    #[must_use]
    pub fn open(
        gateway: Arc<AuthenticatedGateway>,
        connector: Arc<dyn StreamConnector>,
        config: &ReviewConfig,
        reconnect: ReconnectPolicy,
    ) -> Self {
        let (inputs, rx) = mpsc::channel(INPUT_BUFFER);
        let reconciler = Reconciler::new(config);
        let (views_tx, views) = watch::channel(reconciler.view().clone());
        let resync = Arc::new(Notify::new());

        let reconciler = tokio::spawn(reconcile_task(reconciler, rx, views_tx));
        let supervisor = tokio::spawn(
            Supervisor {
                gateway: gateway.clone(),
                connector,
                inputs: inputs.clone(),
                reconnect,
                resync: resync.clone(),
            }
            .run(),
        );

        tracing::info!("Review session opened");
        Self {
            gateway,
            inputs,
            views,
            resync,
            supervisor,
            reconciler,
        }
    }

    /// Latest published view
    #[must_use]
    pub fn view(&self) -> ReviewView {
        self.views.borrow().clone()
    }

    /// Receiver notified on every new view
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReviewView> {
        self.views.clone()
    }

    /// Wait until a published view satisfies `predicate`.
    ///
    /// Returns `None` if the session ended first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ReviewView) -> bool,
    ) -> Option<ReviewView> {
        let mut views = self.views.clone();
        let matched = views.wait_for(|view| predicate(view)).await.ok()?;
        Some(matched.clone())
    }

    /// Dispatcher whose confirmations update this session's view
    #[must_use]
    pub fn dispatcher(&self) -> ActionDispatcher {
        ActionDispatcher::new(self.gateway.clone(), self.inputs.clone())
    }

    /// Drop the current connection and run snapshot-then-replay again
    pub fn resync(&self) {
        self.resync.notify_one();
    }

    /// Tear down: stop the stream, discard buffered events, publish `Closed`.
    pub async fn close(mut self) {
        self.supervisor.abort();
        if self.inputs.send(Input::Close).await.is_ok() {
            let _ = (&mut self.reconciler).await;
        }
        tracing::info!("Review session closed");
    }
}

impl Drop for ReviewSession {
    fn drop(&mut self) {
        self.supervisor.abort();
        self.reconciler.abort();
    }
}
