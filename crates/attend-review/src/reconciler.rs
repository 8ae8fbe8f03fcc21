//! Snapshot + live stream reconciliation
//!
//! [`Reconciler`] is a plain state machine with no I/O:
//! - `AwaitingSnapshot`: events are buffered in arrival order
//! - `Live`: events apply immediately
//! - `Failed`: snapshot fetch failed, events are discarded
//! - `Closed`: session torn down, everything is ignored
//!
//! Every reconnection calls [`Reconciler::begin_sync`] and runs the
//! snapshot-then-replay protocol again.

use crate::config::ReviewConfig;
use crate::event::StreamEvent;
use crate::model::EmployeeId;
use crate::snapshot::Snapshot;
use crate::view::{LoadState, ReviewView, StreamState};

/// Held back until the snapshot lands, replayed in arrival order
#[derive(Debug)]
enum Buffered {
    Event(StreamEvent),
    /// Dispatcher removals
    Confirmed(Vec<EmployeeId>),
}

#[derive(Debug)]
enum Phase {
    AwaitingSnapshot {
        buffer: Vec<Buffered>,
        /// Buffered stream events, confirmations excluded
        events: usize,
    },
    Live,
    Failed,
    Closed,
}

impl Phase {
    fn awaiting() -> Self {
        Self::AwaitingSnapshot {
            buffer: Vec::new(),
            events: 0,
        }
    }
}

/// Sole writer of the review view
#[derive(Debug)]
pub struct Reconciler {
    phase: Phase,
    view: ReviewView,
    anomaly_cap: Option<usize>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(&ReviewConfig::default())
    }
}

impl Reconciler {
    /// Empty view awaiting its first snapshot
    #[must_use]
    pub fn new(config: &ReviewConfig) -> Self {
        Self {
            phase: Phase::awaiting(),
            view: ReviewView::new(),
            anomaly_cap: config.anomaly_cap,
        }
    }

    /// Current view
    #[inline]
    #[must_use]
    pub fn view(&self) -> &ReviewView {
        &self.view
    }

    /// Snapshot applied and events apply directly
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Live)
    }

    /// Session closed
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.phase, Phase::Closed)
    }

    /// Events held back until the snapshot arrives
    #[must_use]
    pub fn buffered(&self) -> usize {
        match &self.phase {
            Phase::AwaitingSnapshot { events, .. } => *events,
            _ => 0,
        }
    }

    /// Start over: discard any buffer and wait for a fresh snapshot.
    ///
    /// Entries stay visible until the new snapshot replaces them.
    pub fn begin_sync(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = Phase::awaiting();
        self.view.set_buffered(0);
        self.view.set_load(LoadState::Loading);
        self.view.bump();
    }

    /// Decode and apply one text frame; malformed frames are counted and dropped.
    pub fn ingest_frame(&mut self, frame: &str) {
        if self.is_closed() {
            return;
        }
        match StreamEvent::decode(frame) {
            Ok(event) => self.apply_event(event),
            Err(e) => {
                tracing::warn!("Dropping malformed stream event: {}", e);
                self.view.count_dropped();
                self.view.bump();
            }
        }
    }

    /// Buffer or apply `event` depending on phase
    pub fn apply_event(&mut self, event: StreamEvent) {
        match &mut self.phase {
            Phase::AwaitingSnapshot { buffer, events } => {
                tracing::trace!("Buffering {} until snapshot", event.tag());
                buffer.push(Buffered::Event(event));
                *events += 1;
                let buffered = *events;
                self.view.set_buffered(buffered);
                self.view.bump();
            }
            Phase::Live => {
                self.apply_live(event);
                self.view.bump();
            }
            Phase::Failed => {
                tracing::debug!("Discarding {}: snapshot unavailable", event.tag());
            }
            Phase::Closed => {}
        }
    }

    /// Initialize the view from `snapshot`, then replay buffered events and
    /// confirmations in the order they arrived.
    ///
    /// Ignored unless a snapshot is awaited.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if !matches!(self.phase, Phase::AwaitingSnapshot { .. }) {
            tracing::debug!("Ignoring unexpected snapshot");
            return;
        }
        let Phase::AwaitingSnapshot { buffer, events } =
            std::mem::replace(&mut self.phase, Phase::Live)
        else {
            return;
        };

        self.view.clear_entries();
        for item in snapshot.pending {
            self.view.merge_pending(item);
        }
        for alert in snapshot.anomalies {
            self.view.append_anomaly(alert, self.anomaly_cap);
        }

        for entry in buffer {
            match entry {
                Buffered::Event(event) => self.apply_live(event),
                Buffered::Confirmed(ids) => {
                    for id in &ids {
                        self.view.remove_pending(id);
                    }
                }
            }
        }

        self.view.set_buffered(0);
        self.view.set_load(LoadState::Ready);
        self.view.bump();
        tracing::info!(
            "Review view ready: {} pending, {} anomalies ({} buffered events replayed)",
            self.view.pending_len(),
            self.view.anomaly_len(),
            events
        );
    }

    /// Snapshot fetch failed: empty view with the error recorded
    pub fn snapshot_failed(&mut self, reason: impl Into<String>) {
        if !matches!(self.phase, Phase::AwaitingSnapshot { .. }) {
            return;
        }
        let reason = reason.into();
        tracing::warn!("Review snapshot failed: {}", reason);

        self.phase = Phase::Failed;
        self.view.set_buffered(0);
        self.view.clear_entries();
        self.view.set_load(LoadState::Failed(reason));
        self.view.bump();
    }

    /// Remove entries the server confirmed as decided.
    ///
    /// While a snapshot is awaited the removal is also queued behind the
    /// events buffered so far, so replay cannot bring the entry back.
    pub fn confirm_removed(&mut self, ids: &[EmployeeId]) {
        match &mut self.phase {
            Phase::Closed => return,
            Phase::AwaitingSnapshot { buffer, .. } => buffer.push(Buffered::Confirmed(ids.to_vec())),
            Phase::Live | Phase::Failed => {}
        }
        for id in ids {
            self.view.remove_pending(id);
        }
        self.view.bump();
    }

    /// Record stream connectivity
    pub fn set_stream(&mut self, state: StreamState) {
        if self.is_closed() || *self.view.stream() == state {
            return;
        }
        self.view.set_stream(state);
        self.view.bump();
    }

    /// Tear down: drop buffered events and ignore everything after
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = Phase::Closed;
        self.view.set_buffered(0);
        self.view.set_load(LoadState::Closed);
        self.view.set_stream(StreamState::Disconnected("closed".to_string()));
        self.view.bump();
    }

    fn apply_live(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::PendingCreated(item) => self.view.upsert_pending(item),
            StreamEvent::AttendanceUpdated(id) => {
                if !self.view.remove_pending(&id) {
                    tracing::trace!("No pending entry for {}", id);
                }
            }
            StreamEvent::AnomalyCreated(alert) => {
                self.view.push_anomaly(alert, self.anomaly_cap);
            }
        }
    }
}
