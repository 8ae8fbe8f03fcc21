//! Read side of the review queue
//!
//! A [`ReviewView`] is an immutable value published by the reconciler after
//! every change. Collections are persistent (`im`), so publishing a new
//! revision shares structure with the previous one.

use crate::model::{AnomalyAlert, AnomalyId, EmployeeId, PendingVerificationItem};
use chrono::NaiveDate;
use std::cmp::Reverse;

/// Whether the snapshot has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Snapshot requested, events are being buffered
    Loading,
    /// Snapshot applied, events apply live
    Ready,
    /// Snapshot fetch failed; the view is empty
    Failed(String),
    /// Session closed
    Closed,
}

/// Live stream connectivity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// Opening the connection
    Connecting,
    /// Connected
    Live,
    /// Connection lost or refused
    Disconnected(String),
}

/// Consistent snapshot of pending verifications and anomalies
#[derive(Debug, Clone)]
pub struct ReviewView {
    revision: u64,
    load: LoadState,
    stream: StreamState,
    pending: im::HashMap<EmployeeId, PendingVerificationItem>,
    anomalies: im::Vector<AnomalyAlert>,
    anomaly_ids: im::HashSet<AnomalyId>,
    dropped_events: u64,
    buffered_events: usize,
}

impl Default for ReviewView {
    fn default() -> Self {
        Self {
            revision: 0,
            load: LoadState::Loading,
            stream: StreamState::Connecting,
            pending: im::HashMap::new(),
            anomalies: im::Vector::new(),
            anomaly_ids: im::HashSet::new(),
            dropped_events: 0,
            buffered_events: 0,
        }
    }
}

impl ReviewView {
    /// Empty view, loading
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic change counter
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Snapshot state
    #[inline]
    #[must_use]
    pub fn load(&self) -> &LoadState {
        &self.load
    }

    /// Stream state
    #[inline]
    #[must_use]
    pub fn stream(&self) -> &StreamState {
        &self.stream
    }

    /// Snapshot applied and live
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.load == LoadState::Ready
    }

    /// Frames dropped as malformed since the session opened
    #[inline]
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Events held back until the snapshot arrives
    #[inline]
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.buffered_events
    }

    /// Number of pending verifications
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending verification for `employee_id`
    #[must_use]
    pub fn pending_item(&self, employee_id: &EmployeeId) -> Option<&PendingVerificationItem> {
        self.pending.get(employee_id)
    }

    /// Whether `employee_id` has a pending verification
    #[must_use]
    pub fn contains_pending(&self, employee_id: &EmployeeId) -> bool {
        self.pending.contains_key(employee_id)
    }

    /// Pending verifications, newest check-in first
    #[must_use]
    pub fn pending_items(&self) -> Vec<&PendingVerificationItem> {
        self.filtered_pending(&PendingFilter::default())
    }

    /// Pending verifications matching `filter`, newest check-in first
    #[must_use]
    pub fn filtered_pending(&self, filter: &PendingFilter) -> Vec<&PendingVerificationItem> {
        let mut items: Vec<_> = self.pending.values().filter(|i| filter.matches(i)).collect();
        items.sort_by(|a, b| {
            Reverse(a.check_in_time)
                .cmp(&Reverse(b.check_in_time))
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        items
    }

    /// Anomalies, newest first
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyAlert> {
        self.anomalies.iter()
    }

    /// Number of anomalies
    #[inline]
    #[must_use]
    pub fn anomaly_len(&self) -> usize {
        self.anomalies.len()
    }

    /// Whether an anomaly with `id` is shown
    #[must_use]
    pub fn contains_anomaly(&self, id: &AnomalyId) -> bool {
        self.anomaly_ids.contains(id)
    }

    pub(crate) fn bump(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn set_load(&mut self, load: LoadState) {
        self.load = load;
    }

    pub(crate) fn set_stream(&mut self, stream: StreamState) {
        self.stream = stream;
    }

    pub(crate) fn count_dropped(&mut self) {
        self.dropped_events += 1;
    }

    pub(crate) fn set_buffered(&mut self, buffered: usize) {
        self.buffered_events = buffered;
    }

    pub(crate) fn clear_entries(&mut self) {
        self.pending = im::HashMap::new();
        self.anomalies = im::Vector::new();
        self.anomaly_ids = im::HashSet::new();
    }

    /// Insert or overwrite by employee id
    pub(crate) fn upsert_pending(&mut self, item: PendingVerificationItem) {
        self.pending.insert(item.employee_id.clone(), item);
    }

    /// Keep whichever of the existing and new entry checked in later
    pub(crate) fn merge_pending(&mut self, item: PendingVerificationItem) {
        let newer = self
            .pending
            .get(&item.employee_id)
            .map_or(true, |existing| item.check_in_time > existing.check_in_time);
        if newer {
            self.upsert_pending(item);
        }
    }

    pub(crate) fn remove_pending(&mut self, employee_id: &EmployeeId) -> bool {
        self.pending.remove(employee_id).is_some()
    }

    /// Insert at the head unless already present; trims the tail beyond `cap`
    pub(crate) fn push_anomaly(&mut self, alert: AnomalyAlert, cap: Option<usize>) -> bool {
        if self.anomaly_ids.contains(&alert.id) {
            return false;
        }
        self.anomaly_ids.insert(alert.id.clone());
        self.anomalies.push_front(alert);
        self.enforce_cap(cap);
        true
    }

    /// Append at the tail unless already present (snapshot order is newest first)
    pub(crate) fn append_anomaly(&mut self, alert: AnomalyAlert, cap: Option<usize>) {
        if cap.is_some_and(|cap| self.anomalies.len() >= cap) || self.anomaly_ids.contains(&alert.id) {
            return;
        }
        self.anomaly_ids.insert(alert.id.clone());
        self.anomalies.push_back(alert);
    }

    fn enforce_cap(&mut self, cap: Option<usize>) {
        let Some(cap) = cap else { return };
        while self.anomalies.len() > cap {
            if let Some(evicted) = self.anomalies.pop_back() {
                self.anomaly_ids.remove(&evicted.id);
            }
        }
    }
}

/// Read-side filter over pending verifications
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingFilter {
    employee: Option<String>,
    min_confidence: Option<f64>,
    date: Option<NaiveDate>,
}

impl PendingFilter {
    /// Match everything
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring of employee id or name
    #[inline]
    #[must_use]
    pub fn with_employee(mut self, needle: impl Into<String>) -> Self {
        self.employee = Some(needle.into().to_lowercase());
        self
    }

    /// Minimum confidence, inclusive
    #[inline]
    #[must_use]
    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    /// Check-in on this UTC calendar date.
    ///
    /// Timestamps carrying another offset are normalized first, so a check-in
    /// at `2024-03-01T23:30:00-05:00` falls on 2024-03-02, not on the date
    /// written in the server's timestamp text.
    #[inline]
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Whether `item` passes every set criterion
    #[must_use]
    pub fn matches(&self, item: &PendingVerificationItem) -> bool {
        if let Some(needle) = &self.employee {
            let hit = item.employee_id.as_str().to_lowercase().contains(needle)
                || item.employee_name.to_lowercase().contains(needle);
            if !hit {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if item.confidence_score < min {
                return false;
            }
        }
        if let Some(date) = self.date {
            if item.check_in_date() != Some(date) {
                return false;
            }
        }
        true
    }
}
