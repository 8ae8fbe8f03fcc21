//! Plain-text rendering of review views

use attend_review::{AnomalyAlert, LoadState, PendingVerificationItem, ReviewView, StreamState};

/// One-line summary: load and stream state with counts
#[must_use]
pub fn status_line(view: &ReviewView) -> String {
    let load = match view.load() {
        LoadState::Loading => "loading".to_string(),
        LoadState::Ready => "ready".to_string(),
        LoadState::Failed(reason) => format!("failed ({reason})"),
        LoadState::Closed => "closed".to_string(),
    };
    let mut line = format!(
        "[{load}, {}] {} pending, {} anomalies",
        stream_label(view.stream()),
        view.pending_len(),
        view.anomaly_len()
    );
    if view.dropped_events() > 0 {
        line.push_str(&format!(", {} malformed events dropped", view.dropped_events()));
    }
    line
}

/// Pending entry as a table row
#[must_use]
pub fn pending_row(item: &PendingVerificationItem) -> String {
    let at = item
        .check_in_time
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
    format!(
        "{:<12} {:<24} {:>4.0}%  {}",
        item.employee_id.as_str(),
        item.employee_name,
        item.confidence_score * 100.0,
        at
    )
}

/// Anomaly as a table row
#[must_use]
pub fn anomaly_row(alert: &AnomalyAlert) -> String {
    format!(
        "#{:<6} {:<8} {:<20} {}",
        alert.id.as_str(),
        alert.severity.to_string(),
        alert.kind,
        alert.employee_name.as_deref().unwrap_or("-")
    )
}

/// What changed between two published views, one line per change
#[must_use]
pub fn changes(previous: &ReviewView, current: &ReviewView) -> Vec<String> {
    let mut lines = Vec::new();
    if previous.load() != current.load() || previous.stream() != current.stream() {
        lines.push(status_line(current));
    }

    for item in previous.pending_items() {
        if !current.contains_pending(&item.employee_id) {
            lines.push(format!("- {}", item.employee_id));
        }
    }
    for item in current.pending_items() {
        let changed = previous
            .pending_item(&item.employee_id)
            .map_or(true, |before| before != item);
        if changed {
            lines.push(format!("+ {}", pending_row(item)));
        }
    }
    for alert in current.anomalies() {
        if !previous.contains_anomaly(&alert.id) {
            lines.push(format!("! {}", anomaly_row(alert)));
        }
    }
    lines
}

fn stream_label(stream: &StreamState) -> String {
    match stream {
        StreamState::Connecting => "connecting".to_string(),
        StreamState::Live => "live".to_string(),
        StreamState::Disconnected(reason) => format!("disconnected: {reason}"),
    }
}
