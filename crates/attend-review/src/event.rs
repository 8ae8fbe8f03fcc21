//! Live stream events
//!
//! Frames are JSON objects tagged by `event`:
//! - `attendance.pending` with a `payload` item
//! - `attendance.updated` with a top-level `employee_id`
//! - `anomaly.created` with a `payload` alert

use crate::model::{AnomalyAlert, EmployeeId, PendingVerificationItem};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Event tag for new pending verifications
pub const PENDING_CREATED: &str = "attendance.pending";
/// Event tag for decided attendance records
pub const ATTENDANCE_UPDATED: &str = "attendance.updated";
/// Event tag for new anomalies
pub const ANOMALY_CREATED: &str = "anomaly.created";

/// A decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// New or replaced pending verification
    PendingCreated(PendingVerificationItem),
    /// The employee's pending record was decided
    AttendanceUpdated(EmployeeId),
    /// New anomaly
    AnomalyCreated(AnomalyAlert),
}

impl StreamEvent {
    /// Decode one text frame.
    ///
    /// # Errors
    /// `MalformedEvent` for invalid JSON, an unknown tag or a missing field
    pub fn decode(frame: &str) -> Result<Self, MalformedEvent> {
        let mut value: JsonValue =
            serde_json::from_str(frame).map_err(|e| MalformedEvent::InvalidJson(e.to_string()))?;

        let tag = value
            .get("event")
            .and_then(JsonValue::as_str)
            .ok_or(MalformedEvent::MissingField {
                event: None,
                field: "event",
            })?
            .to_string();

        match tag.as_str() {
            PENDING_CREATED => payload(&tag, &mut value).map(Self::PendingCreated),
            ANOMALY_CREATED => payload(&tag, &mut value).map(Self::AnomalyCreated),
            ATTENDANCE_UPDATED => {
                // Some emitters nest the id inside `payload`
                let id = value
                    .get("employee_id")
                    .or_else(|| value.get("payload").and_then(|p| p.get("employee_id")))
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| MalformedEvent::MissingField {
                        event: Some(tag.clone()),
                        field: "employee_id",
                    })?;
                Ok(Self::AttendanceUpdated(EmployeeId::new(id)))
            }
            _ => Err(MalformedEvent::UnknownEvent(tag)),
        }
    }

    /// Event tag on the wire
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PendingCreated(_) => PENDING_CREATED,
            Self::AttendanceUpdated(_) => ATTENDANCE_UPDATED,
            Self::AnomalyCreated(_) => ANOMALY_CREATED,
        }
    }
}

fn payload<T: DeserializeOwned>(tag: &str, value: &mut JsonValue) -> Result<T, MalformedEvent> {
    let body = value
        .get_mut("payload")
        .map(JsonValue::take)
        .ok_or_else(|| MalformedEvent::MissingField {
            event: Some(tag.to_string()),
            field: "payload",
        })?;

    serde_json::from_value(body).map_err(|e| MalformedEvent::InvalidPayload {
        event: tag.to_string(),
        reason: e.to_string(),
    })
}

/// A frame that could not be turned into a [`StreamEvent`].
///
/// Dropped and counted, never surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEvent {
    /// Frame is not JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Tag not recognised
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Required field absent
    #[error("missing field `{field}`{}", .event.as_deref().map(|e| format!(" in {e}")).unwrap_or_default())]
    MissingField {
        /// Tag, if it could be read
        event: Option<String>,
        /// Field name
        field: &'static str,
    },

    /// Payload present but wrongly shaped
    #[error("invalid {event} payload: {reason}")]
    InvalidPayload {
        /// Tag
        event: String,
        /// Decoder message
        reason: String,
    },
}
