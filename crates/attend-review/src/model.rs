//! Review queue entities
//!
//! - [`PendingVerificationItem`]: a check-in awaiting a human decision, keyed by [`EmployeeId`]
//! - [`AnomalyAlert`]: a flagged irregularity, keyed by [`AnomalyId`]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Employee identifier, the key of the pending view
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(String);

impl EmployeeId {
    /// Create from any string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmployeeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EmployeeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Anomaly identifier, the key of the anomaly view.
///
/// The server sends integers; strings are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AnomalyId(String);

impl AnomalyId {
    /// Create from any string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnomalyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AnomalyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self(n.to_string()),
            Raw::Text(s) => Self(s),
        })
    }
}

fn confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) })
}

/// A face-match check-in awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingVerificationItem {
    /// Unique key in the pending view
    pub employee_id: EmployeeId,
    /// Display name
    #[serde(default)]
    pub employee_name: String,
    /// When the check-in happened
    #[serde(default)]
    pub check_in_time: Option<DateTime<Utc>>,
    /// Face match confidence in `[0, 1]`
    #[serde(default, deserialize_with = "confidence")]
    pub confidence_score: f64,
    /// Captured image reference
    #[serde(default, rename = "image_url")]
    pub image_ref: Option<String>,
    /// Server-side attendance record id
    #[serde(default, rename = "id", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<u64>,
}

impl PendingVerificationItem {
    /// Create item with required fields
    #[must_use]
    pub fn new(employee_id: impl Into<EmployeeId>, confidence_score: f64) -> Self {
        Self {
            employee_id: employee_id.into(),
            employee_name: String::new(),
            check_in_time: None,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            image_ref: None,
            record_id: None,
        }
    }

    /// Set display name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.employee_name = name.into();
        self
    }

    /// Set check-in time
    #[inline]
    #[must_use]
    pub fn with_check_in_time(mut self, at: DateTime<Utc>) -> Self {
        self.check_in_time = Some(at);
        self
    }

    /// Check-in date in UTC, if known
    #[inline]
    #[must_use]
    pub fn check_in_date(&self) -> Option<NaiveDate> {
        self.check_in_time.map(|t| t.date_naive())
    }
}

/// Anomaly severity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Anything else the server sends
    Other(String),
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Other(value),
        }
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// A flagged attendance irregularity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    /// Unique key in the anomaly view
    pub id: AnomalyId,
    /// Display name, absent for anomalies without an employee
    #[serde(default)]
    pub employee_name: Option<String>,
    /// Anomaly kind, e.g. `low_confidence`
    #[serde(rename = "type")]
    pub kind: String,
    /// Severity
    pub severity: Severity,
    /// Related attendance record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance_id: Option<u64>,
    /// Related employee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<EmployeeId>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Detection time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
}

impl AnomalyAlert {
    /// Create alert with required fields
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: AnomalyId::new(id),
            employee_name: None,
            kind: kind.into(),
            severity,
            attendance_id: None,
            employee_id: None,
            description: None,
            detected_at: None,
        }
    }

    /// Set display name
    #[inline]
    #[must_use]
    pub fn with_employee_name(mut self, name: impl Into<String>) -> Self {
        self.employee_name = Some(name.into());
        self
    }
}
