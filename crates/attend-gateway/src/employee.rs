//! Employee self-service endpoints

use crate::endpoints;
use crate::gateway::AuthenticatedGateway;
use attend_session::ClientError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Profile fields required before face registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileStatus {
    /// Login name
    pub username: String,
    /// Employee identifier
    #[serde(default)]
    pub employee_id: Option<String>,
    /// Department
    #[serde(default)]
    pub department: Option<String>,
    /// Designation
    #[serde(default)]
    pub designation: Option<String>,
    /// Department and designation are both set
    #[serde(default)]
    pub profile_complete: bool,
}

/// Profile update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    /// Department
    pub department: String,
    /// Designation
    pub designation: String,
    /// Works remotely
    pub is_remote_worker: bool,
}

/// Today's check-in state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TodayStatus {
    /// Checked in today
    pub checked_in: bool,
    /// Check-in time
    #[serde(default)]
    pub check_in_time: Option<DateTime<Utc>>,
    /// Checked out since
    #[serde(default)]
    pub checked_out: bool,
    /// Check-out time
    #[serde(default)]
    pub check_out_time: Option<DateTime<Utc>>,
}

/// One attendance record from history
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceRecord {
    /// Record id
    pub id: u64,
    /// Check-in time
    #[serde(default)]
    pub check_in_time: Option<DateTime<Utc>>,
    /// Check-out time
    #[serde(default)]
    pub check_out_time: Option<DateTime<Utc>>,
    /// `pending`, `approved` or `rejected`
    pub status: String,
    /// Face match confidence
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Verification image
    #[serde(default)]
    pub verification_image_url: Option<String>,
}

/// Checkout acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutReceipt {
    /// `success`
    pub status: String,
    /// Server message
    #[serde(default)]
    pub message: Option<String>,
    /// Recorded check-out time
    #[serde(default)]
    pub check_out_time: Option<DateTime<Utc>>,
}

/// Endpoints for the signed-in employee
#[derive(Debug, Clone)]
pub struct EmployeeApi {
    gateway: Arc<AuthenticatedGateway>,
}

impl EmployeeApi {
    /// Create API
    #[inline]
    #[must_use]
    pub fn new(gateway: Arc<AuthenticatedGateway>) -> Self {
        Self { gateway }
    }

    /// Profile completeness
    ///
    /// # Errors
    /// Any gateway error
    pub async fn profile_status(&self) -> Result<ProfileStatus, ClientError> {
        self.gateway.get_json(endpoints::PROFILE_STATUS).await
    }

    /// Update department and designation
    ///
    /// # Errors
    /// `ClientError::Server` (400) if either field is empty
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<ProfileStatus, ClientError> {
        self.gateway
            .post_json(endpoints::PROFILE_UPDATE, update)
            .await
    }

    /// Today's check-in state
    ///
    /// # Errors
    /// Any gateway error
    pub async fn today_status(&self) -> Result<TodayStatus, ClientError> {
        self.gateway.get_json(endpoints::ATTENDANCE_TODAY).await
    }

    /// Attendance history, newest first
    ///
    /// # Errors
    /// Any gateway error
    pub async fn attendance_history(&self) -> Result<Vec<AttendanceRecord>, ClientError> {
        self.gateway.get_json(endpoints::ATTENDANCE_HISTORY).await
    }

    /// Close the open check-in
    ///
    /// # Errors
    /// `ClientError::Server` (404) without an open check-in
    pub async fn check_out(&self) -> Result<CheckoutReceipt, ClientError> {
        self.gateway
            .post_json(endpoints::ATTENDANCE_CHECKOUT, &json!({}))
            .await
    }
}
