//! Administrator decisions
//!
//! [`ActionDispatcher`] sends approve / reject / batch-approve to the server
//! and, once the server accepts, removes the affected entries from the view
//! right away. The `attendance.updated` event that follows is then a no-op.
//! A failed action leaves the view untouched and is not retried.

use crate::model::EmployeeId;
use crate::session::Input;
use attend_gateway::{endpoints, ApiRequest, AuthenticatedGateway};
use attend_session::ClientError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Serialize)]
struct Decision<'a> {
    employee_id: &'a str,
    notes: &'a str,
}

#[derive(Serialize)]
struct BatchApproval<'a> {
    ids: &'a [EmployeeId],
}

/// Server report for a batch approval
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchReport {
    /// Ids the server approved
    #[serde(default, rename = "approved_employee_ids")]
    pub approved: Vec<EmployeeId>,
    /// Ids without a pending record
    #[serde(default, rename = "skipped_employee_ids")]
    pub skipped: Vec<EmployeeId>,
    /// Records approved, as counted by the server
    #[serde(default)]
    pub approved_count: Option<usize>,
}

/// Executes review decisions and confirms them into the view
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    gateway: Arc<AuthenticatedGateway>,
    confirmations: mpsc::Sender<Input>,
    selection: Arc<Mutex<BTreeSet<EmployeeId>>>,
}

impl ActionDispatcher {
    pub(crate) fn new(gateway: Arc<AuthenticatedGateway>, confirmations: mpsc::Sender<Input>) -> Self {
        Self {
            gateway,
            confirmations,
            selection: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Dispatcher with no view attached; decisions only reach the server
    #[must_use]
    pub fn detached(gateway: Arc<AuthenticatedGateway>) -> Self {
        let (confirmations, _) = mpsc::channel(1);
        Self::new(gateway, confirmations)
    }

    /// Approve one pending verification
    ///
    /// # Errors
    /// Any gateway error; the view is unchanged
    pub async fn approve(&self, employee_id: &EmployeeId, notes: &str) -> Result<(), ClientError> {
        self.decide(endpoints::REVIEW_APPROVE, employee_id, notes).await?;
        tracing::info!("Approved attendance for {}", employee_id);
        Ok(())
    }

    /// Reject one pending verification
    ///
    /// # Errors
    /// Any gateway error; the view is unchanged
    pub async fn reject(&self, employee_id: &EmployeeId, notes: &str) -> Result<(), ClientError> {
        self.decide(endpoints::REVIEW_REJECT, employee_id, notes).await?;
        tracing::info!("Rejected attendance for {}", employee_id);
        Ok(())
    }

    /// Approve many in one request.
    ///
    /// On success every requested id leaves the view and the selection is
    /// cleared, whatever the server reports as skipped.
    ///
    /// # Errors
    /// Any gateway error; the view and selection are unchanged
    pub async fn batch_approve(&self, employee_ids: &[EmployeeId]) -> Result<BatchReport, ClientError> {
        if employee_ids.is_empty() {
            return Ok(BatchReport::default());
        }

        let request = ApiRequest::post_json(
            endpoints::REVIEW_BATCH_APPROVE,
            &BatchApproval { ids: employee_ids },
        )?;
        let response = self.gateway.send(&request).await?.into_success()?;

        let report = match response.json::<Option<BatchReport>>() {
            Ok(report) => report.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Unreadable batch approval report: {}", e);
                BatchReport::default()
            }
        };

        self.confirm(employee_ids.to_vec()).await;
        self.selection.lock().clear();
        tracing::info!(
            "Batch approved {} of {} requested ({} skipped)",
            report.approved_count.unwrap_or(report.approved.len()),
            employee_ids.len(),
            report.skipped.len()
        );

        Ok(report)
    }

    /// Flip selection of `employee_id`; returns whether it is now selected
    pub fn toggle(&self, employee_id: &EmployeeId) -> bool {
        let mut selection = self.selection.lock();
        if selection.remove(employee_id) {
            false
        } else {
            selection.insert(employee_id.clone());
            true
        }
    }

    /// Whether `employee_id` is selected
    #[must_use]
    pub fn is_selected(&self, employee_id: &EmployeeId) -> bool {
        self.selection.lock().contains(employee_id)
    }

    /// Selected ids, sorted
    #[must_use]
    pub fn selected(&self) -> Vec<EmployeeId> {
        self.selection.lock().iter().cloned().collect()
    }

    /// Deselect everything
    pub fn clear_selection(&self) {
        self.selection.lock().clear();
    }

    /// Batch-approve the current selection
    ///
    /// # Errors
    /// See [`batch_approve`](Self::batch_approve)
    pub async fn batch_approve_selected(&self) -> Result<BatchReport, ClientError> {
        let ids = self.selected();
        self.batch_approve(&ids).await
    }

    async fn decide(&self, path: &str, employee_id: &EmployeeId, notes: &str) -> Result<(), ClientError> {
        let request = ApiRequest::post_json(
            path,
            &Decision {
                employee_id: employee_id.as_str(),
                notes,
            },
        )?;
        self.gateway.send(&request).await?.into_success()?;

        self.confirm(vec![employee_id.clone()]).await;
        self.selection.lock().remove(employee_id);
        Ok(())
    }

    /// Apply removals to the view; returns once they are published.
    ///
    /// A closed session discards them.
    async fn confirm(&self, ids: Vec<EmployeeId>) {
        let (ack, applied) = oneshot::channel();
        let input = Input::Confirmed { ids, ack: Some(ack) };
        if self.confirmations.send(input).await.is_err() {
            tracing::debug!("Review session closed, discarding confirmation");
            return;
        }
        let _ = applied.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_body_uses_ids() {
        let ids = [EmployeeId::new("E1"), EmployeeId::new("E2")];
        let body = serde_json::to_value(BatchApproval { ids: &ids }).unwrap();
        assert_eq!(body, json!({"ids": ["E1", "E2"]}));
    }

    #[test]
    fn decision_body_sends_empty_notes() {
        let body = serde_json::to_value(Decision {
            employee_id: "E1",
            notes: "",
        })
        .unwrap();
        assert_eq!(body, json!({"employee_id": "E1", "notes": ""}));
    }

    #[test]
    fn batch_report_from_wire() {
        let report: BatchReport = serde_json::from_value(json!({
            "status": "success",
            "approved_count": 1,
            "approved_employee_ids": ["E1"],
            "skipped_employee_ids": ["E2"]
        }))
        .unwrap();

        assert_eq!(report.approved, vec![EmployeeId::new("E1")]);
        assert_eq!(report.skipped, vec![EmployeeId::new("E2")]);
        assert_eq!(report.approved_count, Some(1));
    }
}
