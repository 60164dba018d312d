//! Single-record reads and workflow writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::storage::filter::{Field, Filter, Pagination, SortKey};
use crate::storage::models::{Status, Submission, SubmissionId, SubmissionPatch};
use crate::validation::params::{parse_status, BulkUpdate, LookbackWindow};

use super::{AnalyticsEngine, AnalyticsError, RecentSubmission};

pub const RECENT_SUMMARY_LIMIT: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub message: String,
    pub modified_count: u64,
}

impl AnalyticsEngine {
    pub fn get_submission(&self, id: SubmissionId) -> Result<Submission, AnalyticsError> {
        self.store()
            .find_by_id(id)?
            .ok_or(AnalyticsError::NotFound(id))
    }

    /// Set the status of one submission. The value is validated before the
    /// store is touched; any status may follow any other.
    pub fn update_status(&self, id: SubmissionId, raw_status: &str) -> Result<Submission, AnalyticsError> {
        let status = parse_status(raw_status)?;
        self.set_status(id, status)
    }

    /// Soft delete: the record is kept and marked `rejected`.
    pub fn soft_delete(&self, id: SubmissionId) -> Result<Submission, AnalyticsError> {
        self.set_status(id, Status::Rejected)
    }

    fn set_status(&self, id: SubmissionId, status: Status) -> Result<Submission, AnalyticsError> {
        let previous = self.get_submission(id)?;
        self.store()
            .update(&Filter::all().ids(&[id]), &SubmissionPatch::status(status))?;
        log::info!(
            "STATUS_UPDATED submission={} from={} to={}",
            id,
            previous.data.status,
            status
        );
        self.get_submission(id)
    }

    /// Apply `{"ids": [...], "updates": {...}}`. Ids that do not exist are
    /// skipped; the result counts only modified records.
    pub fn bulk_update(&self, body: &Value) -> Result<BulkUpdateResult, AnalyticsError> {
        let request = BulkUpdate::parse(body)?;
        let modified_count = self
            .store()
            .update(&Filter::all().ids(&request.ids), &request.patch)?;

        log::info!(
            "BULK_UPDATE requested={} modified={}",
            request.ids.len(),
            modified_count
        );

        Ok(BulkUpdateResult {
            message: format!("Updated {} submissions", modified_count),
            modified_count,
        })
    }

    /// Most recent submissions in the trailing window (configured default
    /// when `window` is `None`).
    pub fn recent_summary(&self, window: Option<LookbackWindow>) -> Result<Vec<RecentSubmission>, AnalyticsError> {
        self.recent_summary_at(window, Utc::now())
    }

    pub fn recent_summary_at(
        &self,
        window: Option<LookbackWindow>,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecentSubmission>, AnalyticsError> {
        let window = window.unwrap_or_else(|| LookbackWindow::days(self.config.recent_window_days));
        let found = self.store().find_many(
            &Filter::all().submitted_since(window.start(now)),
            &[SortKey::desc(Field::SubmissionDate)],
            Some(Pagination::first(RECENT_SUMMARY_LIMIT)),
        )?;
        Ok(found.records.into_iter().map(RecentSubmission::from).collect())
    }
}
