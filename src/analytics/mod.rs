//! Analytics aggregation engine.
//!
//! Read-side queries over the stored submissions:
//! - Dashboard summary
//! - Conversion funnel
//! - Map data
//! - Filtered listing and flat export
//! - Single-record and bulk workflow updates
//!
//! Every operation is a point-in-time read against the record store with no
//! isolation stronger than the store's default. Submissions written while a
//! multi-query operation runs may or may not be reflected in its result, and
//! the individual figures of one report may disagree by those writes.

pub mod dashboard;
pub mod export;
pub mod funnel;
pub mod listing;
pub mod map;
pub mod records;

pub use dashboard::*;
pub use export::*;
pub use funnel::*;
pub use listing::*;
pub use map::*;
pub use records::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::AnalyticsConfig;
use crate::storage::filter::Filter;
use crate::storage::models::SubmissionId;
use crate::storage::store::{StoreError, SubmissionStore};
use crate::validation::params::{LookbackWindow, ValidationError};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Submission not found")]
    NotFound(SubmissionId),

    #[error("No data found for export")]
    NoData,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),
}

impl AnalyticsError {
    pub fn http_status(&self) -> u16 {
        match self {
            AnalyticsError::Validation(_) => 400,
            AnalyticsError::NotFound(_) | AnalyticsError::NoData => 404,
            AnalyticsError::Store(_) | AnalyticsError::Export(_) => 500,
        }
    }
}

/// Capabilities checked by the external auth gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    ViewSubmissions,
    ViewAnalytics,
    ExportData,
    ManageUsers,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewSubmissions => "viewSubmissions",
            Permission::ViewAnalytics => "viewAnalytics",
            Permission::ExportData => "exportData",
            Permission::ManageUsers => "manageUsers",
        }
    }
}

/// Operations exposed by the engine. Callers must hold
/// `required_permission()` before invoking the matching method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Dashboard,
    Funnel,
    MapData,
    ListSubmissions,
    GetSubmission,
    RecentSummary,
    UpdateStatus,
    BulkUpdate,
    Export,
    DeleteSubmission,
}

impl Operation {
    pub fn required_permission(&self) -> Permission {
        match self {
            Operation::Dashboard | Operation::Funnel | Operation::MapData => {
                Permission::ViewAnalytics
            }
            Operation::ListSubmissions
            | Operation::GetSubmission
            | Operation::RecentSummary
            | Operation::UpdateStatus
            | Operation::BulkUpdate => Permission::ViewSubmissions,
            Operation::Export => Permission::ExportData,
            Operation::DeleteSubmission => Permission::ManageUsers,
        }
    }
}

/// Time span a report covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub days: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Period {
    fn new(window: LookbackWindow, now: DateTime<Utc>) -> Self {
        Self {
            days: window.days,
            start_date: window.start(now),
            end_date: now,
        }
    }

    fn filter(&self) -> Filter {
        Filter::all().submitted_since(self.start_date)
    }
}

/// Read-side engine over a shared record store.
#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn SubmissionStore>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn SubmissionStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Parse a raw `days` parameter against the configured default window.
    pub fn window(&self, raw_days: Option<&str>) -> Result<LookbackWindow, AnalyticsError> {
        Ok(LookbackWindow::parse(raw_days, self.config.default_window_days)?)
    }

    fn store(&self) -> &dyn SubmissionStore {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AnalyticsError::NotFound(3).http_status(), 404);
        assert_eq!(AnalyticsError::NoData.http_status(), 404);
        assert_eq!(AnalyticsError::NoData.to_string(), "No data found for export");
        assert_eq!(
            AnalyticsError::Validation(ValidationError::MalformedBulkUpdate("x".into())).http_status(),
            400
        );
        assert_eq!(
            AnalyticsError::Store(StoreError::PoolTimeout(30_000)).http_status(),
            500
        );
    }

    #[test]
    fn test_required_permissions() {
        assert_eq!(Operation::Funnel.required_permission(), Permission::ViewAnalytics);
        assert_eq!(Operation::BulkUpdate.required_permission(), Permission::ViewSubmissions);
        assert_eq!(Operation::Export.required_permission(), Permission::ExportData);
        assert_eq!(
            Operation::DeleteSubmission.required_permission().as_str(),
            "manageUsers"
        );
    }
}
