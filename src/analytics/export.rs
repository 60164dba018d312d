//! Flat export projection.
//!
//! Submissions are flattened into single-level rows with a fixed column
//! order. Byte-level formatting belongs to a `FlatRecordSink` supplied by
//! the caller (CSV writer, spreadsheet writer).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::filter::{Field, SortKey};
use crate::storage::models::Submission;
use crate::validation::params::SubmissionQuery;

use super::{AnalyticsEngine, AnalyticsError};

/// One output column: record key and display title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportColumn {
    pub key: &'static str,
    pub title: &'static str,
}

const fn column(key: &'static str, title: &'static str) -> ExportColumn {
    ExportColumn { key, title }
}

pub const EXPORT_COLUMNS: [ExportColumn; 22] = [
    column("id", "ID"),
    column("firstName", "First Name"),
    column("lastName", "Last Name"),
    column("email", "Email"),
    column("phone", "Phone"),
    column("state", "State"),
    column("age", "Age"),
    column("beneficiary", "Beneficiary"),
    column("city", "City"),
    column("region", "Region"),
    column("country", "Country"),
    column("zip", "ZIP"),
    column("ipAddress", "IP Address"),
    column("browser", "Browser"),
    column("os", "OS"),
    column("device", "Device"),
    column("status", "Status"),
    column("qualityScore", "Quality Score"),
    column("campaign", "Campaign"),
    column("caseType", "Case Type"),
    column("submissionDate", "Submission Date"),
    column("trustedFormCert", "Trusted Form Cert"),
];

/// Denormalized submission row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub state: String,
    pub age: String,
    pub beneficiary: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub zip: String,
    pub ip_address: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub status: String,
    pub quality_score: i32,
    pub campaign: String,
    pub case_type: String,
    pub submission_date: String,
    pub trusted_form_cert: String,
}

impl From<&Submission> for FlatRecord {
    fn from(record: &Submission) -> Self {
        let d = &record.data;
        Self {
            id: record.id,
            first_name: d.fname.clone(),
            last_name: d.lname.clone(),
            email: d.email.clone().unwrap_or_default(),
            phone: d.phone.clone(),
            state: d.state.clone(),
            age: d.age.clone(),
            beneficiary: d.beneficiary.clone(),
            city: d.geolocation.city.clone(),
            region: d.geolocation.region.clone(),
            country: d.geolocation.country.clone(),
            zip: d.geolocation.zip.clone(),
            ip_address: d.ip_address.clone(),
            browser: d.browser_info.family.clone(),
            os: d.os_info.family.clone(),
            device: d.device_info.device_type.as_str().to_string(),
            status: d.status.as_str().to_string(),
            quality_score: d.quality_score,
            campaign: d.campaign.clone(),
            case_type: d.case_type.clone(),
            submission_date: d.submission_date.to_rfc3339(),
            trusted_form_cert: d.trusted_form_cert_url.clone(),
        }
    }
}

impl FlatRecord {
    /// Cell values in `EXPORT_COLUMNS` order.
    pub fn values(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.email.clone(),
            self.phone.clone(),
            self.state.clone(),
            self.age.clone(),
            self.beneficiary.clone(),
            self.city.clone(),
            self.region.clone(),
            self.country.clone(),
            self.zip.clone(),
            self.ip_address.clone(),
            self.browser.clone(),
            self.os.clone(),
            self.device.clone(),
            self.status.clone(),
            self.quality_score.to_string(),
            self.campaign.clone(),
            self.case_type.clone(),
            self.submission_date.clone(),
            self.trusted_form_cert.clone(),
        ]
    }
}

/// External tabular writer.
pub trait FlatRecordSink {
    fn write_records(&mut self, columns: &[ExportColumn], records: &[FlatRecord]) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "excel" | "xlsx" => Some(ExportFormat::Excel),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }
}

/// `submissions_<YYYY-MM-DDTHH-MM-SS>.<ext>`
pub fn export_file_name(format: ExportFormat, now: DateTime<Utc>) -> String {
    format!(
        "submissions_{}.{}",
        now.format("%Y-%m-%dT%H-%M-%S"),
        format.extension()
    )
}

/// Deletes intermediate export files after a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct CleanupScheduler {
    delay: Duration,
}

impl CleanupScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Remove `path` once the delay has passed, whether or not the file was
    /// delivered. A file that is already gone is not an error.
    pub fn schedule(&self, path: PathBuf) -> JoinHandle<()> {
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            match fs::remove_file(&path) {
                Ok(()) => log::info!("EXPORT_CLEANUP path={}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::debug!("EXPORT_CLEANUP path={} already_removed=true", path.display())
                }
                Err(e) => log::warn!("EXPORT_CLEANUP_FAILED path={} error={}", path.display(), e),
            }
        })
    }
}

/// A written export file and its pending cleanup.
#[derive(Debug)]
pub struct ExportArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub cleanup: JoinHandle<()>,
}

impl AnalyticsEngine {
    /// Matching submissions as flat rows, newest first. An empty match is
    /// `AnalyticsError::NoData`, never an empty row set.
    pub fn export_records(&self, query: &SubmissionQuery) -> Result<Vec<FlatRecord>, AnalyticsError> {
        let found = self.store().find_many(
            &query.to_filter(),
            &[SortKey::desc(Field::SubmissionDate)],
            None,
        )?;

        if found.records.is_empty() {
            log::info!("EXPORT_EMPTY filters={:?}", query);
            return Err(AnalyticsError::NoData);
        }

        Ok(found.records.iter().map(FlatRecord::from).collect())
    }

    /// Export into a caller-owned sink. Returns the number of rows written.
    pub fn export_to_sink<S>(&self, query: &SubmissionQuery, sink: &mut S) -> Result<usize, AnalyticsError>
    where
        S: FlatRecordSink + ?Sized,
    {
        let records = self.export_records(query)?;
        sink.write_records(&EXPORT_COLUMNS, &records)?;
        log::info!("EXPORT_READY rows={}", records.len());
        Ok(records.len())
    }

    /// Export into a timestamped file under the configured export directory.
    ///
    /// `open_sink` creates the writer for the target path. Cleanup of the file
    /// is scheduled as soon as it has been opened, so a failed write does not
    /// leave it behind.
    pub fn export_to_file<S, F>(
        &self,
        query: &SubmissionQuery,
        format: ExportFormat,
        open_sink: F,
    ) -> Result<ExportArtifact, AnalyticsError>
    where
        S: FlatRecordSink,
        F: FnOnce(&Path) -> io::Result<S>,
    {
        let records = self.export_records(query)?;

        fs::create_dir_all(&self.config.export_dir)?;
        let file_name = export_file_name(format, Utc::now());
        let path = self.config.export_dir.join(&file_name);

        let mut sink = open_sink(&path)?;
        let cleanup = CleanupScheduler::new(self.config.export_cleanup_delay).schedule(path.clone());
        sink.write_records(&EXPORT_COLUMNS, &records)?;

        log::info!(
            "EXPORT_READY file={} rows={} cleanup_secs={}",
            file_name,
            records.len(),
            self.config.export_cleanup_delay.as_secs()
        );

        Ok(ExportArtifact {
            file_name,
            path,
            rows: records.len(),
            cleanup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 4, 9).unwrap();
        assert_eq!(export_file_name(ExportFormat::Csv, now), "submissions_2024-05-01T13-04-09.csv");
        assert_eq!(export_file_name(ExportFormat::Excel, now), "submissions_2024-05-01T13-04-09.xlsx");
    }

    #[test]
    fn test_values_follow_column_order() {
        let record = Submission::from_new(9, crate::testing::sample_submission(), Utc::now());
        let flat = FlatRecord::from(&record);
        let values = flat.values();
        assert_eq!(values.len(), EXPORT_COLUMNS.len());

        let by_key = serde_json::to_value(&flat).unwrap();
        for (column, value) in EXPORT_COLUMNS.iter().zip(&values) {
            let expected = match &by_key[column.key] {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            assert_eq!(&expected, value, "column {}", column.key);
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ExportFormat::parse("CSV"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::parse("xlsx"), Some(ExportFormat::Excel));
        assert_eq!(ExportFormat::parse("pdf"), None);
    }

    #[test]
    fn test_cleanup_removes_file() {
        let path = std::env::temp_dir().join(format!("leadlens-cleanup-{}.csv", uuid::Uuid::new_v4()));
        fs::write(&path, "id\n1\n").unwrap();

        CleanupScheduler::new(Duration::from_millis(10))
            .schedule(path.clone())
            .join()
            .unwrap();
        assert!(!path.exists());
    }
}
