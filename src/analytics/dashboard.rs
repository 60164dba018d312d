//! Dashboard summary.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::storage::filter::{Aggregate, Condition, Field, FieldValue, Filter, GroupKey, GroupRow, Pagination, SortKey};
use crate::storage::models::{defaults, Geolocation, Status, Submission};
use crate::validation::params::LookbackWindow;

use super::{AnalyticsEngine, AnalyticsError, Period};

/// Quality score at or above which a submission counts as high quality.
pub const HIGH_QUALITY_THRESHOLD: i64 = 80;
pub const TOP_COUNTRIES_LIMIT: usize = 10;
pub const DASHBOARD_RECENT_LIMIT: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub all_time: u64,
    pub period: u64,
    pub today: u64,
    /// Rounded percentage of windowed submissions that are high quality.
    pub quality_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryStat {
    pub country: String,
    pub count: u64,
    pub avg_quality: f64,
}

/// Count for one value of a grouping field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub count: u64,
}

/// Reduced projection used for "recent" lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentSubmission {
    pub id: i64,
    pub fname: String,
    pub lname: String,
    pub email: Option<String>,
    pub submission_date: DateTime<Utc>,
    pub status: Status,
    pub geolocation: Geolocation,
    pub quality_score: i32,
}

impl From<Submission> for RecentSubmission {
    fn from(record: Submission) -> Self {
        Self {
            id: record.id,
            fname: record.data.fname,
            lname: record.data.lname,
            email: record.data.email,
            submission_date: record.data.submission_date,
            status: record.data.status,
            geolocation: record.data.geolocation,
            quality_score: record.data.quality_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub period: Period,
    pub totals: Totals,
    /// Ascending by date.
    pub daily_submissions: Vec<DailyCount>,
    /// Count descending, at most ten.
    pub by_country: Vec<CountryStat>,
    pub by_device: Vec<Bucket>,
    /// Only statuses that occur in the window.
    pub by_status: Vec<Bucket>,
    pub recent_submissions: Vec<RecentSubmission>,
}

/// Percentage of `high` in `total`, rounded to the nearest integer.
/// Zero when `total` is zero.
pub fn quality_rate(high: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (high as f64 / total as f64 * 100.0).round() as u32
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .unwrap_or(now)
}

fn key_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Timestamp(t) => t.to_rfc3339(),
        FieldValue::Date(d) => d.to_string(),
    }
}

/// Count descending, then key ascending so equal counts order stably.
fn by_count_desc(a: &Bucket, b: &Bucket) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key))
}

fn buckets(rows: Vec<GroupRow>) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = rows
        .into_iter()
        .map(|row| Bucket {
            key: key_text(row.key(0)),
            count: row.count,
        })
        .collect();
    buckets.sort_by(by_count_desc);
    buckets
}

impl AnalyticsEngine {
    pub fn dashboard(&self, window: LookbackWindow) -> Result<DashboardReport, AnalyticsError> {
        self.dashboard_at(window, Utc::now())
    }

    /// Dashboard as of `now`.
    pub fn dashboard_at(
        &self,
        window: LookbackWindow,
        now: DateTime<Utc>,
    ) -> Result<DashboardReport, AnalyticsError> {
        let store = self.store();
        let period = Period::new(window, now);
        let in_window = period.filter();

        let all_time = store.count(&Filter::all())?;
        let today = store.count(&Filter::all().submitted_since(start_of_day(now)))?;
        let period_total = store.count(&in_window)?;
        let high_quality = store.count(&in_window.clone().and(Condition::Gte(
            Field::QualityScore,
            HIGH_QUALITY_THRESHOLD.into(),
        )))?;

        let mut daily_submissions: Vec<DailyCount> = store
            .aggregate(&in_window, &[GroupKey::SubmissionDay], &[Aggregate::Count])?
            .into_iter()
            .filter_map(|row| match row.key(0) {
                FieldValue::Date(date) => Some(DailyCount {
                    date: *date,
                    count: row.count,
                }),
                _ => None,
            })
            .collect();
        daily_submissions.sort_by_key(|d| d.date);

        let known_country = in_window
            .clone()
            .and(Condition::NotEq(Field::GeoCountry, defaults::UNKNOWN.into()));
        let mut by_country: Vec<CountryStat> = store
            .aggregate(
                &known_country,
                &[GroupKey::Field(Field::GeoCountry)],
                &[Aggregate::Count, Aggregate::AvgQualityScore],
            )?
            .into_iter()
            .map(|row| CountryStat {
                country: key_text(row.key(0)),
                count: row.count,
                avg_quality: row.avg_quality_score.unwrap_or(0.0),
            })
            .collect();
        by_country.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.country.cmp(&b.country))
        });
        by_country.truncate(TOP_COUNTRIES_LIMIT);

        let by_device = buckets(store.aggregate(
            &in_window,
            &[GroupKey::Field(Field::DeviceType)],
            &[Aggregate::Count],
        )?);
        let by_status = buckets(store.aggregate(
            &in_window,
            &[GroupKey::Field(Field::Status)],
            &[Aggregate::Count],
        )?);

        let recent_submissions = store
            .find_many(
                &in_window,
                &[SortKey::desc(Field::SubmissionDate)],
                Some(Pagination::first(DASHBOARD_RECENT_LIMIT)),
            )?
            .records
            .into_iter()
            .map(RecentSubmission::from)
            .collect();

        let totals = Totals {
            all_time,
            period: period_total,
            today,
            quality_rate: quality_rate(high_quality, period_total),
        };

        log::info!(
            "DASHBOARD_COMPUTED days={} all_time={} period={} today={} quality_rate={}",
            period.days,
            totals.all_time,
            totals.period,
            totals.today,
            totals.quality_rate
        );

        Ok(DashboardReport {
            period,
            totals,
            daily_submissions,
            by_country,
            by_device,
            by_status,
            recent_submissions,
        })
    }
}
