//! Request parameter validation.
//!
//! Raw query/body parameters arrive as optional strings or JSON. They are
//! parsed into typed queries here so that invalid input is rejected before
//! any store access.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::filter::{Condition, Field, Filter, SortDirection, SortKey};
use crate::storage::models::{Status, SubmissionId, SubmissionPatch};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid status '{value}'")]
    InvalidStatus {
        value: String,
        valid_statuses: Vec<&'static str>,
    },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("Invalid request: ids array and updates object required ({0})")]
    MalformedBulkUpdate(String),
}

impl ValidationError {
    fn param(name: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidParam {
            name,
            reason: reason.into(),
        }
    }
}

pub fn parse_status(value: &str) -> Result<Status, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidStatus {
        value: value.to_string(),
        valid_statuses: Status::valid_values(),
    })
}

/// Longest accepted lookback, roughly a century.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Trailing N-day period that scopes an analytics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LookbackWindow {
    pub days: u32,
}

impl LookbackWindow {
    pub fn days(days: u32) -> Self {
        Self { days }
    }

    /// Parse the `days` parameter, falling back to `default_days` when absent.
    /// Accepted values are `1..=MAX_WINDOW_DAYS`.
    pub fn parse(raw: Option<&str>, default_days: u32) -> Result<Self, ValidationError> {
        let s = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => return Ok(Self::days(default_days)),
            Some(s) => s,
        };
        let days = s
            .parse::<u32>()
            .map_err(|_| ValidationError::param("days", format!("expected a positive integer, got '{}'", s)))?;
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err(ValidationError::param(
                "days",
                format!("must be between 1 and {}, got {}", MAX_WINDOW_DAYS, days),
            ));
        }
        Ok(Self::days(days))
    }

    /// Window start. Saturates at the earliest representable instant.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Which end of a date range a date-only value bounds.
#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date. A bare date used
/// as an upper bound covers the whole day.
fn parse_instant(name: &'static str, raw: &str, bound: Bound) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::param(name, format!("expected RFC 3339 or YYYY-MM-DD, got '{}'", raw)))?;
    let naive = match bound {
        Bound::Start => date.and_hms_opt(0, 0, 0),
        Bound::End => date.and_hms_milli_opt(23, 59, 59, 999),
    }
    .ok_or_else(|| ValidationError::param(name, format!("invalid date '{}'", raw)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Raw filter parameters shared by listing and export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub country: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Validated filter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionQuery {
    pub search: Option<String>,
    pub status: Option<Status>,
    pub country: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Fields matched by free-text search.
pub const SEARCH_FIELDS: [Field; 6] = [
    Field::FirstName,
    Field::LastName,
    Field::Email,
    Field::Phone,
    Field::GeoCity,
    Field::GeoRegion,
];

impl SubmissionQuery {
    pub fn parse(params: &FilterParams) -> Result<Self, ValidationError> {
        let status = non_blank(params.status.as_deref()).map(parse_status).transpose()?;
        let date_from = non_blank(params.date_from.as_deref())
            .map(|raw| parse_instant("dateFrom", raw, Bound::Start))
            .transpose()?;
        let date_to = non_blank(params.date_to.as_deref())
            .map(|raw| parse_instant("dateTo", raw, Bound::End))
            .transpose()?;

        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err(ValidationError::param("dateFrom", "must not be after dateTo"));
            }
        }

        Ok(Self {
            search: non_blank(params.search.as_deref()).map(str::to_string),
            status,
            country: non_blank(params.country.as_deref()).map(str::to_string),
            date_from,
            date_to,
        })
    }

    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::all();
        if let Some(search) = &self.search {
            filter = filter.and(Condition::AnyOf(
                SEARCH_FIELDS
                    .iter()
                    .map(|f| Condition::ContainsCi(*f, search.clone()))
                    .collect(),
            ));
        }
        if let Some(status) = self.status {
            filter = filter.and(Condition::Eq(Field::Status, status.as_str().into()));
        }
        if let Some(country) = &self.country {
            filter = filter.and(Condition::Eq(Field::GeoCountry, country.as_str().into()));
        }
        if let Some(from) = self.date_from {
            filter = filter.and(Condition::Gte(Field::SubmissionDate, from.into()));
        }
        if let Some(to) = self.date_to {
            filter = filter.and(Condition::Lte(Field::SubmissionDate, to.into()));
        }
        filter
    }
}

/// Raw listing parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(flatten)]
    pub filters: FilterParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub page: u64,
    pub limit: u64,
    pub sort: SortKey,
    pub query: SubmissionQuery,
}

pub const DEFAULT_PAGE_SIZE: u64 = 20;

impl ListingQuery {
    pub fn parse(params: &ListingParams, max_page_size: u64) -> Result<Self, ValidationError> {
        let page = match non_blank(params.page.as_deref()) {
            None => 1,
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| ValidationError::param("page", format!("expected an integer >= 1, got '{}'", raw)))?,
        };

        let limit = match non_blank(params.limit.as_deref()) {
            None => DEFAULT_PAGE_SIZE.min(max_page_size),
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|l| (1..=max_page_size).contains(l))
                .ok_or_else(|| {
                    ValidationError::param("limit", format!("expected 1..={}, got '{}'", max_page_size, raw))
                })?,
        };

        let field = match non_blank(params.sort_by.as_deref()) {
            None => Field::SubmissionDate,
            Some(raw) => Field::from_name(raw)
                .ok_or_else(|| ValidationError::param("sortBy", format!("unknown field '{}'", raw)))?,
        };

        let direction = match non_blank(params.sort_order.as_deref()) {
            None => SortDirection::Desc,
            Some(raw) => SortDirection::parse(raw)
                .ok_or_else(|| ValidationError::param("sortOrder", format!("expected asc or desc, got '{}'", raw)))?,
        };

        Ok(Self {
            page,
            limit,
            sort: SortKey { field, direction },
            query: SubmissionQuery::parse(&params.filters)?,
        })
    }
}

/// Validated bulk update request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpdate {
    pub ids: Vec<SubmissionId>,
    pub patch: SubmissionPatch,
}

impl BulkUpdate {
    /// Parse `{"ids": [...], "updates": {...}}`.
    pub fn parse(body: &Value) -> Result<Self, ValidationError> {
        let ids = body
            .get("ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ValidationError::MalformedBulkUpdate("ids must be an array".to_string()))?;

        let ids = ids
            .iter()
            .map(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| ValidationError::MalformedBulkUpdate(format!("invalid id {}", v)))
            })
            .collect::<Result<Vec<SubmissionId>, _>>()?;

        if ids.is_empty() {
            return Err(ValidationError::MalformedBulkUpdate("ids must not be empty".to_string()));
        }

        let updates = body
            .get("updates")
            .filter(|v| v.is_object())
            .ok_or_else(|| ValidationError::MalformedBulkUpdate("updates must be an object".to_string()))?;

        let patch: SubmissionPatch = serde_json::from_value(updates.clone())
            .map_err(|e| ValidationError::MalformedBulkUpdate(e.to_string()))?;

        if patch.is_empty() {
            return Err(ValidationError::MalformedBulkUpdate("updates sets no fields".to_string()));
        }

        Ok(Self { ids, patch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("qualified"), Ok(Status::Qualified));
        match parse_status("archived") {
            Err(ValidationError::InvalidStatus { valid_statuses, .. }) => {
                assert_eq!(valid_statuses.len(), 5)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_window_parse() {
        assert_eq!(LookbackWindow::parse(None, 30), Ok(LookbackWindow::days(30)));
        assert_eq!(LookbackWindow::parse(Some("7"), 30), Ok(LookbackWindow::days(7)));
        assert!(LookbackWindow::parse(Some("-1"), 30).is_err());
        assert!(LookbackWindow::parse(Some("week"), 30).is_err());
    }

    #[test]
    fn test_window_bounds() {
        assert!(LookbackWindow::parse(Some("0"), 30).is_err());
        assert!(LookbackWindow::parse(Some("4000000000"), 30).is_err());
        assert!(LookbackWindow::parse(Some("36501"), 30).is_err());
        assert_eq!(
            LookbackWindow::parse(Some("36500"), 30),
            Ok(LookbackWindow::days(MAX_WINDOW_DAYS))
        );

        // Constructed directly, an oversized window saturates instead of overflowing.
        let now = Utc::now();
        assert_eq!(LookbackWindow::days(u32::MAX).start(now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(
            LookbackWindow::days(7).start(now),
            now - Duration::days(7)
        );
    }

    #[test]
    fn test_listing_defaults() {
        let query = ListingQuery::parse(&ListingParams::default(), 500).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
        assert_eq!(query.sort, SortKey::desc(Field::SubmissionDate));
        assert_eq!(query.query, SubmissionQuery::default());
    }

    #[test]
    fn test_listing_rejects_bad_params() {
        let params = ListingParams {
            sort_by: Some("password_hash".to_string()),
            ..ListingParams::default()
        };
        assert!(ListingQuery::parse(&params, 500).is_err());

        let params = ListingParams {
            limit: Some("0".to_string()),
            ..ListingParams::default()
        };
        assert!(ListingQuery::parse(&params, 500).is_err());

        let params = ListingParams {
            page: Some("0".to_string()),
            ..ListingParams::default()
        };
        assert!(ListingQuery::parse(&params, 500).is_err());
    }

    #[test]
    fn test_listing_params_deserialize_flattened_filters() {
        let params: ListingParams = serde_json::from_value(json!({
            "page": "2",
            "sortBy": "geolocation.country",
            "sortOrder": "asc",
            "status": "pending",
            "dateFrom": "2026-01-01"
        }))
        .unwrap();
        let query = ListingQuery::parse(&params, 500).unwrap();
        assert_eq!(query.page, 2);
        assert_eq!(query.sort, SortKey::asc(Field::GeoCountry));
        assert_eq!(query.query.status, Some(Status::Pending));
        assert_eq!(
            query.query.date_from.map(|d| d.to_rfc3339()),
            Some("2026-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_date_only_upper_bound_covers_day() {
        let query = SubmissionQuery::parse(&FilterParams {
            date_to: Some("2026-03-01".to_string()),
            ..FilterParams::default()
        })
        .unwrap();
        let to = query.date_to.unwrap();
        assert_eq!(to.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(to.format("%H:%M:%S").to_string(), "23:59:59");
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = SubmissionQuery::parse(&FilterParams {
            date_from: Some("2026-03-02".to_string()),
            date_to: Some("2026-03-01".to_string()),
            ..FilterParams::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_search_expands_to_six_fields() {
        let query = SubmissionQuery {
            search: Some("austin".to_string()),
            ..SubmissionQuery::default()
        };
        match &query.to_filter().conditions[0] {
            Condition::AnyOf(inner) => assert_eq!(inner.len(), 6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bulk_update_parse() {
        let update = BulkUpdate::parse(&json!({
            "ids": [1, "2"],
            "updates": {"status": "contacted"}
        }))
        .unwrap();
        assert_eq!(update.ids, vec![1, 2]);
        assert_eq!(update.patch.status, Some(Status::Contacted));
    }

    #[test]
    fn test_bulk_update_rejects_malformed() {
        assert!(BulkUpdate::parse(&json!({"ids": 1, "updates": {"status": "pending"}})).is_err());
        assert!(BulkUpdate::parse(&json!({"ids": [], "updates": {"status": "pending"}})).is_err());
        assert!(BulkUpdate::parse(&json!({"ids": [1]})).is_err());
        assert!(BulkUpdate::parse(&json!({"ids": [1], "updates": {}})).is_err());
        assert!(BulkUpdate::parse(&json!({"ids": [1], "updates": {"email": "x@y.z"}})).is_err());
        assert!(BulkUpdate::parse(&json!({"ids": [1], "updates": {"status": "archived"}})).is_err());
    }
}
