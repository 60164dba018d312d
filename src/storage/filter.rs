//! Typed query vocabulary for the record store.
//!
//! Filters, sort keys and grouping keys address fields through the `Field`
//! enum rather than path strings, including the nested geolocation and
//! device/browser/os sub-records.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::models::{Submission, SubmissionId};

/// Addressable submission field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    FirstName,
    LastName,
    Email,
    Phone,
    State,
    Age,
    Beneficiary,
    IpAddress,
    UserAgent,
    TrustedFormCertUrl,
    CaseType,
    OwnerId,
    Campaign,
    OfferUrl,
    Referrer,
    Status,
    QualityScore,
    SubmissionDate,
    CreatedAt,
    UpdatedAt,
    GeoCountry,
    GeoRegion,
    GeoCity,
    GeoZip,
    GeoLatitude,
    GeoLongitude,
    BrowserFamily,
    OsFamily,
    DeviceType,
}

impl Field {
    pub const ALL: [Field; 30] = [
        Field::Id,
        Field::FirstName,
        Field::LastName,
        Field::Email,
        Field::Phone,
        Field::State,
        Field::Age,
        Field::Beneficiary,
        Field::IpAddress,
        Field::UserAgent,
        Field::TrustedFormCertUrl,
        Field::CaseType,
        Field::OwnerId,
        Field::Campaign,
        Field::OfferUrl,
        Field::Referrer,
        Field::Status,
        Field::QualityScore,
        Field::SubmissionDate,
        Field::CreatedAt,
        Field::UpdatedAt,
        Field::GeoCountry,
        Field::GeoRegion,
        Field::GeoCity,
        Field::GeoZip,
        Field::GeoLatitude,
        Field::GeoLongitude,
        Field::BrowserFamily,
        Field::OsFamily,
        Field::DeviceType,
    ];

    /// Public name used in query parameters (`sortBy=geolocation.country`).
    pub fn name(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::FirstName => "fname",
            Field::LastName => "lname",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::State => "state",
            Field::Age => "age",
            Field::Beneficiary => "beneficiary",
            Field::IpAddress => "ip_address",
            Field::UserAgent => "user_agent",
            Field::TrustedFormCertUrl => "trusted_form_cert_url",
            Field::CaseType => "case_type",
            Field::OwnerId => "ownerid",
            Field::Campaign => "campaign",
            Field::OfferUrl => "offer_url",
            Field::Referrer => "referrer",
            Field::Status => "status",
            Field::QualityScore => "quality_score",
            Field::SubmissionDate => "submission_date",
            Field::CreatedAt => "created_at",
            Field::UpdatedAt => "updated_at",
            Field::GeoCountry => "geolocation.country",
            Field::GeoRegion => "geolocation.region",
            Field::GeoCity => "geolocation.city",
            Field::GeoZip => "geolocation.zip",
            Field::GeoLatitude => "geolocation.latitude",
            Field::GeoLongitude => "geolocation.longitude",
            Field::BrowserFamily => "browser_info.family",
            Field::OsFamily => "os_info.family",
            Field::DeviceType => "device_info.type",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Read the field from a stored record.
    pub fn value_of(&self, record: &Submission) -> FieldValue {
        let d = &record.data;
        match self {
            Field::Id => FieldValue::Int(record.id),
            Field::FirstName => FieldValue::text(&d.fname),
            Field::LastName => FieldValue::text(&d.lname),
            Field::Email => d
                .email
                .as_deref()
                .map(FieldValue::text)
                .unwrap_or(FieldValue::Null),
            Field::Phone => FieldValue::text(&d.phone),
            Field::State => FieldValue::text(&d.state),
            Field::Age => FieldValue::text(&d.age),
            Field::Beneficiary => FieldValue::text(&d.beneficiary),
            Field::IpAddress => FieldValue::text(&d.ip_address),
            Field::UserAgent => FieldValue::text(&d.user_agent),
            Field::TrustedFormCertUrl => FieldValue::text(&d.trusted_form_cert_url),
            Field::CaseType => FieldValue::text(&d.case_type),
            Field::OwnerId => FieldValue::text(&d.ownerid),
            Field::Campaign => FieldValue::text(&d.campaign),
            Field::OfferUrl => FieldValue::text(&d.offer_url),
            Field::Referrer => FieldValue::text(&d.referrer),
            Field::Status => FieldValue::text(d.status.as_str()),
            Field::QualityScore => FieldValue::Int(i64::from(d.quality_score)),
            Field::SubmissionDate => FieldValue::Timestamp(d.submission_date),
            Field::CreatedAt => FieldValue::Timestamp(record.created_at),
            Field::UpdatedAt => FieldValue::Timestamp(record.updated_at),
            Field::GeoCountry => FieldValue::text(&d.geolocation.country),
            Field::GeoRegion => FieldValue::text(&d.geolocation.region),
            Field::GeoCity => FieldValue::text(&d.geolocation.city),
            Field::GeoZip => FieldValue::text(&d.geolocation.zip),
            Field::GeoLatitude => FieldValue::Float(d.geolocation.latitude),
            Field::GeoLongitude => FieldValue::Float(d.geolocation.longitude),
            Field::BrowserFamily => FieldValue::text(&d.browser_info.family),
            Field::OsFamily => FieldValue::text(&d.os_info.family),
            Field::DeviceType => FieldValue::text(d.device_info.device_type.as_str()),
        }
    }
}

/// A scalar value read from, or compared against, a field.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn text(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Total order used for sorting: nulls first, then by variant payload.
    /// Numeric variants compare with each other.
    pub fn total_cmp(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Int(_) | FieldValue::Float(_) => 1,
            FieldValue::Text(_) => 2,
            FieldValue::Date(_) => 3,
            FieldValue::Timestamp(_) => 4,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldValue::Null => 0u8.hash(state),
            FieldValue::Text(s) => s.hash(state),
            FieldValue::Int(i) => (*i as f64).to_bits().hash(state),
            FieldValue::Float(f) => f.to_bits().hash(state),
            FieldValue::Timestamp(t) => t.hash(state),
            FieldValue::Date(d) => d.hash(state),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::text(s)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(t)
    }
}

/// One predicate. A `Filter` is the conjunction of its conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Field, FieldValue),
    NotEq(Field, FieldValue),
    In(Field, Vec<FieldValue>),
    Gte(Field, FieldValue),
    Lte(Field, FieldValue),
    /// Case-insensitive substring match.
    ContainsCi(Field, String),
    /// Disjunction of the inner conditions.
    AnyOf(Vec<Condition>),
}

impl Condition {
    pub fn matches(&self, record: &Submission) -> bool {
        match self {
            Condition::Eq(field, value) => &field.value_of(record) == value,
            // NULL never compares unequal, matching SQL three-valued logic.
            Condition::NotEq(field, value) => {
                let actual = field.value_of(record);
                !actual.is_null() && &actual != value
            }
            Condition::In(field, values) => {
                let actual = field.value_of(record);
                values.iter().any(|v| v == &actual)
            }
            Condition::Gte(field, value) => {
                let actual = field.value_of(record);
                !actual.is_null() && actual.total_cmp(value) != Ordering::Less
            }
            Condition::Lte(field, value) => {
                let actual = field.value_of(record);
                !actual.is_null() && actual.total_cmp(value) != Ordering::Greater
            }
            Condition::ContainsCi(field, needle) => match field.value_of(record).as_str() {
                Some(haystack) => haystack.to_lowercase().contains(&needle.to_lowercase()),
                None => false,
            },
            Condition::AnyOf(conditions) => conditions.iter().any(|c| c.matches(record)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn submitted_since(self, since: DateTime<Utc>) -> Self {
        self.and(Condition::Gte(Field::SubmissionDate, since.into()))
    }

    pub fn ids(self, ids: &[SubmissionId]) -> Self {
        self.and(Condition::In(
            Field::Id,
            ids.iter().map(|id| FieldValue::Int(*id)).collect(),
        ))
    }

    pub fn matches(&self, record: &Submission) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: Field,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: Field) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    /// Pagination for a 1-based page number.
    pub fn page(page: u64, limit: u64) -> Self {
        Self {
            offset: page.saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }

    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }
}

/// Grouping key for aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Field(Field),
    /// Calendar day (UTC) of the submission timestamp.
    SubmissionDay,
}

impl GroupKey {
    pub fn value_of(&self, record: &Submission) -> FieldValue {
        match self {
            GroupKey::Field(field) => field.value_of(record),
            GroupKey::SubmissionDay => FieldValue::Date(record.data.submission_date.date_naive()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    AvgQualityScore,
}

/// One output row of a grouped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: Vec<FieldValue>,
    pub count: u64,
    /// Present only when `Aggregate::AvgQualityScore` was requested.
    pub avg_quality_score: Option<f64>,
}

static NULL_VALUE: FieldValue = FieldValue::Null;

impl GroupRow {
    pub fn key(&self, index: usize) -> &FieldValue {
        self.keys.get(index).unwrap_or(&NULL_VALUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(Field::from_name("password"), None);
    }

    #[test]
    fn test_numeric_values_compare_across_variants() {
        assert_eq!(FieldValue::Int(0), FieldValue::Float(0.0));
        assert_eq!(
            FieldValue::Int(80).total_cmp(&FieldValue::Float(79.5)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(
            FieldValue::Null.total_cmp(&FieldValue::text("a")),
            Ordering::Less
        );
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }

    #[test]
    fn test_pagination_page() {
        assert_eq!(Pagination::page(1, 20).offset, 0);
        assert_eq!(Pagination::page(3, 20).offset, 40);
        assert_eq!(Pagination::page(0, 20).offset, 0);
    }
}
