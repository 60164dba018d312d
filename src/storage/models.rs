//! Persisted record schema.
//!
//! `Submission` is the single stored entity. Nested enrichment objects are
//! fixed-shape records with explicit per-field defaults so that aggregation
//! can rely on their shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SubmissionId = i64;

/// Placeholder values applied when a payload omits a field or sends it blank.
pub mod defaults {
    pub const UNKNOWN: &str = "Unknown";
    pub const PHONE: &str = "0000000000";
    pub const STATE: &str = "XX";
    pub const AGE: &str = "0";
    pub const BENEFICIARY: &str = "other";
    pub const IP_ADDRESS: &str = "127.0.0.1";
    pub const COUNTRY_CODE: &str = "XX";
    pub const DEGRADED_ZIP: &str = "00000";
    pub const TRUSTED_FORM_PENDING: &str = "https://cert.trustedform.com/pending";
    pub const CASE_TYPE: &str = "Final Expense";
    pub const OWNER_ID: &str = "005TR00000CDuezYAD";
}

/// Workflow status of a submission.
///
/// Any status may be set from any other; there is no transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processed,
    Contacted,
    Qualified,
    Rejected,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::Processed,
        Status::Contacted,
        Status::Qualified,
        Status::Rejected,
    ];

    /// Ordered funnel stages. `Rejected` is not part of the funnel.
    pub const FUNNEL: [Status; 4] = [
        Status::Pending,
        Status::Processed,
        Status::Contacted,
        Status::Qualified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processed => "processed",
            Status::Contacted => "contacted",
            Status::Qualified => "qualified",
            Status::Rejected => "rejected",
        }
    }

    pub fn valid_values() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid status '{}'", s))
    }
}

/// Device class derived from the raw user-agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Desktop => "desktop",
        }
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Desktop
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_code: String,
    pub city: String,
    pub zip: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub isp: String,
    pub org: String,
}

impl Default for Geolocation {
    fn default() -> Self {
        Self {
            country: defaults::UNKNOWN.to_string(),
            country_code: defaults::COUNTRY_CODE.to_string(),
            region: defaults::UNKNOWN.to_string(),
            region_code: String::new(),
            city: defaults::UNKNOWN.to_string(),
            zip: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            timezone: String::new(),
            isp: String::new(),
            org: String::new(),
        }
    }
}

impl Geolocation {
    /// Geolocation written by the degraded save path.
    pub fn degraded() -> Self {
        Self {
            zip: defaults::DEGRADED_ZIP.to_string(),
            ..Self::default()
        }
    }

    /// Whether both coordinates are set to something other than zero.
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude != 0.0
            && self.longitude != 0.0
    }
}

/// Family/version/major triple used for both browser and OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub family: String,
    pub version: String,
    pub major: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            family: defaults::UNKNOWN.to_string(),
            version: defaults::UNKNOWN.to_string(),
            major: defaults::UNKNOWN.to_string(),
        }
    }
}

pub type BrowserInfo = VersionInfo;
pub type OsInfo = VersionInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub family: String,
    pub brand: String,
    pub model: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            family: defaults::UNKNOWN.to_string(),
            brand: defaults::UNKNOWN.to_string(),
            model: defaults::UNKNOWN.to_string(),
            device_type: DeviceType::Desktop,
        }
    }
}

/// A submission ready to be created. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub fname: String,
    pub lname: String,
    pub email: Option<String>,
    pub phone: String,
    pub state: String,
    pub age: String,
    pub beneficiary: String,

    pub ip_address: String,
    pub user_agent: String,
    pub geolocation: Geolocation,
    pub browser_info: BrowserInfo,
    pub os_info: OsInfo,
    pub device_info: DeviceInfo,

    pub trusted_form_cert_url: String,
    pub case_type: String,
    pub ownerid: String,
    pub campaign: String,
    pub offer_url: String,
    pub referrer: String,
    pub submission_date: DateTime<Utc>,

    pub status: Status,
    pub quality_score: i32,
}

/// A persisted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(flatten)]
    pub data: NewSubmission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn from_new(id: SubmissionId, data: NewSubmission, now: DateTime<Utc>) -> Self {
        Self {
            id,
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of workflow fields. Identity and enrichment data are immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownerid: Option<String>,
}

impl SubmissionPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.quality_score.is_none()
            && self.campaign.is_none()
            && self.case_type.is_none()
            && self.ownerid.is_none()
    }

    pub fn apply(&self, record: &mut NewSubmission) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(score) = self.quality_score {
            record.quality_score = score;
        }
        if let Some(campaign) = &self.campaign {
            record.campaign = campaign.clone();
        }
        if let Some(case_type) = &self.case_type {
            record.case_type = case_type.clone();
        }
        if let Some(ownerid) = &self.ownerid {
            record.ownerid = ownerid.clone();
        }
    }
}
