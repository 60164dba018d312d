//! LeadLens Core - lead submission intake and analytics
//!
//! This crate turns raw lead-form submissions into enriched, persisted
//! records and aggregates those records into dashboards, funnels, map data
//! and exports. The implementation prioritizes:
//!
//! 1. **Durability** - A failed enrichment still stores a degraded record
//! 2. **Logging** - Every decision point logged with request context
//! 3. **Typed queries** - Filters and groupings address fields through enums
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `pipeline` - Intake orchestrator and degraded fallback save
//! - `enrichment` - Client IP, user-agent, device class, offline geolocation
//! - `extraction` - Payload shape resolution and field normalization
//! - `validation` - Record constraints and request parameter parsing
//! - `storage` - Record schema, store contract, in-memory store, SQL builders
//! - `analytics` - Dashboard, funnel, map, listing, export, workflow updates
//! - `config` - Environment-driven settings
//! - `logging` - Structured logging with request context
//!
//! Python bindings are built with the `python` feature.

pub mod analytics;
pub mod config;
pub mod enrichment;
pub mod extraction;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod validation;

#[cfg(feature = "python")]
mod python;

pub use analytics::{AnalyticsEngine, AnalyticsError};
pub use config::CoreConfig;
pub use pipeline::{Enricher, IntakeOutcome, IntakePipeline, RequestContext};
pub use storage::{MemoryStore, SubmissionStore};

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;

    use crate::storage::models::{
        DeviceInfo, DeviceType, Geolocation, NewSubmission, Status, VersionInfo,
    };

    /// A fully populated, valid submission.
    pub fn sample_submission() -> NewSubmission {
        NewSubmission {
            fname: "Ada".to_string(),
            lname: "Lovelace".to_string(),
            email: Some("ada@example.com".to_string()),
            phone: "5550109999".to_string(),
            state: "TX".to_string(),
            age: "67".to_string(),
            beneficiary: "spouse".to_string(),
            ip_address: "203.0.113.5".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.6099.110".to_string(),
            geolocation: Geolocation {
                country: "United States".to_string(),
                country_code: "US".to_string(),
                region: "Texas".to_string(),
                region_code: "TX".to_string(),
                city: "Austin".to_string(),
                zip: "73301".to_string(),
                latitude: 30.2672,
                longitude: -97.7431,
                timezone: "America/Chicago".to_string(),
                ..Geolocation::default()
            },
            browser_info: VersionInfo {
                family: "Chrome".to_string(),
                version: "120.0.6099".to_string(),
                major: "120".to_string(),
            },
            os_info: VersionInfo {
                family: "Windows".to_string(),
                version: "10.0".to_string(),
                major: "10".to_string(),
            },
            device_info: DeviceInfo {
                device_type: DeviceType::Desktop,
                ..DeviceInfo::default()
            },
            trusted_form_cert_url: "https://cert.trustedform.com/abc123".to_string(),
            case_type: "Final Expense".to_string(),
            ownerid: "005TR00000CDuezYAD".to_string(),
            campaign: "spring".to_string(),
            offer_url: "https://lp.example.com/offer".to_string(),
            referrer: "https://lp.example.com/offer".to_string(),
            submission_date: Utc::now(),
            status: Status::Pending,
            quality_score: 72,
        }
    }
}
