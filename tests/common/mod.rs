//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use leadlens_core::config::AnalyticsConfig;
use leadlens_core::storage::{
    DeviceInfo, DeviceType, Geolocation, NewSubmission, Status, SubmissionStore, VersionInfo,
};
use leadlens_core::{AnalyticsEngine, MemoryStore};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A valid submission located in `city, country`.
pub fn lead(fname: &str, city: &str, country: &str) -> NewSubmission {
    NewSubmission {
        fname: fname.to_string(),
        lname: "Tester".to_string(),
        email: Some(format!("{}@example.com", fname.to_lowercase())),
        phone: "5550100000".to_string(),
        state: "TX".to_string(),
        age: "60".to_string(),
        beneficiary: "other".to_string(),
        ip_address: "203.0.113.5".to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        geolocation: Geolocation {
            country: country.to_string(),
            city: city.to_string(),
            latitude: 30.2672,
            longitude: -97.7431,
            ..Geolocation::default()
        },
        browser_info: VersionInfo::default(),
        os_info: VersionInfo::default(),
        device_info: DeviceInfo {
            device_type: DeviceType::Desktop,
            ..DeviceInfo::default()
        },
        trusted_form_cert_url: "https://cert.trustedform.com/pending".to_string(),
        case_type: "Final Expense".to_string(),
        ownerid: "005TR00000CDuezYAD".to_string(),
        campaign: String::new(),
        offer_url: String::new(),
        referrer: String::new(),
        submission_date: now(),
        status: Status::Pending,
        quality_score: 0,
    }
}

pub struct LeadBuilder(NewSubmission);

impl LeadBuilder {
    pub fn new(fname: &str) -> Self {
        Self(lead(fname, "Austin", "United States"))
    }

    pub fn located(mut self, city: &str, country: &str, lat: f64, lng: f64) -> Self {
        self.0.geolocation.city = city.to_string();
        self.0.geolocation.country = country.to_string();
        self.0.geolocation.latitude = lat;
        self.0.geolocation.longitude = lng;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.0.status = status;
        self
    }

    pub fn score(mut self, score: i32) -> Self {
        self.0.quality_score = score;
        self
    }

    pub fn device(mut self, device_type: DeviceType) -> Self {
        self.0.device_info.device_type = device_type;
        self
    }

    pub fn days_ago(mut self, days: i64) -> Self {
        self.0.submission_date = now() - Duration::days(days);
        self
    }

    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.0.submission_date = when;
        self
    }

    pub fn build(self) -> NewSubmission {
        self.0
    }
}

pub fn store_with(records: Vec<NewSubmission>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for record in records {
        store.create(record).expect("seed record");
    }
    store
}

pub fn engine(store: Arc<MemoryStore>) -> AnalyticsEngine {
    AnalyticsEngine::new(store, AnalyticsConfig::default())
}
