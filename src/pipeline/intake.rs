//! Submission intake pipeline.
//!
//! Turns one raw form payload plus its request metadata into a stored,
//! enriched submission:
//! 1. Resolve and normalize the client IP
//! 2. Parse the user-agent (browser / OS / device identity)
//! 3. Classify the device type
//! 4. Offline geolocation lookup
//! 5. Build the record with field defaults and persist it
//!
//! Any failure in 1-5 triggers one degraded save built only from fields that
//! cannot fail to read. The two writes are independent: a primary write that
//! fails late may leave a record behind, in which case the degraded save adds
//! a second one.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::enrichment::{
    classify_device, normalize_ip, EnrichmentError, GeoLookup, UserAgentParser,
};
use crate::extraction::{
    normalize_email, normalize_name, normalize_phone, normalize_state, or_default, FormPayload,
    PayloadError, DEGRADED_TRUSTED_FORM_FIELDS, TRUSTED_FORM_FIELDS,
};
use crate::logging::structured::{payload_hash, LogContext};
use crate::storage::models::{
    defaults, DeviceInfo, Geolocation, NewSubmission, Status, SubmissionId, VersionInfo,
};
use crate::storage::store::{StoreError, SubmissionStore};
use crate::validation::record::is_valid_email;

use super::context::RequestContext;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds submission records from payloads. Does not touch the store.
#[derive(Clone)]
pub struct Enricher {
    geo: Arc<dyn GeoLookup>,
    user_agents: Arc<dyn UserAgentParser>,
}

impl Enricher {
    pub fn new(geo: Arc<dyn GeoLookup>, user_agents: Arc<dyn UserAgentParser>) -> Self {
        Self { geo, user_agents }
    }

    /// Full enrichment. Fails on malformed payloads and enrichment errors.
    pub fn build_submission(
        &self,
        body: &Value,
        ctx: &RequestContext,
        log_ctx: &LogContext,
    ) -> Result<NewSubmission, PipelineError> {
        // [1] CLIENT IP
        let raw_ip = ctx.raw_client_ip();
        let ip_address = normalize_ip(raw_ip);
        log::debug!(
            "{} CLIENT_IP_RESOLVED raw={:?} normalized={}",
            log_ctx,
            raw_ip,
            ip_address
        );

        // [2] USER AGENT
        let user_agent = ctx.user_agent();
        let parsed = self.user_agents.parse(user_agent)?;
        log::debug!(
            "{} UA_PARSED browser={:?} os={:?}",
            log_ctx,
            parsed.browser.family,
            parsed.os.family
        );

        // [3] DEVICE TYPE
        let device_type = classify_device(user_agent);

        // [4] GEOLOCATION
        let geo_record = self.geo.lookup(&ip_address)?;
        log::debug!(
            "{} GEO_LOOKUP ip={} found={}",
            log_ctx,
            ip_address,
            geo_record.is_some()
        );
        let geolocation = geo_record.unwrap_or_default().into_geolocation();

        // [5] RECORD
        let payload = FormPayload::resolve(body)?;
        let unknown = || defaults::UNKNOWN.to_string();
        let referrer = ctx.referrer().unwrap_or_default().to_string();

        Ok(NewSubmission {
            fname: normalize_name(payload.strict_str("fname")?),
            lname: normalize_name(payload.strict_str("lname")?),
            email: normalize_email(payload.strict_str("email")?),
            phone: normalize_phone(payload.strict_str("phone")?),
            state: normalize_state(payload.strict_str("state")?),
            age: or_default(payload.truthy_text("age").as_deref(), defaults::AGE),
            beneficiary: or_default(
                payload.truthy_text("beneficiary").as_deref(),
                defaults::BENEFICIARY,
            ),

            ip_address,
            user_agent: or_default(Some(user_agent), defaults::UNKNOWN),
            geolocation,
            browser_info: parsed.browser.to_info(),
            os_info: parsed.os.to_info(),
            device_info: DeviceInfo {
                family: parsed.device.family.unwrap_or_else(unknown),
                brand: parsed.device.brand.unwrap_or_else(unknown),
                model: parsed.device.model.unwrap_or_else(unknown),
                device_type,
            },

            trusted_form_cert_url: payload
                .first_truthy(&TRUSTED_FORM_FIELDS)
                .unwrap_or_else(|| defaults::TRUSTED_FORM_PENDING.to_string()),
            case_type: or_default(payload.truthy_text("case_type").as_deref(), defaults::CASE_TYPE),
            ownerid: or_default(payload.truthy_text("ownerid").as_deref(), defaults::OWNER_ID),
            campaign: payload.truthy_text("campaign").unwrap_or_default(),
            offer_url: payload
                .truthy_text("offer_url")
                .unwrap_or_else(|| referrer.clone()),
            referrer,
            submission_date: Utc::now(),

            status: Status::Pending,
            quality_score: 0,
        })
    }

    /// Minimal record for the degraded save. Every read here is infallible;
    /// `None` means the body holds no submission object at all.
    pub fn build_degraded(&self, body: &Value, ctx: &RequestContext) -> Option<NewSubmission> {
        let payload = FormPayload::resolve(body).ok()?;
        let text = |field: &str| payload.lenient_text(field);

        Some(NewSubmission {
            fname: normalize_name(text("fname").as_deref()),
            lname: normalize_name(text("lname").as_deref()),
            // A malformed address would fail the store constraint a second time.
            email: normalize_email(text("email").as_deref()).filter(|e| is_valid_email(e)),
            phone: normalize_phone(text("phone").as_deref()),
            state: normalize_state(text("state").as_deref()),
            age: or_default(payload.truthy_text("age").as_deref(), defaults::AGE),
            beneficiary: or_default(
                payload.truthy_text("beneficiary").as_deref(),
                defaults::BENEFICIARY,
            ),

            ip_address: normalize_ip(ctx.raw_client_ip()),
            user_agent: or_default(Some(ctx.user_agent()), defaults::UNKNOWN),
            geolocation: Geolocation::degraded(),
            browser_info: VersionInfo::default(),
            os_info: VersionInfo::default(),
            device_info: DeviceInfo::default(),

            trusted_form_cert_url: payload
                .first_truthy(&DEGRADED_TRUSTED_FORM_FIELDS)
                .unwrap_or_else(|| defaults::TRUSTED_FORM_PENDING.to_string()),
            case_type: defaults::CASE_TYPE.to_string(),
            ownerid: defaults::OWNER_ID.to_string(),
            campaign: String::new(),
            offer_url: String::new(),
            referrer: String::new(),
            submission_date: Utc::now(),

            status: Status::Pending,
            quality_score: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response body returned to the submitting client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<SubmissionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happened to one intake request.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Stored {
        submission_id: SubmissionId,
    },
    /// The normal path failed. `fallback_submission_id` is set when the
    /// degraded save succeeded.
    Failed {
        error: String,
        fallback_submission_id: Option<SubmissionId>,
    },
}

pub const SUCCESS_MESSAGE: &str = "Submission received successfully";
pub const FAILURE_MESSAGE: &str = "Submission failed. Please try again.";

impl IntakeOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, IntakeOutcome::Stored { .. })
    }

    pub fn http_status(&self) -> u16 {
        match self {
            IntakeOutcome::Stored { .. } => 200,
            IntakeOutcome::Failed { .. } => 500,
        }
    }

    /// The original error message is always included on failure.
    pub fn response(&self) -> IntakeResponse {
        match self {
            IntakeOutcome::Stored { submission_id } => IntakeResponse {
                status: ResponseStatus::Success,
                message: SUCCESS_MESSAGE.to_string(),
                submission_id: Some(*submission_id),
                error: None,
            },
            IntakeOutcome::Failed { error, .. } => IntakeResponse {
                status: ResponseStatus::Error,
                message: FAILURE_MESSAGE.to_string(),
                submission_id: None,
                error: Some(error.clone()),
            },
        }
    }
}

/// Enrich-and-persist pipeline. Cheap to clone and share across requests;
/// holds no per-request state.
#[derive(Clone)]
pub struct IntakePipeline {
    enricher: Enricher,
    store: Arc<dyn SubmissionStore>,
}

impl IntakePipeline {
    pub fn new(enricher: Enricher, store: Arc<dyn SubmissionStore>) -> Self {
        Self { enricher, store }
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    /// Process one submission. Never panics and never returns an error: all
    /// failures are folded into `IntakeOutcome::Failed`.
    pub fn submit(&self, body: &Value, ctx: &RequestContext) -> IntakeOutcome {
        let log_ctx = ctx.log_context("intake");
        log::info!("{} SUBMISSION_RECEIVED", log_ctx);

        match self.save_enriched(body, ctx, &log_ctx) {
            Ok(submission_id) => IntakeOutcome::Stored { submission_id },
            Err(error) => {
                log::error!("{} SUBMISSION_FAILED error={}", log_ctx, error);
                let fallback_submission_id = self.save_degraded(body, ctx, &log_ctx);
                IntakeOutcome::Failed {
                    error: error.to_string(),
                    fallback_submission_id,
                }
            }
        }
    }

    fn save_enriched(
        &self,
        body: &Value,
        ctx: &RequestContext,
        log_ctx: &LogContext,
    ) -> Result<SubmissionId, PipelineError> {
        let record = self.enricher.build_submission(body, ctx, log_ctx)?;
        let stored = self.store.create(record)?;

        let saved_ctx = log_ctx.with_submission(stored.id);
        log::info!(
            "{} SUBMISSION_SAVED location=\"{}, {}\" device={} quality_score={}",
            saved_ctx,
            stored.data.geolocation.city,
            stored.data.geolocation.country,
            stored.data.device_info.device_type.as_str(),
            stored.data.quality_score
        );
        Ok(stored.id)
    }

    /// Single degraded save attempt. Its own failure is logged and swallowed.
    fn save_degraded(
        &self,
        body: &Value,
        ctx: &RequestContext,
        log_ctx: &LogContext,
    ) -> Option<SubmissionId> {
        let hash = payload_hash(&body.to_string());

        let record = match self.enricher.build_degraded(body, ctx) {
            Some(record) => record,
            None => {
                log::warn!(
                    "{} DEGRADED_SAVE_SKIPPED reason=no_submission_object payload_hash={}",
                    log_ctx,
                    hash
                );
                return None;
            }
        };

        log::info!("{} DEGRADED_SAVE_ATTEMPT payload_hash={}", log_ctx, hash);
        match self.store.create(record) {
            Ok(stored) => {
                log::info!(
                    "{} DEGRADED_SAVE_OK payload_hash={}",
                    log_ctx.with_submission(stored.id),
                    hash
                );
                Some(stored.id)
            }
            Err(e) => {
                log::error!(
                    "{} DEGRADED_SAVE_FAILED payload_hash={} error={}",
                    log_ctx,
                    hash,
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{GeoRecord, OfflineGeoTable, RegexUserAgentParser};
    use crate::storage::memory::MemoryStore;
    use serde_json::json;

    struct FailingGeo;

    impl GeoLookup for FailingGeo {
        fn lookup(&self, _ip: &str) -> Result<Option<GeoRecord>, EnrichmentError> {
            Err(EnrichmentError::GeoLookup("table corrupted".to_string()))
        }
    }

    fn pipeline_with(geo: Arc<dyn GeoLookup>) -> (IntakePipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let enricher = Enricher::new(geo, Arc::new(RegexUserAgentParser::new()));
        (IntakePipeline::new(enricher, store.clone()), store)
    }

    fn pipeline() -> (IntakePipeline, Arc<MemoryStore>) {
        pipeline_with(Arc::new(OfflineGeoTable::new()))
    }

    #[test]
    fn test_empty_object_gets_all_defaults() {
        let (pipeline, store) = pipeline();
        let outcome = pipeline.submit(&json!({}), &RequestContext::new());
        assert_eq!(outcome, IntakeOutcome::Stored { submission_id: 1 });

        let record = &store.snapshot()[0].data;
        assert_eq!(record.fname, "Unknown");
        assert_eq!(record.lname, "Unknown");
        assert_eq!(record.email, None);
        assert_eq!(record.phone, "0000000000");
        assert_eq!(record.state, "XX");
        assert_eq!(record.age, "0");
        assert_eq!(record.beneficiary, "other");
        assert_eq!(record.ip_address, "127.0.0.1");
        assert_eq!(record.user_agent, "Unknown");
        assert_eq!(record.trusted_form_cert_url, "https://cert.trustedform.com/pending");
        assert_eq!(record.case_type, "Final Expense");
        assert_eq!(record.status, Status::Pending);
        assert_eq!(record.quality_score, 0);
        assert_eq!(record.geolocation, Geolocation::default());
        assert_eq!(record.device_info.device_type, crate::storage::models::DeviceType::Desktop);
    }

    #[test]
    fn test_array_payload_uses_first_element() {
        let (pipeline, store) = pipeline();
        let body = json!([{"fname": " Ada ", "email": " ADA@Example.com", "phone": "(555) 010-9999", "state": "tx"}]);
        assert!(pipeline.submit(&body, &RequestContext::new()).is_stored());

        let record = &store.snapshot()[0].data;
        assert_eq!(record.fname, "Ada");
        assert_eq!(record.email.as_deref(), Some("ada@example.com"));
        assert_eq!(record.phone, "5550109999");
        assert_eq!(record.state, "TX");
    }

    #[test]
    fn test_offer_url_falls_back_to_referrer() {
        let (pipeline, store) = pipeline();
        let ctx = RequestContext::new().with_header("Referer", "https://lp.example.com/a");
        pipeline.submit(&json!({"fname": "Ada"}), &ctx);

        let record = &store.snapshot()[0].data;
        assert_eq!(record.offer_url, "https://lp.example.com/a");
        assert_eq!(record.referrer, "https://lp.example.com/a");
    }

    #[test]
    fn test_wrong_field_type_takes_degraded_path() {
        let (pipeline, store) = pipeline();
        let body = json!({"fname": "Ada", "phone": 5550109999u64, "xxTrustedFormCertUrl": "https://cert.trustedform.com/abc"});
        let outcome = pipeline.submit(&body, &RequestContext::new());

        match &outcome {
            IntakeOutcome::Failed { error, fallback_submission_id } => {
                assert!(error.contains("phone"));
                assert_eq!(*fallback_submission_id, Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(outcome.http_status(), 500);

        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data.phone, "5550109999");
        assert_eq!(records[0].data.geolocation.zip, "00000");
        assert_eq!(records[0].data.trusted_form_cert_url, "https://cert.trustedform.com/abc");
    }

    #[test]
    fn test_geo_failure_saves_one_degraded_record() {
        let (pipeline, store) = pipeline_with(Arc::new(FailingGeo));
        let ctx = RequestContext::new()
            .with_header("x-forwarded-for", "::ffff:203.0.113.5")
            .with_header("user-agent", "Mozilla/5.0 (iPhone)");
        let outcome = pipeline.submit(&json!({"fname": "Ada", "email": "ada@example.com"}), &ctx);

        let response = outcome.response();
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.message, FAILURE_MESSAGE);
        assert!(response.error.unwrap().contains("table corrupted"));

        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data.fname, "Ada");
        assert_eq!(records[0].data.ip_address, "203.0.113.5");
        assert_eq!(records[0].data.user_agent, "Mozilla/5.0 (iPhone)");
        assert_eq!(records[0].data.browser_info, VersionInfo::default());
    }

    #[test]
    fn test_degraded_record_drops_malformed_email() {
        let (pipeline, _) = pipeline();
        let ctx = RequestContext::new();

        let record = pipeline
            .enricher()
            .build_degraded(&json!({"fname": "Grace", "email": "grace@@example"}), &ctx)
            .unwrap();
        assert_eq!(record.email, None);
        assert_eq!(record.fname, "Grace");

        let record = pipeline
            .enricher()
            .build_degraded(&json!({"email": " Grace@Example.com "}), &ctx)
            .unwrap();
        assert_eq!(record.email.as_deref(), Some("grace@example.com"));
    }

    #[test]
    fn test_both_writes_fail() {
        let (pipeline, store) = pipeline();
        store.fail_next_creates(2);
        let outcome = pipeline.submit(&json!({"fname": "Ada"}), &RequestContext::new());
        assert_eq!(
            outcome,
            IntakeOutcome::Failed {
                error: "record store unavailable: injected create failure".to_string(),
                fallback_submission_id: None,
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_object_body_skips_degraded_save() {
        let (pipeline, store) = pipeline();
        let outcome = pipeline.submit(&json!([]), &RequestContext::new());
        assert!(!outcome.is_stored());
        assert!(store.is_empty());
    }

    #[test]
    fn test_response_serialization() {
        let stored = IntakeOutcome::Stored { submission_id: 7 }.response();
        assert_eq!(
            serde_json::to_value(stored).unwrap(),
            json!({"status": "SUCCESS", "message": SUCCESS_MESSAGE, "submissionId": 7})
        );
    }
}
