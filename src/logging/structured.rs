//! Structured logging utilities.
//!
//! Log lines are `<prefix> EVENT key=value ...`, where the prefix comes from
//! `LogContext`.

use std::fmt;

use sha2::{Digest, Sha256};

/// Initialize the process-wide logger.
///
/// Safe to call repeatedly; only the first call installs the logger.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Request-scoped log prefix. The submission id is attached once the record
/// is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub request_id: String,
    pub operation: &'static str,
    pub submission_id: Option<i64>,
}

impl LogContext {
    pub fn new(request_id: &str, operation: &'static str) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation,
            submission_id: None,
        }
    }

    pub fn with_submission(&self, submission_id: i64) -> Self {
        Self {
            submission_id: Some(submission_id),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[request={} op={}", self.request_id, self.operation)?;
        if let Some(sid) = self.submission_id {
            write!(f, " submission={}", sid)?;
        }
        f.write_str("]")
    }
}

/// SHA256 of a payload, hex encoded. Lets log lines reference a payload
/// without writing its PII.
pub fn payload_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_prefix() {
        let ctx = LogContext::new("req-1a2b3c4d", "intake");
        assert_eq!(ctx.to_string(), "[request=req-1a2b3c4d op=intake]");

        let saved = ctx.with_submission(42);
        assert_eq!(saved.to_string(), "[request=req-1a2b3c4d op=intake submission=42]");
        assert_eq!(saved.operation, "intake");
        assert_eq!(ctx.submission_id, None);
    }

    #[test]
    fn test_payload_hash() {
        let hash = payload_hash(r#"{"fname":"Ada"}"#);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, payload_hash(r#"{"fname":"Ada"}"#));
        assert_ne!(hash, payload_hash(r#"{"fname":"Bob"}"#));
    }
}
