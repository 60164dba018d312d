//! Record-level constraints.

use lazy_static::lazy_static;
use regex::Regex;

use crate::storage::models::NewSubmission;

lazy_static! {
    /// Email shape accepted by the submissions table.
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"
    ).unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Check the constraints a store enforces on create. Email may be absent,
/// but when present it must look like an address.
pub fn validate_new_submission(record: &NewSubmission) -> Result<(), String> {
    if let Some(email) = &record.email {
        if !is_valid_email(email) {
            return Err(format!("Validation isEmail on email failed: '{}'", email));
        }
    }
    Ok(())
}
