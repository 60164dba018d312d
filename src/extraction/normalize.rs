//! Field normalization rules.
//!
//! Pure string transforms shared by the normal and degraded paths. None of
//! these can fail.

use crate::storage::models::defaults;

/// Trim; blank becomes `default`.
pub fn or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

pub fn normalize_name(value: Option<&str>) -> String {
    or_default(value, defaults::UNKNOWN)
}

/// Trimmed, lower-cased; blank means absent.
pub fn normalize_email(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Digits only; nothing left means the placeholder number.
pub fn normalize_phone(value: Option<&str>) -> String {
    let digits: String = value
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        defaults::PHONE.to_string()
    } else {
        digits
    }
}

pub fn normalize_state(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_uppercase(),
        _ => defaults::STATE.to_string(),
    }
}
