//! Raw submission payload access.
//!
//! Clients post either a single object or an array whose first element is
//! the submission. Fields are optional; the strict accessors reject values
//! of the wrong JSON type, the lenient ones coerce anything printable.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("payload must be an object or a non-empty array of objects, got {0}")]
    NotAnObject(&'static str),

    #[error("payload array is empty")]
    EmptyArray,

    #[error("field '{field}' must be a {expected}, got {found}")]
    InvalidField {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Trusted-form certificate field names, in fallback order.
pub const TRUSTED_FORM_FIELDS: [&str; 3] = [
    "xxTrustedFormCertUrl",
    "Trusted_Form_Alt",
    "trusted_form_cert_url",
];

/// Reduced fallback chain used by the degraded save.
pub const DEGRADED_TRUSTED_FORM_FIELDS: [&str; 1] = ["xxTrustedFormCertUrl"];

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert a JSON scalar to text. Null and empty containers yield nothing.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => Some(value.to_string()),
    }
}

/// JavaScript-style truthiness, which decides whether a client value
/// overrides a default.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A resolved submission payload.
#[derive(Debug, Clone, Copy)]
pub struct FormPayload<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> FormPayload<'a> {
    /// Resolve the submission object from a request body.
    pub fn resolve(body: &'a Value) -> Result<Self, PayloadError> {
        match body {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Array(items) => match items.first() {
                Some(Value::Object(fields)) => Ok(Self { fields }),
                Some(other) => Err(PayloadError::NotAnObject(kind(other))),
                None => Err(PayloadError::EmptyArray),
            },
            other => Err(PayloadError::NotAnObject(kind(other))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field)
    }

    /// String field; absent or null is `None`, other types are an error.
    pub fn strict_str(&self, field: &str) -> Result<Option<&'a str>, PayloadError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(PayloadError::InvalidField {
                field: field.to_string(),
                expected: "string",
                found: kind(other),
            }),
        }
    }

    /// Any scalar coerced to text.
    pub fn lenient_text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(value_to_text)
    }

    /// Text of a truthy value, or `None`.
    pub fn truthy_text(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .filter(|v| is_truthy(v))
            .and_then(value_to_text)
    }

    /// First truthy value among `fields`.
    pub fn first_truthy(&self, fields: &[&str]) -> Option<String> {
        fields.iter().find_map(|f| self.truthy_text(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_object_and_array() {
        let body = json!({"fname": "Ada"});
        assert!(FormPayload::resolve(&body).is_ok());

        let body = json!([{"fname": "Ada"}, {"fname": "ignored"}]);
        let payload = FormPayload::resolve(&body).unwrap();
        assert_eq!(payload.strict_str("fname"), Ok(Some("Ada")));
    }

    #[test]
    fn test_resolve_rejects_non_objects() {
        assert_eq!(
            FormPayload::resolve(&json!([])).unwrap_err(),
            PayloadError::EmptyArray
        );
        assert_eq!(
            FormPayload::resolve(&json!("fname=Ada")).unwrap_err(),
            PayloadError::NotAnObject("string")
        );
        assert_eq!(
            FormPayload::resolve(&json!([42])).unwrap_err(),
            PayloadError::NotAnObject("number")
        );
    }

    #[test]
    fn test_strict_str_rejects_numbers() {
        let body = json!({"phone": 5551234567u64, "email": null});
        let payload = FormPayload::resolve(&body).unwrap();
        assert!(payload.strict_str("phone").is_err());
        assert_eq!(payload.strict_str("email"), Ok(None));
        assert_eq!(payload.strict_str("missing"), Ok(None));
    }

    #[test]
    fn test_lenient_and_truthy() {
        let body = json!({"age": 65, "zero": 0, "empty": "", "flag": true});
        let payload = FormPayload::resolve(&body).unwrap();
        assert_eq!(payload.lenient_text("age"), Some("65".to_string()));
        assert_eq!(payload.truthy_text("zero"), None);
        assert_eq!(payload.truthy_text("empty"), None);
        assert_eq!(payload.truthy_text("flag"), Some("true".to_string()));
    }

    #[test]
    fn test_first_truthy_follows_order() {
        let body = json!({
            "xxTrustedFormCertUrl": "",
            "Trusted_Form_Alt": "https://cert.trustedform.com/alt",
            "trusted_form_cert_url": "https://cert.trustedform.com/plain"
        });
        let payload = FormPayload::resolve(&body).unwrap();
        assert_eq!(
            payload.first_truthy(&TRUSTED_FORM_FIELDS),
            Some("https://cert.trustedform.com/alt".to_string())
        );
        assert_eq!(payload.first_truthy(&DEGRADED_TRUSTED_FORM_FIELDS), None);
    }
}
