//! Field-by-field access to a JSON object body.
//!
//! Write payloads are read through [`Form`] instead of a typed struct so that a missing or
//! malformed value becomes an entry in [`FieldErrors`] rather than a whole-body rejection.

use serde_json::{Map, Value};

use crate::web::error::{AppError, FieldErrors};

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const NOT_A_STRING: &str = "Not a valid string.";
pub const NOT_AN_INTEGER: &str = "A valid integer is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

pub struct Form {
    inner: Map<String, Value>,
}

impl Form {
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        match value {
            Value::Object(inner) => Ok(Self { inner }),
            _ => Err(AppError::InvalidInput("Expected a JSON object.".to_string())),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// The raw value under `key`. Absent keys are reported as required when `presence` says so;
    /// explicit nulls are always reported.
    pub fn value(&self, key: &str, presence: Presence, errors: &mut FieldErrors) -> Option<&Value> {
        match self.inner.get(key) {
            None => {
                if presence == Presence::Required {
                    errors.add(key, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                errors.add(key, NOT_NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    /// A non-blank string, trimmed.
    pub fn text(&self, key: &str, presence: Presence, errors: &mut FieldErrors) -> Option<String> {
        let value = self.value(key, presence, errors)?;
        match value.as_str().map(str::trim) {
            Some("") => {
                errors.add(key, NOT_BLANK);
                None
            }
            Some(text) => Some(text.to_string()),
            None => {
                errors.add(key, NOT_A_STRING);
                None
            }
        }
    }

    pub fn integer(&self, key: &str, presence: Presence, errors: &mut FieldErrors) -> Option<i64> {
        let value = self.value(key, presence, errors)?;
        let parsed = as_integer(value);
        if parsed.is_none() {
            errors.add(key, NOT_AN_INTEGER);
        }
        parsed
    }
}

/// Integers arrive either as JSON numbers or as numeric strings.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
