//! Response envelope handling shared by every endpoint.
//!
//! Responses wrap their payload under a resource-named key
//! (`{"ticket": {...}}`, `{"agents": [...], "total": 120}`); these helpers
//! parse the body, project a field out of it and read the failure body of a
//! 400.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeskError, FieldError};

/// A single record from a response.
pub type Record = Value;

/// Parses a response body, treating an empty body as `null`.
///
/// # Errors
///
/// Returns `DeskError::Serialization` if the body is not valid JSON.
pub fn parse_body(body: &str) -> Result<Value, DeskError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(body)?)
}

/// Extracts the value at `field`, or the whole body when no field is named.
pub fn project(body: Value, field: Option<&str>) -> Value {
    match (field, body) {
        (None, body) => body,
        (Some(field), Value::Object(mut map)) => map.remove(field).unwrap_or(Value::Null),
        (Some(_), _) => Value::Null,
    }
}

/// Splits a projected value into records: arrays contribute each element,
/// `null` contributes nothing and anything else is a single record.
pub fn into_records(value: Value) -> Vec<Record> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// The `total` count some list responses carry instead of a Link header.
pub fn total_count(body: &Value) -> Option<u64> {
    body.get("total").and_then(Value::as_u64)
}

/// Body of a 400 response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorEnvelope {
    /// General description, e.g. "Validation failed".
    #[serde(default)]
    pub description: Option<String>,

    /// Per-field descriptors.
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl ErrorEnvelope {
    /// Parses a 400 body; `None` when it is not a JSON object with field errors.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .filter(|envelope| !envelope.errors.is_empty())
    }
}
