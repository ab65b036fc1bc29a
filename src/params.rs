//! Builders used by resource wrappers to turn typed parameters into paths,
//! query strings and request bodies.
//!
//! Absent values are never emitted: `push_opt` and `set_opt` drop `None`
//! instead of serializing a null or an empty key.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::desk_client::RequestBody;
use crate::error::DeskError;
use crate::multipart::MultipartForm;

/// Validates that an ID is a numeric string before it is interpolated into a path.
///
/// This prevents path traversal or query injection via malformed IDs.
///
/// # Errors
///
/// Returns `DeskError::Validation` if the ID is empty or contains non-digit characters.
pub fn validate_id(id: &str, field_name: &str) -> Result<(), DeskError> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DeskError::validation(format!(
            "{} must be a numeric string, got: {:?}",
            field_name,
            id.chars().take(50).collect::<String>()
        )));
    }
    Ok(())
}

/// Ordered query-string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn push(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.pairs.push((key.into(), value.to_string()));
        self
    }

    /// Appends a parameter only when a value is present.
    pub fn push_opt<T: ToString>(self, key: impl Into<String>, value: Option<T>) -> Self {
        match value {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    /// Returns true if no parameter has been added.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Encodes the parameters as `k=v&k=v`.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Appends the parameters to `path`, respecting an existing query string.
    pub fn apply(&self, path: &str) -> String {
        if self.is_empty() {
            return path.to_string();
        }
        let separator = if path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", path, separator, self.to_query_string())
    }
}

/// A JSON object builder that omits absent fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    map: Map<String, Value>,
}

impl Fields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::Serialization` if the value cannot be represented as JSON.
    pub fn set<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Result<Self, DeskError> {
        self.map.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Sets a field only when a value is present.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::Serialization` if the value cannot be represented as JSON.
    pub fn set_opt<T: Serialize>(
        self,
        key: impl Into<String>,
        value: Option<T>,
    ) -> Result<Self, DeskError> {
        match value {
            Some(value) => self.set(key, value),
            None => Ok(self),
        }
    }

    /// Returns true if no field has been set.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The fields as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }

    /// The fields wrapped under `root`, e.g. `{"ticket": {...}}`.
    pub fn wrap(self, root: impl Into<String>) -> Value {
        let mut envelope = Map::new();
        envelope.insert(root.into(), Value::Object(self.map));
        Value::Object(envelope)
    }

    /// A JSON request body.
    pub fn into_json_body(self) -> RequestBody {
        RequestBody::Json(self.into_value())
    }

    /// A multipart request body carrying the fields plus the attachments,
    /// each sent as a file part named `attachment_field`.
    pub fn into_multipart_body<I>(self, attachment_field: &str, attachments: I) -> RequestBody
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let form = attachments
            .into_iter()
            .fold(MultipartForm::from_fields(&self.map), |form, (filename, content)| {
                form.file(attachment_field, filename, content)
            });
        RequestBody::Multipart(form.into_body())
    }
}
