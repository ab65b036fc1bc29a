//! Choice lists for coded fields (status, priority, source, ...).
//!
//! Many fields are returned as numeric codes. `ChoiceCache` holds the
//! code/label pairs for those fields. It is an explicit value owned by the
//! caller and filled once, either from the form-fields endpoint via
//! [`ChoiceCache::load`] or manually via [`ChoiceCache::insert`].

use std::collections::HashMap;

use serde_json::Value;

use crate::config::Environment;
use crate::desk_client::DeskClient;
use crate::error::DeskError;

/// Endpoint listing the form fields and their choices.
const FORM_FIELDS_PATH: &str = "ticket_form_fields";

/// Envelope key of the form-field records.
const FORM_FIELDS_KEY: &str = "ticket_fields";

/// A code and its display label.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// The code stored on records.
    pub code: Value,
    /// The label shown to users.
    pub label: String,
}

/// Code/label lookups per field name.
#[derive(Debug, Clone, Default)]
pub struct ChoiceCache {
    fields: HashMap<String, Vec<Choice>>,
}

impl ChoiceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches every form field and caches the ones that carry choices.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying GET.
    pub async fn load(
        client: &DeskClient,
        environment: Option<Environment>,
    ) -> Result<Self, DeskError> {
        let records = client
            .get_all(FORM_FIELDS_PATH, Some(FORM_FIELDS_KEY), environment)
            .await?;

        let mut cache = Self::new();
        for record in &records {
            cache.insert_form_field(record);
        }

        tracing::debug!(fields = cache.fields.len(), "Loaded field choices");
        Ok(cache)
    }

    /// Caches the choices of one form-field record, if it has any.
    ///
    /// Accepts `choices` as a list of `{"id", "value"}` objects or as a
    /// `{label: code}` map.
    pub fn insert_form_field(&mut self, record: &Value) {
        let Some(name) = record.get("name").and_then(Value::as_str) else {
            return;
        };

        let choices: Vec<Choice> = match record.get("choices") {
            Some(Value::Array(items)) => items.iter().filter_map(choice_from_entry).collect(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(label, code)| Choice {
                    code: code.clone(),
                    label: label.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };

        if !choices.is_empty() {
            self.insert(name, choices);
        }
    }

    /// Replaces the choices for `field`.
    pub fn insert(&mut self, field: impl Into<String>, choices: Vec<Choice>) {
        self.fields.insert(field.into(), choices);
    }

    /// Returns true if nothing has been cached.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The choices cached for `field`.
    pub fn choices(&self, field: &str) -> Option<&[Choice]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Label for a code. Numeric codes match whether sent as numbers or strings.
    pub fn label(&self, field: &str, code: &Value) -> Option<&str> {
        self.choices(field)?
            .iter()
            .find(|choice| codes_match(&choice.code, code))
            .map(|choice| choice.label.as_str())
    }

    /// Code for a label, compared case-insensitively.
    pub fn code(&self, field: &str, label: &str) -> Option<&Value> {
        self.choices(field)?
            .iter()
            .find(|choice| choice.label.eq_ignore_ascii_case(label.trim()))
            .map(|choice| &choice.code)
    }

    /// Adds a `{field}_name` alias next to every coded field of `record`
    /// whose label is known. Records that are not objects are left alone.
    pub fn annotate(&self, record: &mut Value) {
        let Value::Object(map) = record else {
            return;
        };

        let labels: Vec<(String, String)> = map
            .iter()
            .filter_map(|(field, code)| {
                self.label(field, code)
                    .map(|label| (format!("{}_name", field), label.to_string()))
            })
            .collect();

        for (alias, label) in labels {
            map.entry(alias).or_insert(Value::String(label));
        }
    }
}

fn choice_from_entry(entry: &Value) -> Option<Choice> {
    let code = entry.get("id")?.clone();
    let label = entry
        .get("value")
        .or_else(|| entry.get("name"))
        .and_then(Value::as_str)?
        .to_string();
    Some(Choice { code, label })
}

fn codes_match(cached: &Value, code: &Value) -> bool {
    if cached == code {
        return true;
    }
    match (cached, code) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == s.trim()
        }
        _ => false,
    }
}
