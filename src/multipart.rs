//! multipart/form-data encoding for requests that carry attachments.
//!
//! The body is encoded up front into a byte buffer so the exact same bytes
//! can be re-sent when a rate-limited request is retried.

use serde_json::{Map, Value};

/// Content type of every file part.
const FILE_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq)]
enum PartData {
    Text(String),
    File { filename: String, content: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
struct Part {
    name: String,
    data: PartData,
}

/// An ordered set of form-data parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    parts: Vec<Part>,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a form from a JSON object of scalar, array and nested fields.
    ///
    /// Strings are sent as-is, numbers and booleans as their JSON text, nulls
    /// are skipped, arrays become repeated parts and nested objects are
    /// flattened to `parent[child]` names.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut form = Self::new();
        for (name, value) in fields {
            form.push_value(name.clone(), value);
        }
        form
    }

    fn push_value(&mut self, name: String, value: &Value) {
        match value {
            Value::Null => {}
            Value::String(s) => self.push_text(name, s.clone()),
            Value::Array(items) => {
                for item in items {
                    self.push_value(name.clone(), item);
                }
            }
            Value::Object(map) => {
                for (key, nested) in map {
                    self.push_value(format!("{}[{}]", name, key), nested);
                }
            }
            Value::Bool(_) | Value::Number(_) => self.push_text(name, value.to_string()),
        }
    }

    fn push_text(&mut self, name: String, value: String) {
        self.parts.push(Part {
            name,
            data: PartData::Text(value),
        });
    }

    /// Adds a scalar field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_text(name.into(), value.into());
        self
    }

    /// Adds one part per value, all sharing `name`.
    pub fn texts<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        for value in values {
            self.push_text(name.clone(), value.into());
        }
        self
    }

    /// Adds a file attachment.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            data: PartData::File {
                filename: filename.into(),
                content: content.into(),
            },
        });
        self
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the form has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Encodes the form with the given boundary.
    pub fn encode(&self, boundary: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            match &part.data {
                PartData::Text(value) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(&part.name)
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                PartData::File { filename, content } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: {}\r\n\r\n",
                            escape_quoted(&part.name),
                            escape_quoted(filename),
                            FILE_CONTENT_TYPE
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(content);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        out
    }

    /// Encodes the form with a freshly generated boundary.
    pub fn into_body(self) -> MultipartBody {
        let boundary = uuid::Uuid::new_v4().to_string();
        let bytes = self.encode(&boundary);
        MultipartBody { boundary, bytes }
    }
}

/// Header values cannot carry raw quotes or line breaks.
fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

/// An encoded multipart body and the boundary it was encoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartBody {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartBody {
    /// The boundary token.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The encoded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Value for the Content-Type header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary=\"{}\"", self.boundary)
    }
}
