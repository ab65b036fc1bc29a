//! Error types for deskwire.
//!
//! This module defines `DeskError`, the unified error type returned by every
//! operation, and `ApiError`, the structured failure built from a non-2xx
//! response.
//!
//! # Security
//!
//! Error descriptions built from response bodies are sanitized so API keys
//! are never leaked in logs or error messages. Use `sanitize_message()` when
//! constructing error messages from external sources.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Unified error type for all deskwire operations.
#[derive(Error, Debug)]
pub enum DeskError {
    /// Configuration error - missing or invalid environment variables.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client initialization failed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Connection-level failure, propagated unchanged from the transport.
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with a classified failure status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input validation failed before anything was sent.
    #[error("validation error: {0}")]
    Validation(String),

    /// Connection test failed.
    #[error("connection test failed: {message}")]
    ConnectionTest {
        /// Details about why the connection test failed.
        message: String,
    },
}

impl DeskError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_env(var_name: &str) -> Self {
        DeskError::Config(format!(
            "missing required environment variable: {}",
            var_name
        ))
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        DeskError::Config(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        DeskError::Validation(message.into())
    }

    /// Creates a connection test error.
    pub fn connection_test(message: impl Into<String>) -> Self {
        DeskError::ConnectionTest {
            message: message.into(),
        }
    }

    /// Returns the structured API error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            DeskError::Api(api) => Some(api),
            _ => None,
        }
    }

    /// Returns the classification of an API error.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.as_api().map(|api| api.kind)
    }

    /// Returns the HTTP status carried by an API error.
    pub fn status(&self) -> Option<u16> {
        self.as_api().map(|api| api.status)
    }

    /// Returns true if the backend kept rate limiting after the single retry.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        self.kind() == Some(ErrorKind::RateLimited)
    }

    /// Returns the per-field validation failures, empty for any other error.
    pub fn field_errors(&self) -> &[FieldError] {
        self.as_api()
            .map(|api| api.field_errors.as_slice())
            .unwrap_or(&[])
    }

    /// Sanitizes an error message to remove any occurrence of the API key.
    ///
    /// # Returns
    ///
    /// The message with any occurrence of the API key replaced with `[REDACTED]`
    #[must_use]
    pub fn sanitize_message(message: &str, api_key: &str) -> String {
        if api_key.is_empty() {
            return message.to_string();
        }
        message.replace(api_key, "[REDACTED]")
    }

    /// Creates a sanitized version of this error's display message.
    #[must_use]
    pub fn sanitized_display(&self, api_key: &str) -> String {
        Self::sanitize_message(&self.to_string(), api_key)
    }
}

/// Classification of a failed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 400 without per-field details.
    BadRequest,
    /// 400 carrying a list of per-field descriptors.
    FieldValidation,
    /// 401.
    AuthenticationFailure,
    /// 403.
    AuthorizationFailure,
    /// 405.
    MethodNotAllowed,
    /// 409.
    Conflict,
    /// 429 that survived the single retry, or whose wait exceeded the cap.
    RateLimited,
    /// 500.
    ServerError,
    /// Any other non-success status.
    UnexpectedStatus,
}

impl ErrorKind {
    /// Short stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::FieldValidation => "field_validation",
            ErrorKind::AuthenticationFailure => "authentication_failure",
            ErrorKind::AuthorizationFailure => "authorization_failure",
            ErrorKind::MethodNotAllowed => "method_not_allowed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::UnexpectedStatus => "unexpected_status",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure surfaced for every non-2xx response other than 404.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("HTTP {status} ({kind}) at {path_and_query}: {description}")]
pub struct ApiError {
    /// Classification of the status code.
    pub kind: ErrorKind,
    /// Numeric HTTP status.
    pub status: u16,
    /// Path and query of the request that failed.
    pub path_and_query: String,
    /// Human-readable description.
    pub description: String,
    /// Per-field validation failures (400 only).
    pub field_errors: Vec<FieldError>,
    /// Server-suggested wait (429 only).
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Creates an API error without field details.
    pub fn new(
        kind: ErrorKind,
        status: u16,
        path_and_query: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            path_and_query: path_and_query.into(),
            description: description.into(),
            field_errors: Vec::new(),
            retry_after: None,
        }
    }

    /// Attaches per-field validation failures.
    pub fn with_field_errors(mut self, field_errors: Vec<FieldError>) -> Self {
        self.field_errors = field_errors;
        self
    }

    /// Attaches the server's Retry-After hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// One invalid, missing or mistyped field reported by a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    /// Name of the offending field.
    #[serde(default)]
    pub field: String,
    /// Machine-readable failure code.
    #[serde(default)]
    pub code: FieldErrorCode,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.field, self.code, self.message)
    }
}

/// Codes the backend uses in field-level validation descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    /// The value is not acceptable for the field.
    InvalidValue,
    /// A required field was not supplied.
    MissingField,
    /// The value has the wrong JSON type.
    DatatypeMismatch,
    /// Any code not listed above.
    #[default]
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_error() {
        let err = DeskError::missing_env("DESK_LIVE_API_KEY");
        assert!(err.to_string().contains("DESK_LIVE_API_KEY"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validation_error() {
        let err = DeskError::validation("ticket_id must be numeric");
        assert_eq!(err.to_string(), "validation error: ticket_id must be numeric");
    }

    #[test]
    fn test_api_error_display() {
        let err: DeskError =
            ApiError::new(ErrorKind::Conflict, 409, "/api/v2/tickets/1", "conflicting state")
                .into();
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("conflict"));
        assert!(msg.contains("/api/v2/tickets/1"));
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
    }

    #[test]
    fn test_is_rate_limit() {
        let err: DeskError = ApiError::new(ErrorKind::RateLimited, 429, "/x", "slow down")
            .with_retry_after(Duration::from_secs(5))
            .into();
        assert!(err.is_rate_limit());
        assert_eq!(
            err.as_api().and_then(|api| api.retry_after),
            Some(Duration::from_secs(5))
        );
        assert!(!DeskError::validation("x").is_rate_limit());
    }

    #[test]
    fn test_field_errors_empty_for_other_errors() {
        assert!(DeskError::validation("x").field_errors().is_empty());
    }

    #[test]
    fn test_field_error_codes_deserialize() {
        let errors: Vec<FieldError> = serde_json::from_str(
            r#"[
                {"field": "email", "code": "missing_field", "message": "required"},
                {"field": "priority", "code": "invalid_value", "message": "must be 1-4"},
                {"field": "due_by", "code": "datatype_mismatch", "message": "not a date"},
                {"field": "x", "code": "something_new", "message": "?"}
            ]"#,
        )
        .unwrap();
        assert_eq!(errors[0].code, FieldErrorCode::MissingField);
        assert_eq!(errors[1].code, FieldErrorCode::InvalidValue);
        assert_eq!(errors[2].code, FieldErrorCode::DatatypeMismatch);
        assert_eq!(errors[3].code, FieldErrorCode::Unknown);
    }

    #[test]
    fn test_sanitize_message_removes_api_key() {
        let api_key = "super_secret_key_12345";
        let message = format!("Error connecting with key {} to server", api_key);
        let sanitized = DeskError::sanitize_message(&message, api_key);
        assert!(!sanitized.contains(api_key));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_message_empty_key() {
        let message = "Some error message";
        assert_eq!(DeskError::sanitize_message(message, ""), message);
    }

    #[test]
    fn test_connection_test_error() {
        let err = DeskError::connection_test("Could not reach server");
        let msg = err.to_string();
        assert!(msg.contains("connection test failed"));
        assert!(msg.contains("Could not reach server"));
    }
}
