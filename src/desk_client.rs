//! HTTP client for the helpdesk REST API (v2).
//!
//! This module provides the `DeskClient` struct for making authenticated
//! requests against either configured environment.
//!
//! # Status handling
//!
//! Every request goes through one send-and-classify primitive:
//! - 2xx: the body is parsed and the requested field projected out of it
//! - 404: not an error, the call yields no result
//! - 429: sleep for `Retry-After` seconds, then re-issue the request once
//! - anything else: a structured [`ApiError`]
//!
//! Connection-level failures are returned unchanged as `DeskError::Transport`.
//!
//! # Security
//!
//! The API key is never logged. Response bodies are sanitized before they are
//! placed in error descriptions.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, Stream, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use url::Url;

use crate::config::{Backend, Config, Environment};
use crate::error::{ApiError, DeskError, ErrorKind};
use crate::models::{into_records, parse_body, project, total_count, ErrorEnvelope, Record};
use crate::multipart::MultipartBody;
use crate::pagination::Pager;

/// Wait applied when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Total attempts per request: the first send plus one rate-limit retry.
const MAX_ATTEMPTS: u32 = 2;

/// Maximum length for HTTP error response bodies kept in error descriptions.
const MAX_ERROR_BODY_LEN: usize = 500;

/// Cheap listing used to verify connectivity and credentials.
const CONNECTION_PROBE_PATH: &str = "tickets?per_page=1";

/// A lazily fetched sequence of records spanning one or more pages.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, DeskError>> + Send>>;

/// A request body together with its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent as `application/json`.
    Json(Value),
    /// Sent as `multipart/form-data` with the body's boundary.
    Multipart(MultipartBody),
}

impl RequestBody {
    /// Value for the Content-Type header.
    pub fn content_type(&self) -> String {
        match self {
            RequestBody::Json(_) => "application/json".to_string(),
            RequestBody::Multipart(body) => body.content_type(),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, DeskError> {
        match self {
            RequestBody::Json(value) => Ok(serde_json::to_vec(value)?),
            RequestBody::Multipart(body) => Ok(body.bytes().to_vec()),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<MultipartBody> for RequestBody {
    fn from(body: MultipartBody) -> Self {
        RequestBody::Multipart(body)
    }
}

/// One successful page: where it came from, its Link header and its envelope.
struct Page {
    url: Url,
    link: Option<String>,
    body: Value,
}

/// State threaded through the page stream.
struct PageState {
    client: DeskClient,
    environment: Environment,
    field: Option<String>,
    pager: Pager,
}

/// HTTP client for the helpdesk API.
///
/// Cloning is cheap; clones share the connection pool and configuration.
///
/// # Example
///
/// ```ignore
/// let config = Config::from_env()?;
/// let client = DeskClient::new(&config)?;
///
/// let tickets = client.get_all("tickets", Some("tickets"), None).await?;
/// ```
#[derive(Clone)]
pub struct DeskClient {
    /// The underlying HTTP client (cloning is cheap).
    http: Client,

    /// Environment bindings and limits, immutable after construction.
    config: Arc<Config>,
}

impl DeskClient {
    /// Creates a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, DeskError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DeskError::HttpClient)?;

        Ok(Self {
            http,
            config: Arc::new(config.clone()),
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The environment used when a call does not name one.
    pub fn default_environment(&self) -> Environment {
        self.config.default_environment
    }

    fn resolve_environment(&self, environment: Option<Environment>) -> Environment {
        environment.unwrap_or(self.config.default_environment)
    }

    /// Builds the absolute URL for `path` (which may carry a query string).
    fn endpoint(&self, backend: &Backend, path: &str) -> Result<Url, DeskError> {
        let url = format!("{}/{}", backend.base_url(), path.trim_start_matches('/'));
        Url::parse(&url)
            .map_err(|e| DeskError::validation(format!("invalid request path {:?}: {}", path, e)))
    }

    /// Tests connectivity to one environment.
    ///
    /// Fetches only the first page of a one-record listing to verify the
    /// backend is reachable and the API key is accepted.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::ConnectionTest` with details about the failure reason.
    pub async fn test_connection(&self, environment: Option<Environment>) -> Result<(), DeskError> {
        let environment = self.resolve_environment(environment);
        tracing::debug!(environment = %environment, "Testing connection");

        match self.probe(environment).await {
            Ok(Some(_)) => {
                tracing::info!(environment = %environment, "Connection test successful");
                Ok(())
            }
            Ok(None) => Err(DeskError::connection_test(format!(
                "API endpoint not found - verify the {} URL is correct",
                environment
            ))),
            Err(DeskError::Api(api)) if api.kind == ErrorKind::AuthenticationFailure => {
                Err(DeskError::connection_test(format!(
                    "authentication failed - verify the {} API key is correct",
                    environment
                )))
            }
            Err(DeskError::Transport(e)) if e.is_timeout() => {
                Err(DeskError::connection_test(format!(
                    "connection timed out after {:?} - verify the {} URL is correct and the server is reachable",
                    self.config.timeout, environment
                )))
            }
            Err(DeskError::Transport(e)) => {
                let message = self.sanitize(environment, &e.to_string());
                Err(DeskError::connection_test(format!(
                    "HTTP error: {} - verify the {} URL is correct",
                    message, environment
                )))
            }
            Err(e) => {
                let message = self.sanitize(environment, &e.to_string());
                Err(DeskError::connection_test(message))
            }
        }
    }

    /// Fetches the first page of the probe listing; `None` on 404.
    async fn probe(&self, environment: Environment) -> Result<Option<Page>, DeskError> {
        let backend = self.config.backend(environment)?;
        let url = self.endpoint(backend, CONNECTION_PROBE_PATH)?;
        self.fetch_page(environment, url).await
    }

    /// Sanitizes a message against the key of `environment`.
    fn sanitize(&self, environment: Environment, message: &str) -> String {
        match self.config.backend(environment) {
            Ok(backend) => DeskError::sanitize_message(message, backend.api_key()),
            Err(_) => message.to_string(),
        }
    }

    /// Lists the records at `field`, following pagination lazily.
    ///
    /// Each page is requested only when the stream is polled past the
    /// records already received, so dropping the stream stops further
    /// requests. A 404 ends the stream without an error.
    ///
    /// # Arguments
    ///
    /// * `path` - Path below `/api/v2`, optionally with a query string
    /// * `field` - Envelope key holding the records (e.g. `"tickets"`)
    /// * `environment` - Backend to use, `None` for the configured default
    pub fn get(
        &self,
        path: &str,
        field: Option<&str>,
        environment: Option<Environment>,
    ) -> RecordStream {
        let environment = self.resolve_environment(environment);
        let first = self
            .config
            .backend(environment)
            .and_then(|backend| self.endpoint(backend, path));

        let first = match first {
            Ok(url) => url,
            Err(e) => return Box::pin(stream::once(async move { Err::<Record, DeskError>(e) })),
        };

        let state = PageState {
            client: self.clone(),
            environment,
            field: field.map(str::to_string),
            pager: Pager::new(first),
        };

        let pages = stream::try_unfold(state, next_page);

        Box::pin(
            pages
                .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, DeskError>)))
                .try_flatten(),
        )
    }

    /// Lists every record at `field`, collecting all pages.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered on any page.
    pub async fn get_all(
        &self,
        path: &str,
        field: Option<&str>,
        environment: Option<Environment>,
    ) -> Result<Vec<Record>, DeskError> {
        self.get(path, field, environment).try_collect().await
    }

    /// Fetches a single page; `None` on 404.
    async fn fetch_page(
        &self,
        environment: Environment,
        url: Url,
    ) -> Result<Option<Page>, DeskError> {
        let backend = self.config.backend(environment)?;
        let Some(response) = self.send(Method::GET, &url, backend, None).await? else {
            return Ok(None);
        };

        let link = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(DeskError::Transport)?;
        let body = parse_body(&text)?;

        Ok(Some(Page { url, link, body }))
    }

    /// Creates a resource and returns the value at `field` of the response.
    ///
    /// Returns `Ok(None)` if the backend answers 404.
    pub async fn post(
        &self,
        path: &str,
        field: Option<&str>,
        body: RequestBody,
        environment: Option<Environment>,
    ) -> Result<Option<Record>, DeskError> {
        self.execute(Method::POST, path, field, Some(&body), environment)
            .await
    }

    /// Updates a resource and returns the value at `field` of the response.
    ///
    /// Some state-transition endpoints take no body. Returns `Ok(None)` if
    /// the backend answers 404.
    pub async fn put(
        &self,
        path: &str,
        field: Option<&str>,
        body: Option<RequestBody>,
        environment: Option<Environment>,
    ) -> Result<Option<Record>, DeskError> {
        self.execute(Method::PUT, path, field, body.as_ref(), environment)
            .await
    }

    /// Deletes a resource.
    ///
    /// Nothing is expected back; when `field` is given and the backend does
    /// return a body, the projected value is returned. Returns `Ok(None)` if
    /// the backend answers 404.
    pub async fn delete(
        &self,
        path: &str,
        field: Option<&str>,
        environment: Option<Environment>,
    ) -> Result<Option<Record>, DeskError> {
        self.execute(Method::DELETE, path, field, None, environment)
            .await
    }

    /// Sends one non-paginated request and projects `field` out of the response.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        field: Option<&str>,
        body: Option<&RequestBody>,
        environment: Option<Environment>,
    ) -> Result<Option<Record>, DeskError> {
        let environment = self.resolve_environment(environment);
        let backend = self.config.backend(environment)?;
        let url = self.endpoint(backend, path)?;

        let Some(response) = self.send(method, &url, backend, body).await? else {
            return Ok(None);
        };

        let text = response.text().await.map_err(DeskError::Transport)?;
        let body = parse_body(&text)?;
        Ok(Some(project(body, field)))
    }

    /// Sends a request and classifies the response.
    ///
    /// Returns the response for 2xx and `None` for 404. A 429 is retried once
    /// after its Retry-After delay; every other status becomes an `ApiError`.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        backend: &Backend,
        body: Option<&RequestBody>,
    ) -> Result<Option<Response>, DeskError> {
        let payload = match body {
            Some(body) => Some((body.content_type(), body.to_bytes()?)),
            None => None,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            tracing::debug!(
                method = %method,
                uri = %url,
                attempt = attempt,
                "Sending API request"
            );

            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .basic_auth(backend.api_key(), Some("X"))
                .header(ACCEPT, "application/json");

            if let Some((content_type, bytes)) = &payload {
                req = req.header(CONTENT_TYPE, content_type).body(bytes.clone());
            }

            let response = req.send().await.map_err(DeskError::Transport)?;
            let status = response.status();

            if status.is_success() {
                return Ok(Some(response));
            }

            if status == StatusCode::NOT_FOUND {
                tracing::debug!(uri = %url, "Resource not found, returning no result");
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_delay(&response);

                if retry_after > self.config.max_retry_after {
                    tracing::warn!(
                        uri = %url,
                        retry_after_secs = retry_after.as_secs(),
                        max_retry_after_secs = self.config.max_retry_after.as_secs(),
                        "Rate limited with a wait above the configured limit"
                    );
                    return Err(rate_limited(
                        url,
                        retry_after,
                        format!(
                            "rate limited; server asked to wait {}s, above the {}s limit",
                            retry_after.as_secs(),
                            self.config.max_retry_after.as_secs()
                        ),
                    ));
                }

                if attempt < MAX_ATTEMPTS {
                    tracing::warn!(
                        uri = %url,
                        retry_after_secs = retry_after.as_secs(),
                        "Rate limited, retrying once after Retry-After"
                    );
                    tokio::time::sleep(retry_after).await;
                    continue;
                }

                tracing::warn!(uri = %url, "Rate limited again after retry");
                return Err(rate_limited(
                    url,
                    retry_after,
                    format!(
                        "rate limit still exceeded after retrying; server asked to wait {}s",
                        retry_after.as_secs()
                    ),
                ));
            }

            return Err(classify(&method, url, backend.api_key(), response).await);
        }
    }
}

/// Fetches the next page of a query and works out where the one after lives.
async fn next_page(
    mut state: PageState,
) -> Result<Option<(Vec<Record>, PageState)>, DeskError> {
    let Some(url) = state.pager.next_url().cloned() else {
        return Ok(None);
    };

    let Some(page) = state.client.fetch_page(state.environment, url).await? else {
        state.pager.finish();
        return Ok(None);
    };

    let total = total_count(&page.body);
    let records = into_records(project(page.body, state.field.as_deref()));
    state
        .pager
        .advance(&page.url, page.link.as_deref(), total, records.len())?;

    tracing::debug!(
        uri = %page.url,
        records = records.len(),
        received = state.pager.received(),
        "Fetched page"
    );

    Ok(Some((records, state)))
}

/// Reads the Retry-After header as whole seconds.
fn retry_after_delay(response: &Response) -> Duration {
    let secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

fn rate_limited(url: &Url, retry_after: Duration, description: String) -> DeskError {
    ApiError::new(
        ErrorKind::RateLimited,
        StatusCode::TOO_MANY_REQUESTS.as_u16(),
        path_and_query(url),
        description,
    )
    .with_retry_after(retry_after)
    .into()
}

/// The path plus query of `url`, as reported in errors.
fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Converts a non-success, non-404, non-429 response into an `ApiError`.
async fn classify(method: &Method, url: &Url, api_key: &str, response: Response) -> DeskError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(
                status = status.as_u16(),
                error = %e,
                "Failed to read error response body"
            );
            format!("response body unavailable: {}", e)
        }
    };
    // Sanitize the body to ensure no API key leakage
    let body = DeskError::sanitize_message(&body, api_key);
    let location = path_and_query(url);

    let error = match status {
        StatusCode::BAD_REQUEST => match ErrorEnvelope::parse(&body) {
            Some(envelope) => ApiError::new(
                ErrorKind::FieldValidation,
                status.as_u16(),
                location,
                envelope
                    .description
                    .unwrap_or_else(|| "validation failed".to_string()),
            )
            .with_field_errors(envelope.errors),
            None => ApiError::new(
                ErrorKind::BadRequest,
                status.as_u16(),
                location,
                truncate(body),
            ),
        },
        StatusCode::UNAUTHORIZED => ApiError::new(
            ErrorKind::AuthenticationFailure,
            status.as_u16(),
            location,
            "missing or incorrect authorization",
        ),
        StatusCode::FORBIDDEN => ApiError::new(
            ErrorKind::AuthorizationFailure,
            status.as_u16(),
            location,
            "forbidden",
        ),
        StatusCode::METHOD_NOT_ALLOWED => ApiError::new(
            ErrorKind::MethodNotAllowed,
            status.as_u16(),
            location,
            format!("method {} is not allowed on this resource", method),
        ),
        StatusCode::CONFLICT => ApiError::new(
            ErrorKind::Conflict,
            status.as_u16(),
            location,
            "the resource is in an inconsistent or conflicting state",
        ),
        StatusCode::INTERNAL_SERVER_ERROR => ApiError::new(
            ErrorKind::ServerError,
            status.as_u16(),
            location,
            format!(
                "internal server error for {} {}; verify the input is correct before contacting vendor support",
                method, url
            ),
        ),
        _ => ApiError::new(
            ErrorKind::UnexpectedStatus,
            status.as_u16(),
            location,
            truncate(body),
        ),
    };

    tracing::debug!(
        status = error.status,
        kind = %error.kind,
        path = %error.path_and_query,
        field_errors = error.field_errors.len(),
        "API request failed"
    );

    error.into()
}

/// Truncates error bodies to avoid carrying verbose server internals.
fn truncate(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body;
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_and_query() {
        let url = Url::parse("https://acme.example.com/api/v2/tickets?page=2&per_page=30").unwrap();
        assert_eq!(path_and_query(&url), "/api/v2/tickets?page=2&per_page=30");
        let url = Url::parse("https://acme.example.com/api/v2/agents/5").unwrap();
        assert_eq!(path_and_query(&url), "/api/v2/agents/5");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let short = "short".to_string();
        assert_eq!(truncate(short.clone()), short);

        let long = "é".repeat(MAX_ERROR_BODY_LEN);
        let truncated = truncate(long);
        assert!(truncated.ends_with("...[truncated]"));
        assert!(truncated.len() <= MAX_ERROR_BODY_LEN + "...[truncated]".len());
    }

    #[test]
    fn test_request_body_content_types() {
        assert_eq!(
            RequestBody::from(json!({"a": 1})).content_type(),
            "application/json"
        );
        let multipart = crate::multipart::MultipartForm::new().text("a", "1").into_body();
        let expected = format!("multipart/form-data; boundary=\"{}\"", multipart.boundary());
        assert_eq!(RequestBody::from(multipart).content_type(), expected);
    }

    #[test]
    fn test_endpoint_joins_path() {
        let backend = Backend::new("acme.example.com", "abc123").unwrap();
        let client = DeskClient::new(&Config::new(backend.clone())).unwrap();
        assert_eq!(
            client.endpoint(&backend, "/tickets/5?include=stats").unwrap().as_str(),
            "https://acme.example.com/api/v2/tickets/5?include=stats"
        );
        assert_eq!(
            client.endpoint(&backend, "agents").unwrap().as_str(),
            "https://acme.example.com/api/v2/agents"
        );
    }

    #[test]
    fn test_unconfigured_sandbox_fails_before_sending() {
        let backend = Backend::new("acme.example.com", "abc123").unwrap();
        let client = DeskClient::new(&Config::new(backend)).unwrap();
        let result = tokio_test::block_on(client.get_all(
            "tickets",
            Some("tickets"),
            Some(Environment::Sandbox),
        ));
        assert!(matches!(result, Err(DeskError::Config(_))));
    }
}
