//! Configuration management for deskwire.
//!
//! This module handles loading the per-environment backend bindings from
//! environment variables, with validation to ensure all required values are
//! present. Configuration is built once at startup and never mutated.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DeskError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default upper bound on a server-supplied Retry-After wait, in seconds.
pub const DEFAULT_MAX_RETRY_AFTER_SECS: u64 = 120;

/// The API path every backend URL is rooted at.
const API_PATH: &str = "/api/v2";

/// Selects which of the two configured backends a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// The production instance.
    #[default]
    Live,
    /// The sandbox instance.
    Sandbox,
}

impl Environment {
    /// Lower-case name, as accepted by `DESK_ENVIRONMENT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Live => "live",
            Environment::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "production" | "prod" => Ok(Environment::Live),
            "sandbox" => Ok(Environment::Sandbox),
            other => Err(DeskError::invalid_config(format!(
                "unknown environment {:?}, expected \"live\" or \"sandbox\"",
                other
            ))),
        }
    }
}

/// One backend: the API root URL and the key used to authenticate against it.
#[derive(Clone)]
pub struct Backend {
    /// API root, e.g. `https://acme.example.com/api/v2`.
    base_url: String,

    /// API key for Basic authentication.
    /// This value must never be logged or included in error messages.
    api_key: String,
}

impl Backend {
    /// Creates a validated backend binding.
    ///
    /// `url` may be a bare host (`acme.example.com`) or a full `http(s)://`
    /// URL; `/api/v2` is appended when missing.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::Config` if the URL or key fails validation.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, DeskError> {
        let base_url = Self::normalize_base_url(url.into())?;
        let api_key = api_key.into();
        Self::validate_api_key(&api_key)?;
        Ok(Self { base_url, api_key })
    }

    /// The API root URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The API key. Only for building the Authorization header and sanitizing.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Validates and normalizes the base URL.
    fn normalize_base_url(url: String) -> Result<String, DeskError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DeskError::invalid_config("backend URL must not be empty"));
        }

        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.contains("://") {
            return Err(DeskError::invalid_config(
                "backend URL must use http:// or https://",
            ));
        } else {
            format!("https://{}", url)
        };

        let url = url.trim_end_matches('/');
        if url.ends_with(API_PATH) {
            Ok(url.to_string())
        } else if url.ends_with("/api") {
            Ok(format!("{}/v2", url))
        } else {
            Ok(format!("{}{}", url, API_PATH))
        }
    }

    /// Validates the API key is not empty or a placeholder value.
    fn validate_api_key(key: &str) -> Result<(), DeskError> {
        if key.trim().is_empty() {
            return Err(DeskError::invalid_config("API key must not be empty"));
        }

        let key_lower = key.to_lowercase();
        let placeholder_patterns = [
            "your_api_key",
            "your_key",
            "placeholder",
            "xxx",
            "changeme",
        ];

        for pattern in placeholder_patterns {
            if key_lower.contains(pattern) {
                return Err(DeskError::invalid_config(
                    "API key appears to be a placeholder value",
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Process-wide configuration: the environment bindings and client limits.
#[derive(Clone, Debug)]
pub struct Config {
    /// Production backend.
    pub live: Backend,

    /// Optional sandbox backend.
    pub sandbox: Option<Backend>,

    /// Environment used when a call does not name one.
    pub default_environment: Environment,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Longest Retry-After the client will sleep on before giving up.
    pub max_retry_after: Duration,
}

impl Config {
    /// Creates a configuration with only a live backend and default limits.
    pub fn new(live: Backend) -> Self {
        Self {
            live,
            sandbox: None,
            default_environment: Environment::Live,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retry_after: Duration::from_secs(DEFAULT_MAX_RETRY_AFTER_SECS),
        }
    }

    /// Adds the sandbox backend.
    pub fn with_sandbox(mut self, sandbox: Backend) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Sets the environment used when a call does not name one.
    pub fn with_default_environment(mut self, environment: Environment) -> Self {
        self.default_environment = environment;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the Retry-After cap.
    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// Returns the backend bound to `environment`.
    ///
    /// # Errors
    ///
    /// Returns `DeskError::Config` when the sandbox is selected but not configured.
    pub fn backend(&self, environment: Environment) -> Result<&Backend, DeskError> {
        match environment {
            Environment::Live => Ok(&self.live),
            Environment::Sandbox => self.sandbox.as_ref().ok_or_else(|| {
                DeskError::invalid_config(
                    "sandbox environment selected but DESK_SANDBOX_URL is not configured",
                )
            }),
        }
    }

    /// Environments that have a backend bound, live first.
    pub fn environments(&self) -> Vec<Environment> {
        let mut environments = vec![Environment::Live];
        if self.sandbox.is_some() {
            environments.push(Environment::Sandbox);
        }
        environments
    }

    /// Loads configuration from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `DESK_LIVE_URL`: host or URL of the live instance
    /// - `DESK_LIVE_API_KEY`: API key for the live instance
    ///
    /// # Optional Environment Variables
    ///
    /// - `DESK_SANDBOX_URL` / `DESK_SANDBOX_API_KEY`: sandbox binding (both or neither)
    /// - `DESK_ENVIRONMENT`: default environment, `live` or `sandbox`
    /// - `DESK_TIMEOUT_SECS`: request timeout in seconds
    /// - `DESK_MAX_RETRY_AFTER_SECS`: longest Retry-After to honour
    ///
    /// # Errors
    ///
    /// Returns `DeskError::Config` if any required variable is missing
    /// or if values fail validation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// dotenvy::dotenv().ok();
    /// let config = Config::from_env()?;
    /// ```
    pub fn from_env() -> Result<Self, DeskError> {
        let live = Backend::new(
            Self::get_required_env("DESK_LIVE_URL")?,
            Self::get_required_env("DESK_LIVE_API_KEY")?,
        )?;
        let mut config = Config::new(live);

        match (
            Self::get_optional_env("DESK_SANDBOX_URL"),
            Self::get_optional_env("DESK_SANDBOX_API_KEY"),
        ) {
            (Some(url), Some(key)) => config = config.with_sandbox(Backend::new(url, key)?),
            (None, None) => {}
            (Some(_), None) => return Err(DeskError::missing_env("DESK_SANDBOX_API_KEY")),
            (None, Some(_)) => return Err(DeskError::missing_env("DESK_SANDBOX_URL")),
        }

        if let Some(name) = Self::get_optional_env("DESK_ENVIRONMENT") {
            let environment: Environment = name.parse()?;
            config.backend(environment)?;
            config = config.with_default_environment(environment);
        }

        if let Some(secs) = Self::get_optional_secs("DESK_TIMEOUT_SECS")? {
            config = config.with_timeout(secs);
        }

        if let Some(secs) = Self::get_optional_secs("DESK_MAX_RETRY_AFTER_SECS")? {
            config = config.with_max_retry_after(secs);
        }

        Ok(config)
    }

    /// Gets a required environment variable, returning an error if missing or empty.
    fn get_required_env(name: &str) -> Result<String, DeskError> {
        Self::get_optional_env(name).ok_or_else(|| DeskError::missing_env(name))
    }

    /// Gets an environment variable, treating blank values as unset.
    fn get_optional_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|value| !value.trim().is_empty())
    }

    /// Parses an optional whole number of seconds.
    fn get_optional_secs(name: &str) -> Result<Option<Duration>, DeskError> {
        Self::get_optional_env(name)
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| {
                        DeskError::invalid_config(format!(
                            "{} must be a whole number of seconds",
                            name
                        ))
                    })
            })
            .transpose()
    }
}
