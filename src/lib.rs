//! # deskwire
//!
//! deskwire is the HTTP invocation layer for a helpdesk/ITSM REST API (v2):
//! tickets, requesters, agents, departments, locations, assets and custom
//! objects are all reached through the same four verbs.
//!
//! ## Features
//!
//! - **Two environments**: every call targets either the live or the sandbox
//!   backend, each with its own base URL and API key
//! - **Lazy pagination**: list queries follow `Link` headers or a `total`
//!   count, yielding records page by page as a stream
//! - **Error taxonomy**: non-success statuses become a structured
//!   [`ApiError`](error::ApiError), with per-field validation details on 400
//! - **Rate limiting**: a 429 is retried once after its `Retry-After` delay
//! - **Attachments**: multipart/form-data bodies with a generated boundary
//! - **Security**: API keys are never logged or exposed in error messages
//!
//! ## Architecture
//!
//! - [`config`] - Environment bindings loaded from environment variables
//! - [`error`] - Error types with security-conscious message sanitization
//! - [`desk_client`] - Request executor and record streams
//! - [`pagination`] - Next-page discovery for list queries
//! - [`multipart`] - multipart/form-data encoding
//! - [`models`] - Envelope projection and field choice lists
//! - [`params`] - Query-string and body builders for resource wrappers
//!
//! ## Configuration
//!
//! Required:
//! - `DESK_LIVE_URL`: host or URL of the live instance
//! - `DESK_LIVE_API_KEY`: API key for the live instance
//!
//! Optional:
//! - `DESK_SANDBOX_URL` / `DESK_SANDBOX_API_KEY`: sandbox instance
//! - `DESK_ENVIRONMENT`: default environment (`live` or `sandbox`)
//! - `DESK_TIMEOUT_SECS`, `DESK_MAX_RETRY_AFTER_SECS`
//! - `RUST_LOG`: Log level (e.g., `deskwire=debug`)
//!
//! ## Example
//!
//! ```ignore
//! use deskwire::config::{Config, Environment};
//! use deskwire::desk_client::DeskClient;
//! use deskwire::params::{Fields, QueryParams};
//! use futures::TryStreamExt;
//!
//! async fn example() -> Result<(), deskwire::error::DeskError> {
//!     let config = Config::from_env()?;
//!     let client = DeskClient::new(&config)?;
//!
//!     // Stream every open urgent ticket
//!     let path = QueryParams::new()
//!         .push("query", "\"priority:4 AND status:2\"")
//!         .apply("tickets/filter");
//!     let mut tickets = client.get(&path, Some("tickets"), None);
//!     while let Some(ticket) = tickets.try_next().await? {
//!         println!("#{}: {}", ticket["id"], ticket["subject"]);
//!     }
//!
//!     // Create a ticket in the sandbox
//!     let body = Fields::new()
//!         .set("subject", "Printer on fire")?
//!         .set("email", "jo@example.com")?
//!         .into_json_body();
//!     let ticket = client
//!         .post("tickets", Some("ticket"), body, Some(Environment::Sandbox))
//!         .await?;
//!     println!("{:?}", ticket);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod desk_client;
pub mod error;
pub mod models;
pub mod multipart;
pub mod pagination;
pub mod params;
