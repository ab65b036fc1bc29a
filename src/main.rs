//! deskwire - connectivity probe for the configured helpdesk backends
//!
//! Loads the environment bindings, then checks that every configured
//! environment is reachable and accepts its API key. Exits non-zero if any
//! check fails.
//!
//! # Configuration
//!
//! Set the following environment variables (or use a `.env` file):
//!
//! - `DESK_LIVE_URL`: host or URL of the live instance
//! - `DESK_LIVE_API_KEY`: API key for the live instance
//! - `DESK_SANDBOX_URL` / `DESK_SANDBOX_API_KEY`: optional sandbox instance
//!
//! # Usage
//!
//! ```bash
//! DESK_LIVE_URL=acme.example.com DESK_LIVE_API_KEY=xxx ./deskwire
//! ```

use anyhow::{bail, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use deskwire::{config, desk_client};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deskwire=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting deskwire v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env().context("Failed to load configuration")?;

    tracing::debug!(
        live = %config.live.base_url(),
        sandbox = ?config.sandbox.as_ref().map(|b| b.base_url()),
        default_environment = %config.default_environment,
        "Configuration loaded"
    );

    let client = desk_client::DeskClient::new(&config).context("Failed to create client")?;

    let mut failures = 0usize;
    for environment in config.environments() {
        tracing::info!(environment = %environment, "Testing connection...");
        if let Err(e) = client.test_connection(Some(environment)).await {
            tracing::error!(environment = %environment, error = %e, "Connection test failed");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} environment(s) failed the connection test", failures);
    }

    tracing::info!("All configured environments are reachable");
    Ok(())
}
