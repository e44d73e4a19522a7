//! Main entry point for the RiceGuard backend.
//!
//! Loads and validates configuration, builds the shared state and serves the
//! Axum router with peer address information for rate limiting.

use anyhow::Context;
use chrono::Utc;
use riceguard_backend::app::{AppState, build_router};
use riceguard_backend::config::Config;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const REFRESH_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    config
        .validate_security()
        .context("Refusing to start with insecure configuration")?;

    let state = AppState::from_config(&config).context("Failed to initialise services")?;

    let auth_service = state.auth_service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REFRESH_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = auth_service.refresh_store().purge_expired(Utc::now());
            if purged > 0 {
                debug!(purged, "Purged expired refresh records");
            }
        }
    });

    let app = build_router(state, &config);

    let bind_address = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    info!("Starting RiceGuard server on port {}", config.server_port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
