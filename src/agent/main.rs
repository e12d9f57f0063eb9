//! devsetup-agent - local daemon that installs and runs developer tools.
//!
//! The agent owns every supervised tool process, so tools keep running
//! between CLI invocations. It provides:
//! - Tool installation (download, checksum, extraction) with progress
//! - Start/stop of installed tools with per-tool log capture
//! - Tool status, catalog access and persisted settings
//!
//! # Authentication
//!
//! Set the `DEVSETUP_AGENT_TOKEN` environment variable to enable
//! authentication. When set, all API requests (except `/health`) must include
//! the token in the `X-Devsetup-Token` header.
//!
//! # Configuration
//!
//! Environment variables:
//! - `DEVSETUP_HOME`: Base directory (default: platform config dir)
//! - `DEVSETUP_AGENT_TOKEN`: Authentication token (optional, disables auth if unset)
//! - `DEVSETUP_AGENT_PORT`: Listen port (default: 7474)
//! - `DEVSETUP_CATALOG_URL`: Tools catalog URL
//! - `RUST_LOG`: Log level (default: devsetup_agent=info,tower_http=info)

mod catalog;
mod config;
mod paths;
mod routes;
mod tools;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::catalog::{CatalogClient, DEFAULT_CATALOG_URL};
use crate::paths::Paths;
use crate::tools::ToolManager;

const DEFAULT_PORT: u16 = 7474;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Install/run coordinator; torn down on shutdown.
    pub manager: ToolManager,
    pub catalog: CatalogClient,
    /// Authentication token (None disables authentication).
    pub auth_token: Option<String>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devsetup_agent=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let auth_token = std::env::var("DEVSETUP_AGENT_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    let port: u16 = std::env::var("DEVSETUP_AGENT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let catalog_url =
        std::env::var("DEVSETUP_CATALOG_URL").unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string());

    if auth_token.is_some() {
        tracing::info!("Authentication enabled via DEVSETUP_AGENT_TOKEN");
    } else {
        tracing::warn!(
            "DEVSETUP_AGENT_TOKEN not set - authentication disabled. \
             Any local process can control the agent."
        );
    }

    let paths = Paths::from_env();
    tracing::info!("Using base directory {}", paths.base_dir().display());

    let client = reqwest::Client::builder()
        .user_agent(concat!("devsetup-agent/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let state = Arc::new(AppState {
        catalog: CatalogClient::new(client.clone(), catalog_url, paths.catalog_fallback()),
        manager: ToolManager::new(paths, client).await,
        auth_token,
        start_time: chrono::Utc::now(),
    });

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("devsetup-agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.manager.shutdown().await;
    tracing::info!("devsetup-agent stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
