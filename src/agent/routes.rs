//! HTTP routes for the devsetup-agent API.
//!
//! All endpoints require authentication via the `X-Devsetup-Token` header,
//! except for `/health`.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::ProxySettings;
use crate::tools::InstallRequest;
use crate::AppState;

pub const TOKEN_HEADER: &str = "X-Devsetup-Token";

/// Creates the router with all agent routes.
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Public
        .route("/health", get(health))
        // Catalog
        .route("/catalog", get(catalog))
        .route("/catalog/{name}/resolve", get(catalog_resolve))
        // Tools
        .route("/tools/install", post(install))
        .route("/tools/status", get(tools_status))
        .route("/tools/installed", get(tools_installed))
        .route("/tools/running", get(tools_running))
        .route("/tools/{name}/uninstall", post(uninstall))
        .route("/tools/{name}/start", post(start))
        .route("/tools/{name}/stop", post(stop))
        .route("/tools/{name}/logs", get(logs))
        .route("/tools/{name}/progress", get(progress))
        // Settings
        .route("/config", get(config))
        .route("/config/proxy", get(proxy).post(set_proxy))
}

/// Extractor that checks the token before handing out the state.
///
/// Without `DEVSETUP_AGENT_TOKEN` every request is let through.
pub struct AuthenticatedState(pub Arc<AppState>);

impl FromRequestParts<Arc<AppState>> for AuthenticatedState {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = &state.auth_token else {
            return Ok(AuthenticatedState(Arc::clone(state)));
        };

        match parts.headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
            Some(token) if token == expected => Ok(AuthenticatedState(Arc::clone(state))),
            Some(_) => Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new("Invalid authentication token")),
            )),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new(format!("Missing {} header", TOKEN_HEADER))),
            )),
        }
    }
}

/// Standard API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
}

impl ApiError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "devsetup-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": (chrono::Utc::now() - state.start_time).num_seconds(),
    }))
}

/// GET /catalog - remote catalog, or the last saved copy
async fn catalog(
    AuthenticatedState(state): AuthenticatedState,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    match state.catalog.fetch().await {
        Ok(catalog) => {
            state.manager.remember_catalog(&catalog).await;
            Ok(Json(catalog))
        }
        Err(e) => {
            tracing::error!("Catalog unavailable: {}", e);
            Err((StatusCode::BAD_GATEWAY, Json(ApiError::new(e.to_string()))))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    version: Option<String>,
}

/// GET /catalog/{name}/resolve - artifact for this machine's platform
async fn catalog_resolve(
    AuthenticatedState(state): AuthenticatedState,
    Path(name): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let catalog = state.catalog.fetch().await.map_err(|e| {
        tracing::error!("Catalog unavailable: {}", e);
        (StatusCode::BAD_GATEWAY, Json(ApiError::new(e.to_string())))
    })?;
    state.manager.remember_catalog(&catalog).await;

    let (os, arch) = (std::env::consts::OS, std::env::consts::ARCH);
    catalog
        .resolve(&name, query.version.as_deref(), os, arch)
        .map(Json)
        .ok_or_else(|| {
            let version = query.version.as_deref().unwrap_or("any version");
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(format!(
                    "No {} ({}) artifact for {}/{} in catalog",
                    name, version, os, arch
                ))),
            )
        })
}

/// POST /tools/install
///
/// Responds once the install settles. Progress can be polled meanwhile.
async fn install(
    AuthenticatedState(state): AuthenticatedState,
    Json(req): Json<InstallRequest>,
) -> impl IntoResponse {
    tracing::info!("Install requested: {} {}", req.name, req.version);
    Json(state.manager.install_tool(&req).await)
}

/// POST /tools/{name}/uninstall
async fn uninstall(
    AuthenticatedState(state): AuthenticatedState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.manager.uninstall_tool(&name).await)
}

/// POST /tools/{name}/start
async fn start(
    AuthenticatedState(state): AuthenticatedState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.manager.start_tool(&name).await)
}

/// POST /tools/{name}/stop
async fn stop(
    AuthenticatedState(state): AuthenticatedState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.manager.stop_tool(&name).await)
}

/// GET /tools/status
async fn tools_status(AuthenticatedState(state): AuthenticatedState) -> impl IntoResponse {
    Json(state.manager.get_status().await)
}

/// GET /tools/installed
async fn tools_installed(AuthenticatedState(state): AuthenticatedState) -> impl IntoResponse {
    Json(state.manager.installed_tools().await)
}

/// GET /tools/running
async fn tools_running(AuthenticatedState(state): AuthenticatedState) -> impl IntoResponse {
    Json(state.manager.running().await)
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    lines: Vec<String>,
}

/// GET /tools/{name}/logs
async fn logs(
    AuthenticatedState(state): AuthenticatedState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(LogsResponse {
        lines: state.manager.get_logs(&name).await,
    })
}

/// GET /tools/{name}/progress
async fn progress(
    AuthenticatedState(state): AuthenticatedState,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(serde_json::json!({ "progress": state.manager.get_install_progress(&name) }))
}

/// GET /config
async fn config(AuthenticatedState(state): AuthenticatedState) -> impl IntoResponse {
    Json(state.manager.config().await)
}

/// GET /config/proxy
async fn proxy(AuthenticatedState(state): AuthenticatedState) -> impl IntoResponse {
    Json(state.manager.proxy().await)
}

/// POST /config/proxy
async fn set_proxy(
    AuthenticatedState(state): AuthenticatedState,
    Json(settings): Json<ProxySettings>,
) -> impl IntoResponse {
    Json(state.manager.set_proxy(settings).await)
}
