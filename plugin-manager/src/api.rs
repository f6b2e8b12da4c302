//! Plugin Manager HTTP API.
//!
//! Exposes:
//! - `GET /api/plugins`: registered plugins with the caller's connection status
//! - `GET /api/plugins/:id`: plugin metadata, fields and status
//! - `DELETE /api/plugins/:id`: disconnect (credentials cleared, plugin disabled)
//! - `GET /api/plugins/:id/connect`: start authorization, redirect to provider
//! - `GET /api/plugins/:id/callback`: provider redirect target
//! - `POST /api/plugins/:id/sync`: sync now, optional `startDate`/`endDate`
//!
//! Every route except the callback resolves the current user from the
//! bearer token; the callback identifies the user through the state token.

use crate::error::{HandshakeError, SyncError};
use crate::handshake::Handshake;
use crate::registry::PluginRegistry;
use crate::scheduler::SyncScheduler;
use crate::types::{PluginField, SyncResult};
use crate::Plugin;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use okr_sync::auth::{current_user, UserResolver};
use okr_sync::plugin_config::PluginConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state for the plugin API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<PluginRegistry>,
    pub handshake: Handshake,
    pub scheduler: Arc<SyncScheduler>,
    pub users: Arc<dyn UserResolver>,
}

/// A single entry in the `GET /api/plugins` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub connected: bool,
    pub enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub fields: Vec<PluginField>,
}

/// Response for `GET /api/plugins/:id`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDetail {
    pub plugin: PluginInfo,
    pub connected: bool,
    pub enabled: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/plugins/:id/sync`. Both dates are `YYYY-MM-DD`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Provider redirect query parameters
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
struct CallbackResponse {
    success: bool,
    message: String,
    plugin: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Connection status for one user, derived from the stored configuration.
struct Status {
    connected: bool,
    enabled: bool,
    last_sync: Option<DateTime<Utc>>,
}

impl From<Option<PluginConfig>> for Status {
    fn from(config: Option<PluginConfig>) -> Self {
        match config {
            Some(config) => Status {
                connected: config.credentials.is_some(),
                enabled: config.enabled,
                last_sync: config.last_sync,
            },
            None => Status {
                connected: false,
                enabled: false,
                last_sync: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Business logic (called from HTTP handlers and unit tests)
// ---------------------------------------------------------------------------

fn find_plugin(state: &ApiState, plugin_id: &str) -> Result<Arc<dyn Plugin>, AppError> {
    state
        .registry
        .get(plugin_id)
        .ok_or_else(|| AppError::NotFound(format!("Plugin '{}' not found", plugin_id)))
}

fn user_status(state: &ApiState, user_id: &str, plugin_id: &str) -> Result<Status, AppError> {
    let config = state
        .registry
        .get_user_plugin_config(user_id, plugin_id)
        .map_err(|e| {
            error!(user_id = %user_id, plugin = %plugin_id, error = %e, "Failed to load plugin config");
            AppError::ServerError(format!("Failed to load plugin configuration: {}", e))
        })?;
    Ok(Status::from(config))
}

fn list_plugin_status(state: &ApiState, user_id: &str) -> Result<Vec<PluginSummary>, AppError> {
    // One query for the user; configs of unregistered plugins are ignored
    let mut configs: HashMap<String, PluginConfig> = state
        .registry
        .user_plugin_configs(user_id)
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to load plugin configs");
            AppError::ServerError(format!("Failed to load plugin configuration: {}", e))
        })?
        .into_iter()
        .map(|config| (config.plugin_id.clone(), config))
        .collect();

    Ok(state
        .registry
        .list()
        .into_iter()
        .map(|plugin| {
            let status = Status::from(configs.remove(plugin.id()));
            PluginSummary {
                id: plugin.id().to_string(),
                name: plugin.name().to_string(),
                description: plugin.description().to_string(),
                icon: plugin.icon().to_string(),
                connected: status.connected,
                enabled: status.enabled,
                last_sync: status.last_sync,
            }
        })
        .collect())
}

fn plugin_detail(state: &ApiState, user_id: &str, plugin_id: &str) -> Result<PluginDetail, AppError> {
    let plugin = find_plugin(state, plugin_id)?;
    let status = user_status(state, user_id, plugin_id)?;

    Ok(PluginDetail {
        plugin: PluginInfo {
            id: plugin.id().to_string(),
            name: plugin.name().to_string(),
            description: plugin.description().to_string(),
            icon: plugin.icon().to_string(),
            fields: plugin.available_fields(),
        },
        connected: status.connected,
        enabled: status.enabled,
        last_sync: status.last_sync,
    })
}

/// Disconnects a plugin. Disconnecting a plugin that was never connected
/// is not an error.
fn disconnect_plugin(state: &ApiState, user_id: &str, plugin_id: &str) -> Result<(), AppError> {
    find_plugin(state, plugin_id)?;
    state
        .registry
        .disable_user_plugin(user_id, plugin_id)
        .map_err(|e| {
            error!(user_id = %user_id, plugin = %plugin_id, error = %e, "Failed to disconnect plugin");
            AppError::ServerError(format!("Failed to disconnect plugin: {}", e))
        })?;
    Ok(())
}

fn parse_date(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|_| {
                AppError::BadRequest(format!("Invalid {} '{}': expected YYYY-MM-DD", name, v))
            })
        })
        .transpose()
}

/// Runs an on-demand sync for the caller.
async fn sync_now(
    state: &ApiState,
    user_id: &str,
    plugin_id: &str,
    req: SyncRequest,
) -> Result<SyncResult, AppError> {
    let start = parse_date("startDate", req.start_date.as_deref())?;
    let end = parse_date("endDate", req.end_date.as_deref())?;

    let result = state
        .scheduler
        .trigger_sync(user_id, plugin_id, start, end)
        .await?;
    Ok(result)
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<String, AppError> {
    current_user(headers, state.users.as_ref()).map_err(|e| {
        debug!(error = %e, "Request rejected");
        AppError::Unauthorized(format!("Unauthorized: {}", e))
    })
}

async fn list_plugins(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PluginSummary>>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    Ok(Json(list_plugin_status(&state, &user_id)?))
}

async fn get_plugin(
    State(state): State<Arc<ApiState>>,
    Path(plugin_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PluginDetail>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    Ok(Json(plugin_detail(&state, &user_id, &plugin_id)?))
}

async fn delete_plugin(
    State(state): State<Arc<ApiState>>,
    Path(plugin_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    disconnect_plugin(&state, &user_id, &plugin_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/plugins/:id/connect
///
/// Creates a pending authorization (state + PKCE verifier, 10-minute expiry)
/// and redirects the user to the provider's authorization page.
async fn connect_plugin(
    State(state): State<Arc<ApiState>>,
    Path(plugin_id): Path<String>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let url = state.handshake.begin_authorization(&user_id, &plugin_id)?;

    info!(user_id = %user_id, plugin = %plugin_id, "Redirecting to OAuth provider");
    Ok(Redirect::temporary(&url))
}

/// GET /api/plugins/:id/callback
///
/// The state parameter is single-use: it is consumed before the code
/// exchange, so a failed exchange requires a fresh connect.
async fn plugin_callback(
    State(state): State<Arc<ApiState>>,
    Path(plugin_id): Path<String>,
    Query(callback): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, AppError> {
    debug!(plugin = %plugin_id, "OAuth callback received");

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            plugin = %plugin_id,
            error = %error,
            description = %description,
            "OAuth authorization failed"
        );
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let user_id = state
        .handshake
        .complete_authorization(&plugin_id, &code, &csrf_state)
        .await?;

    info!(user_id = %user_id, plugin = %plugin_id, "Plugin connected");
    Ok(Json(CallbackResponse {
        success: true,
        message: format!("Successfully connected {}", plugin_id),
        plugin: plugin_id,
    }))
}

/// POST /api/plugins/:id/sync
///
/// The body is optional; an empty body syncs the default window.
async fn post_sync(
    State(state): State<Arc<ApiState>>,
    Path(plugin_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncResult>, AppError> {
    let user_id = authenticate(&state, &headers)?;
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    Ok(Json(sync_now(&state, &user_id, &plugin_id, req).await?))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::PluginNotFound(_) => AppError::NotFound(e.to_string()),
            SyncError::NotConnected { .. } | SyncError::InvalidRange { .. } => {
                AppError::BadRequest(e.to_string())
            }
            SyncError::Fetch(_) => AppError::BadGateway(e.to_string()),
            SyncError::Store(_) => AppError::ServerError(e.to_string()),
        }
    }
}

impl From<HandshakeError> for AppError {
    fn from(e: HandshakeError) -> Self {
        match e {
            HandshakeError::AuthorizationExpired => AppError::Unauthorized(e.to_string()),
            HandshakeError::PluginNotFound(_) => AppError::NotFound(e.to_string()),
            HandshakeError::PluginMismatch { .. } => AppError::BadRequest(e.to_string()),
            HandshakeError::Exchange(_) => {
                AppError::BadGateway(format!("Failed to exchange authorization code: {}", e))
            }
            HandshakeError::Store(_) => AppError::ServerError(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/:id", get(get_plugin).delete(delete_plugin))
        .route("/api/plugins/:id/connect", get(connect_plugin))
        .route("/api/plugins/:id/callback", get(plugin_callback))
        .route("/api/plugins/:id/sync", post(post_sync))
        .with_state(Arc::new(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
