use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State, WebSocketUpgrade},
    http::{header::AUTHORIZATION, request::Parts, Uri},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use workbench_sandbox::WorkspaceRootRegistry;
use workbench_terminal::{SessionInfo, SessionRegistry};

use super::error::AppError;
use super::files;
use super::gateway;
use crate::auth::AuthStore;
use crate::config::RateLimitConfig;
use crate::logging::{path_without_query, redact_token};

/// Header carrying the session token on plain HTTP requests
pub const AUTH_SESSION_HEADER: &str = "x-auth-session";

/// Largest multipart body accepted by the upload route
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub roots: WorkspaceRootRegistry,
    pub auth: Arc<dyn AuthStore>,
    pub rate_limit: RateLimitConfig,
}

/// Create router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Terminal
        .route("/api/term/ws", get(terminal_ws))
        .route("/api/term/sessions", get(list_sessions))
        .route("/api/term/sessions/:id", delete(kill_session))
        // Files
        .route("/api/files/tree", get(files::tree))
        .route("/api/files/read", get(files::read))
        .route("/api/files/raw", get(files::raw))
        .route(
            "/api/files/upload",
            post(files::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/files/write", post(files::write))
        .route("/api/files/create", post(files::create))
        .route("/api/files/rename", post(files::rename))
        .route("/api/files/delete", delete(files::remove))
        .with_state(state)
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// GET /api/term/ws?token=... - WebSocket endpoint
///
/// The token is checked after the upgrade so a refusal can carry a close
/// status the browser can read.
async fn terminal_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    uri: Uri,
) -> Response {
    let uri = uri.to_string();
    info!(
        path = path_without_query(&uri),
        token = %redact_token(query.token.as_deref()),
        "terminal connection attempt"
    );

    ws.on_upgrade(move |socket| {
        gateway::serve_socket(socket, state.registry, state.auth, query.token, state.rate_limit)
    })
}

/// GET /api/term/sessions - List running terminal sessions
async fn list_sessions(_auth: Authenticated, State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.list().await)
}

/// DELETE /api/term/sessions/:id - Kill a terminal session
async fn kill_session(
    _auth: Authenticated,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.registry.kill(&id).await?;
    info!(session_id = %id, "terminal session killed on request");

    Ok(Json(serde_json::json!({
        "success": true,
        "sessionId": id,
    })))
}

/// Proof that the request carried a valid session token.
///
/// Accepted from the `x-auth-session` header, a bearer `Authorization`
/// header, or the `token` query parameter, in that order.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match request_token(parts) {
            Some(token) => token,
            None => return Err(AppError::Unauthorized("Unauthorized: Missing token").into_response()),
        };

        match state.auth.is_valid_session(&token).await {
            Ok(true) => Ok(Authenticated),
            Ok(false) => Err(AppError::Unauthorized("Unauthorized: Invalid token").into_response()),
            Err(e) => Err(AppError::from(e).into_response()),
        }
    }
}

fn request_token(parts: &Parts) -> Option<String> {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if let Some(token) = header(AUTH_SESSION_HEADER) {
        return Some(token);
    }
    if let Some(value) = header(AUTHORIZATION.as_str()) {
        if let Some(token) = value.strip_prefix("Bearer ").map(str::trim) {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|v| !v.is_empty())
}
