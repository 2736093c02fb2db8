// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST endpoints and router assembly.

use crate::auth::{AuthProvider, AuthUser};
use crate::hub::Hub;
use crate::streamer::EventStreamer;
use crate::views;
use crate::ws::ws_handler;
use crate::Store;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ns_core::clock::Clock;
use ns_core::{ProjectRegistry, SystemClock};
use ns_storage::StoreError;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Cancellation seam into the worker.
pub trait PromptCanceler: Send + Sync {
    fn request_cancel(&self, prompt_id: &str, restart: bool) -> bool;
}

/// Status-panel seam; the daemon bridges this to the display manager.
pub trait StatusSurface: Send + Sync {
    fn request_refresh(&self, reason: &str);
}

/// Surface that ignores refresh requests (headless installs, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSurface;

impl StatusSurface for NoSurface {
    fn request_refresh(&self, _reason: &str) {}
}

/// Shared handler context, wired once at startup.
pub struct AppState {
    pub store: Arc<Store>,
    pub hub: Arc<Hub>,
    pub streamer: Arc<EventStreamer>,
    pub auth: Arc<dyn AuthProvider>,
    pub projects: Arc<dyn ProjectRegistry>,
    pub canceler: Arc<dyn PromptCanceler>,
    pub surface: Arc<dyn StatusSurface>,
    pub daemon_log_path: PathBuf,
}

/// Assemble the router: REST endpoints, `/ws`, and static assets.
pub fn build_router(state: Arc<AppState>, frontend_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/login", post(handler_login))
        .route("/api/projects", get(handler_projects))
        .route("/api/health", get(handler_health))
        .route("/api/logs", get(handler_logs))
        .route("/api/prompts", get(handler_list_prompts).post(handler_submit_prompt))
        .route(
            "/api/prompts/{id}",
            get(handler_get_prompt).put(handler_edit_prompt).delete(handler_delete_prompt),
        )
        .route("/api/prompts/{id}/retry", post(handler_retry_prompt))
        .route("/api/prompts/{id}/cancel", post(handler_cancel_prompt))
        .with_state(state);
    if let Some(dir) = frontend_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn store_error(err: StoreError) -> Response {
    match err {
        StoreError::EmptyText => error_json(StatusCode::BAD_REQUEST, err.to_string()),
        StoreError::NotFound => error_json(StatusCode::NOT_FOUND, "prompt not found"),
        StoreError::Conflict(message) => error_json(StatusCode::CONFLICT, message),
        StoreError::Persist(_) | StoreError::Encode(_) => {
            tracing::error!(error = %err, "prompt store persistence failure");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist prompt store")
        }
    }
}

fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();
    if token.is_empty() {
        return Err(error_json(StatusCode::UNAUTHORIZED, "authorization required"));
    }
    state
        .auth
        .verify_token(token)
        .ok_or_else(|| error_json(StatusCode::UNAUTHORIZED, "invalid or expired token"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn handler_login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginBody>,
) -> Response {
    let email = body.email.trim();
    if email.is_empty() || body.password.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "email and password are required");
    }
    let Some(user) = state.auth.authenticate(email, &body.password) else {
        return error_json(StatusCode::UNAUTHORIZED, "invalid credentials");
    };
    let Some(token) = state.auth.issue_token(&user.email) else {
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to issue token");
    };
    Json(json!({ "token": token, "user": state.auth.user_payload(&user) })).into_response()
}

async fn handler_projects(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "projects": state.projects.list(),
        "default_project_id": state.projects.default_project_id(),
    }))
    .into_response()
}

async fn handler_health(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let user = match require_auth(&state, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let mut payload = state.streamer.health_payload();
    payload["user"] = state.auth.user_payload(&user);
    Json(payload).into_response()
}

async fn handler_logs(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    let log = std::fs::read_to_string(&state.daemon_log_path).unwrap_or_default();
    Json(json!({ "log": log })).into_response()
}

async fn handler_list_prompts(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    let now = SystemClock.timestamp();
    let records = state.store.list();
    Json(views::queue_snapshot(&records, state.projects.as_ref(), &now)).into_response()
}

#[derive(Deserialize)]
struct SubmitBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    reply_to: Option<String>,
}

async fn handler_submit_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    let project_id = state.projects.resolve(body.project_id.as_deref());
    let reply_to = body.reply_to.map(ns_core::PromptId::from_string);
    let record = match state.store.submit(&body.prompt, project_id, reply_to) {
        Ok(record) => record,
        Err(err) => return store_error(err),
    };
    tracing::info!(prompt_id = %record.id, "queued prompt");
    state.surface.request_refresh("queued");
    state.streamer.broadcast_queue(None);
    state.streamer.broadcast_prompt(record.id.as_str(), None);
    state.streamer.broadcast_health(None);
    (
        StatusCode::CREATED,
        Json(json!({ "prompt_id": record.id, "status": record.status })),
    )
        .into_response()
}

async fn handler_get_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    match state.store.get(&id) {
        Some(record) => {
            Json(views::prompt_payload(&record, state.projects.as_ref())).into_response()
        }
        None => error_json(StatusCode::NOT_FOUND, "prompt not found"),
    }
}

#[derive(Deserialize)]
struct EditBody {
    #[serde(default)]
    prompt: String,
}

async fn handler_edit_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<EditBody>,
) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    let record = match state.store.edit(&id, &body.prompt) {
        Ok(record) => record,
        Err(err) => return store_error(err),
    };
    tracing::info!(prompt_id = %id, "prompt edited");
    state.surface.request_refresh("edit");
    state.streamer.broadcast_queue(None);
    state.streamer.broadcast_prompt(&id, None);
    Json(json!({ "prompt": views::prompt_payload(&record, state.projects.as_ref()) }))
        .into_response()
}

async fn handler_delete_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    if let Err(err) = state.store.delete(&id) {
        return store_error(err);
    }
    tracing::info!(prompt_id = %id, "prompt deleted");
    state.surface.request_refresh("delete");
    state.streamer.broadcast_queue(None);
    state.streamer.broadcast_health(None);
    state.streamer.broadcast_prompt_deleted(&id);
    Json(json!({ "prompt_id": id, "deleted": true })).into_response()
}

async fn handler_retry_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    let record = match state.store.retry(&id) {
        Ok(record) => record,
        Err(err) => return store_error(err),
    };
    tracing::info!(prompt_id = %id, "manual retry requested");
    state.surface.request_refresh("retry");
    state.streamer.broadcast_queue(None);
    state.streamer.broadcast_prompt(&id, None);
    state.streamer.broadcast_health(None);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "prompt_id": record.id, "status": record.status })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct CancelBody {
    #[serde(default)]
    restart: bool,
}

async fn handler_cancel_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    body: axum::body::Bytes,
) -> Response {
    if let Err(response) = require_auth(&state, &headers) {
        return response;
    }
    // An absent body means "no restart".
    let restart = serde_json::from_slice::<CancelBody>(&body).map(|b| b.restart).unwrap_or(false);
    let Some(record) = state.store.get(&id) else {
        return error_json(StatusCode::NOT_FOUND, "prompt not found");
    };
    if record.status != ns_core::PromptStatus::Running {
        return error_json(StatusCode::BAD_REQUEST, "prompt is not running");
    }
    if !state.canceler.request_cancel(&id, restart) {
        return error_json(StatusCode::CONFLICT, "prompt is no longer running");
    }
    tracing::info!(prompt_id = %id, restart, "cancellation requested");
    (
        StatusCode::ACCEPTED,
        Json(json!({ "prompt_id": id, "status": "canceling", "restart": restart })),
    )
        .into_response()
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
