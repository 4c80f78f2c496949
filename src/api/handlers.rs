//! Request handlers.

use super::AppState;
use super::error::{ApiError, ErrorBody};
use super::extract::Payload;
use crate::models::{NewTodo, Todo, TodoPatch};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Body of a successful delete.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Always true.
    pub success: bool,
}

/// Body of the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `OK` while the process serves requests.
    pub status: &'static str,
    /// Fixed banner.
    pub message: &'static str,
    /// Current time, RFC 3339 with milliseconds.
    pub timestamp: String,
    /// Store a call made now would use.
    pub storage: &'static str,
}

/// `POST /api/todos`
pub async fn create_todo(
    State(state): State<AppState>,
    Payload(new): Payload<NewTodo>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let todo = state.service.create(new).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

/// `GET /api/todos`
pub async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

/// `PUT /api/todos/{id}`
///
/// A missing body is an empty patch.
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Payload(patch): Payload<TodoPatch>,
) -> Result<Json<Todo>, ApiError> {
    Ok(Json(state.service.update(&id, patch).await?))
}

/// `DELETE /api/todos/{id}`
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.service.delete(&id).await?;
    Ok(Json(DeleteResponse { success: true }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Simple CRUD App is running!",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        storage: state.service.active_backend().as_str(),
    })
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => route_not_found(),
    }
}

/// Serves `index.html` for any GET the static files did not satisfy.
pub async fn spa_fallback(method: Method, index: PathBuf) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return route_not_found();
    }

    match tokio::fs::read(&index).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(path = %index.display(), error = %e, "Cannot serve index.html");
            route_not_found()
        },
    }
}

fn route_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("Route not found")),
    )
        .into_response()
}
