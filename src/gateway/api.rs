//! REST handlers under `/api`
//!
//! Every route sits behind `require_token`, which accepts the shared secret
//! as a bearer header or a `?token=` query parameter.

use std::path::PathBuf;

use axum::{
    Json,
    extract::{Path, Query, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::context::AppContext;
use crate::error::{AuthError, Error, SessionError};
use crate::session::{ProjectEntry, ProjectGroup, SessionView};

/// `?token=` query parameter
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Error response carrying an HTTP status and a JSON body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Session(SessionError::MissingProjectPath) => StatusCode::BAD_REQUEST,
            Error::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Auth(AuthError::InvalidToken) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("Request failed: {}", err);
        }
        // Client-facing errors carry their own message without the category prefix
        let message = match err {
            Error::Session(e) => e.to_string(),
            Error::Auth(e) => e.to_string(),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16(),
        }));
        (self.status, body).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Reject requests that do not present the shared secret
pub async fn require_token(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let query = Query::<TokenQuery>::try_from_uri(request.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let presented = bearer_token(request.headers()).or(query.token.as_deref());

    match ctx.credentials.verify(presented) {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `GET /api/sessions`
pub async fn list_sessions(State(ctx): State<AppContext>) -> Json<Vec<SessionView>> {
    Json(ctx.registry.list_sessions().await)
}

/// `GET /api/sessions/grouped`
pub async fn grouped_sessions(State(ctx): State<AppContext>) -> Json<Vec<ProjectGroup>> {
    Json(ctx.registry.grouped_sessions().await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpawnRequest {
    pub project_path: Option<PathBuf>,
}

/// `POST /api/sessions`
pub async fn spawn_session(
    State(ctx): State<AppContext>,
    body: Result<Json<SpawnRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body?;
    let path = request
        .project_path
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(SessionError::MissingProjectPath)
        .map_err(Error::from)?;

    let session_name = ctx.registry.spawn(&path).await?;
    Ok(Json(json!({
        "sessionName": session_name,
        "status": "spawned",
    })))
}

/// `DELETE /api/sessions/:name`
pub async fn kill_session(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !ctx.registry.contains(&name).await {
        return Err(Error::from(SessionError::NotFound(name)).into());
    }
    ctx.registry.kill_session(&name).await;
    Ok(Json(json!({ "killed": name })))
}

/// `POST /api/sessions/cleanup`
pub async fn cleanup_sessions(State(ctx): State<AppContext>) -> Json<Value> {
    let killed = ctx.registry.kill_stale().await;
    Json(json!({ "count": killed.len(), "killed": killed }))
}

/// `GET /api/projects`
pub async fn list_projects(State(ctx): State<AppContext>) -> Json<Vec<ProjectEntry>> {
    Json(ctx.registry.list_projects().await)
}
