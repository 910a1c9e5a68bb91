//! HTTP API called by pane hooks.
//!
//! One typed request per route. Bodies are validated before the bridge is
//! touched; a malformed or incomplete body is always a 400.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use slackmux_bridge::{Bridge, ConnectStatus, NotifyKind};
use slackmux_core::{BridgeError, validate_pane_handle};
use thiserror::Error;

pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/thread", post(create_thread))
        .route("/connect", post(connect))
        .route("/notify", post(notify))
        .route("/rename", post(rename))
        .route("/close", post(close))
        .route("/health", get(health))
        .with_state(bridge)
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Bridge(BridgeError::InvalidHandle(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Bridge(BridgeError::NoBinding(_)) => StatusCode::NOT_FOUND,
            Self::Bridge(BridgeError::ExternalFailure(_)) => StatusCode::BAD_GATEWAY,
            Self::Bridge(BridgeError::PersistenceFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {self}");
        } else {
            tracing::debug!(status = status.as_u16(), "request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// ─── Requests ─────────────────────────────────────────────────────

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `POST /thread` and `POST /connect`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaneRequest {
    pub pane_id: String,
    pub name: String,
    pub session: String,
}

impl PaneRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.pane_id.is_empty() || self.name.is_empty() || self.session.is_empty() {
            return Err(ApiError::BadRequest(
                "pane_id, name, and session are required".into(),
            ));
        }
        validate_pane_handle(&self.pane_id)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotifyRequest {
    pub pane_id: String,
    pub name: Option<String>,
    pub session: Option<String>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotifyKind,
}

impl NotifyRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.pane_id.is_empty() {
            return Err(ApiError::BadRequest("pane_id is required".into()));
        }
        // A stop event may carry no final message.
        if self.message.is_empty() && self.kind == NotifyKind::Notification {
            return Err(ApiError::BadRequest("pane_id and message are required".into()));
        }
        validate_pane_handle(&self.pane_id)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RenameRequest {
    pub pane_id: String,
    pub old_name: String,
    pub new_name: String,
    pub session: String,
}

impl RenameRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if [&self.pane_id, &self.old_name, &self.new_name, &self.session]
            .iter()
            .any(|v| v.is_empty())
        {
            return Err(ApiError::BadRequest(
                "pane_id, old_name, new_name, and session are required".into(),
            ));
        }
        validate_pane_handle(&self.pane_id)?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloseRequest {
    pub pane_id: String,
    pub name: Option<String>,
    pub session: Option<String>,
    pub permanent: bool,
}

impl CloseRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.pane_id.is_empty() {
            return Err(ApiError::BadRequest("pane_id is required".into()));
        }
        validate_pane_handle(&self.pane_id)?;
        Ok(())
    }
}

// ─── Handlers ─────────────────────────────────────────────────────

async fn create_thread(
    State(bridge): State<Bridge>,
    body: Result<Json<PaneRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    req.validate()?;
    let thread_ts = bridge
        .create_thread(&req.session, &req.name, &req.pane_id)
        .await?;
    Ok(Json(json!({ "ok": true, "thread_ts": thread_ts })))
}

async fn connect(
    State(bridge): State<Bridge>,
    body: Result<Json<PaneRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    req.validate()?;
    let outcome = bridge.connect(&req.session, &req.name, &req.pane_id).await?;
    Ok(Json(json!({
        "ok": true,
        "thread_ts": outcome.thread_ref,
        "reconnected": outcome.status == ConnectStatus::Reconnected,
    })))
}

async fn notify(
    State(bridge): State<Bridge>,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    req.validate()?;
    bridge
        .notify(
            &req.pane_id,
            present(&req.session),
            present(&req.name),
            &req.message,
            req.kind,
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn rename(
    State(bridge): State<Bridge>,
    body: Result<Json<RenameRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    req.validate()?;
    let renamed = bridge
        .rename(&req.pane_id, &req.session, &req.old_name, &req.new_name)
        .await?;
    Ok(Json(json!({ "ok": true, "renamed": renamed })))
}

async fn close(
    State(bridge): State<Bridge>,
    body: Result<Json<CloseRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    req.validate()?;
    bridge
        .close(
            &req.pane_id,
            present(&req.session),
            present(&req.name),
            req.permanent,
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn health(State(bridge): State<Bridge>) -> Json<Value> {
    let health = bridge.health().await;
    Json(json!({
        "ok": true,
        "mappings": health.bindings,
        "records": health.records,
        "uptime": health.uptime_secs,
    }))
}
