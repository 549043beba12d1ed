//! Request handlers for the HTTP API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AssistantError, ErrorKind};
use crate::tools::ToolDescriptor;

use super::AppState;

/// Session used when the request does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Body of `POST /api/ask`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub total: usize,
    pub tools: Vec<ToolDescriptor>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for each caller-visible error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyMessage | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::SessionBusy => StatusCode::CONFLICT,
        ErrorKind::ModelRequestFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::LoopBudgetExceeded
        | ErrorKind::Cancelled
        | ErrorKind::InvariantViolation
        | ErrorKind::Config
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AssistantError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: AssistantError) -> Self {
        let kind = err.kind();
        (
            status_for(kind),
            Json(ErrorResponse {
                error: err.to_string(),
                kind,
            }),
        )
    }
}

/// POST /api/ask - Answer one message within a session
pub async fn ask(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(status = %rejection.status(), "Rejected ask body");
        AssistantError::InvalidRequest(rejection.body_text())
    })?;
    let message = request.message.unwrap_or_default();
    let session = request
        .session
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    // Axum drops this future when the client disconnects; the guard then
    // cancels whatever the loop is waiting on.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    debug!(session = %session, "Received ask request");
    let response = state
        .agent
        .ask_with_cancel(&session, &message, &cancel)
        .await?;

    Ok(Json(AskResponse { response }))
}

/// GET /api/tools - List the tool catalog
pub async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    let tools = state.agent.registry().list().to_vec();
    Json(ToolsResponse {
        total: tools.len(),
        tools,
    })
}

/// GET /health - Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
