//! API Handlers
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use socflow_core::{RunState, WorkflowRequest, SOCFLOW_VERSION};

use crate::middleware::WORKFLOW_ID_HEADER;
use crate::{ApiError, AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub state: RunState,
    pub response: String,
}

/// Run a new workflow until it finishes or pauses for review
pub async fn start_workflow(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<RunState>, ApiError> {
    let mut state = RunState::new(request);
    if let Some(id) = headers.get(WORKFLOW_ID_HEADER).and_then(|v| v.to_str().ok()) {
        state = state.with_workflow_id(id.trim());
    }
    if state.workflow_id.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", WORKFLOW_ID_HEADER)));
    }

    let running = app.track(&state.workflow_id)?;
    let result = app.orchestrator.run_with_cancel(state, running.token()).await;
    Ok(Json(result))
}

/// Supply the operator answer to a paused workflow and continue it
pub async fn resume_workflow(
    State(app): State<AppState>,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<RunState>, ApiError> {
    let ResumeRequest { state, response } = request;
    if state.is_finished() {
        return Ok(Json(state));
    }

    let running = app.track(&state.workflow_id)?;
    let result = app.orchestrator.resume_with_cancel(state, response, running.token()).await;
    Ok(Json(result))
}

/// Cancel an in-flight workflow
pub async fn cancel_workflow(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if app.cancel(&id) {
        Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "workflow_id": id, "status": "cancelling" })),
        ))
    } else {
        Err(ApiError::NotFound(format!("no running workflow `{}`", id)))
    }
}

/// Workflows currently being driven by this server
pub async fn active_workflows(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "workflows": app.active_ids() }))
}

pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let stages: Vec<&str> = app
        .orchestrator
        .registry()
        .ids()
        .into_iter()
        .map(|id| id.as_str())
        .collect();
    Json(json!({ "status": "ok", "version": SOCFLOW_VERSION, "stages": stages }))
}

pub async fn metrics(State(app): State<AppState>) -> Response {
    match app.telemetry.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => ApiError::Internal(e.to_string()).into_response(),
    }
}
