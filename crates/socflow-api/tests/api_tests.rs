//! HTTP-level tests driven through `tower::ServiceExt::oneshot`.
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use socflow_api::{create_app, ApiConfig, AppState, PrometheusTelemetry};
use socflow_core::{EngineConfig, Orchestrator};
use socflow_stages::{default_registry, AnalysisBackend, AnalysisRequest, BackendError, DryRunExecutor};

fn app_state() -> AppState {
    AppState::from_config(&ApiConfig::default()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn critical_request() -> Value {
    json!({
        "user_id": "analyst-1",
        "session_id": "s-1",
        "request_type": "incident_investigation",
        "alerts": [{
            "id": "a-1",
            "title": "Ransomware note dropped",
            "severity": "critical",
            "timestamp": "2026-10-19T02:14:00Z",
            "indicators": ["198.51.100.7"],
            "entity_ids": ["e-1"]
        }],
        "entities": [{"id": "e-1", "name": "fileserver-01", "entity_type": "host", "criticality": "critical"}],
        "threat_intelligence": [{"id": "ti-1", "indicator": "198.51.100.7", "threat_level": "critical"}]
    })
}

#[tokio::test]
async fn test_health_lists_stages() {
    let app = create_app(app_state());
    let request = Request::builder().uri("/v1/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["stages"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn test_low_severity_workflow_completes() {
    let app = create_app(app_state());
    let request = json!({
        "user_id": "analyst-1",
        "session_id": "s-2",
        "alerts": [{"id": "a-9", "title": "Port scan", "severity": "low", "timestamp": "2026-10-19T08:00:00Z"}]
    });
    let (status, body) = send(&app, post_json("/v1/workflows", &request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_phase"], "completed");
    assert!(body["learning_insights"].is_array());
}

#[tokio::test]
async fn test_pause_and_resume_over_http() {
    let app = create_app(app_state());
    let (status, paused) = send(&app, post_json("/v1/workflows", &critical_request())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["current_phase"], "human_review");
    assert_eq!(paused["human_input_required"], true);

    let resume = json!({ "state": paused, "response": "approved" });
    let (status, done) = send(&app, post_json("/v1/workflows/resume", &resume)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["current_phase"], "completed");
    assert_eq!(done["human_input_response"], "approved");
}

#[tokio::test]
async fn test_caller_chosen_workflow_id() {
    let app = create_app(app_state());
    let request = Request::builder()
        .method("POST")
        .uri("/v1/workflows")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-workflow-id", "wf-caller-1")
        .body(Body::from(critical_request().to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-workflow-id"], "wf-caller-1");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["workflow_id"], "wf-caller-1");
}

#[tokio::test]
async fn test_cancel_unknown_workflow_is_404() {
    let app = create_app(app_state());
    let (status, body) = send(&app, post_json("/v1/workflows/nope/cancel", &json!({}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().starts_with("NOT_FOUND/"));
}

#[tokio::test]
async fn test_cancel_trips_running_token() {
    let state = app_state();
    let running = state.track("wf-running").unwrap();
    let app = create_app(state.clone());

    let (status, body) = send(&app, post_json("/v1/workflows/wf-running/cancel", &json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "cancelling");
    assert!(running.token().is_cancelled());
}

#[tokio::test]
async fn test_duplicate_workflow_id_conflicts() {
    let state = app_state();
    let _running = state.track("wf-dup").unwrap();
    let app = create_app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/workflows")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-workflow-id", "wf-dup")
        .body(Body::from(critical_request().to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_malformed_request_rejected() {
    let app = create_app(app_state());
    let (status, _) = send(&app, post_json("/v1/workflows", &json!({ "alerts": 5 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_metrics_reflect_runs() {
    let app = create_app(app_state());
    send(&app, post_json("/v1/workflows", &critical_request())).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("socflow_workflows_started_total{workflow_type=\"incident_investigation\"} 1"));
    assert!(text.contains("socflow_phase_latency_seconds"));
}

/// Backend that never answers within a test's lifetime
struct StalledBackend;

#[async_trait::async_trait]
impl AnalysisBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn analyze(&self, _request: &AnalysisRequest) -> Result<String, BackendError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Err(BackendError::Unreachable("timed out".into()))
    }
}

#[tokio::test]
async fn test_client_disconnect_frees_workflow_id() {
    let config = EngineConfig::default();
    let registry = default_registry(Arc::new(StalledBackend), Arc::new(DryRunExecutor), &config).unwrap();
    let state = AppState::new(
        Orchestrator::new(registry, config),
        Arc::new(PrometheusTelemetry::new().unwrap()),
    );
    let app = create_app(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/workflows")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-workflow-id", "wf-drop")
        .body(Body::from(critical_request().to_string()))
        .unwrap();
    let in_flight = tokio::spawn(app.clone().oneshot(request));

    for _ in 0..200 {
        if !state.active_ids().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state.active_ids(), vec!["wf-drop".to_string()]);

    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());

    assert!(state.active_ids().is_empty());
    assert!(state.track("wf-drop").is_ok());
}
