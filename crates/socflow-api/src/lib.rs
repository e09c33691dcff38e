//! socflow API /v1: REST endpoints over the workflow engine
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use socflow_core::{Orchestrator, SocflowError};
use socflow_stages::{executor_for, registry_with_renderer, HeuristicBackend, ResponseRenderer, TemplateError};

pub use config::ApiConfig;
pub use metrics::PrometheusTelemetry;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Config(#[from] SocflowError),

    #[error("{0}")]
    Template(#[from] TemplateError),

    #[error("METRICS/{0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),

    #[error("NOT_FOUND/{0}")]
    NotFound(String),

    #[error("CONFLICT/{0}")]
    Conflict(String),

    #[error("BAD_REQUEST/{0}")]
    BadRequest(String),

    #[error("INTERNAL/{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ============================================================================
// SERVER STATE
// ============================================================================

type ActiveMap = Arc<Mutex<HashMap<String, CancellationToken>>>;

fn lock(active: &ActiveMap) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub telemetry: Arc<PrometheusTelemetry>,
    active: ActiveMap,
}

/// Registration of a running workflow; dropping it frees the id.
///
/// Handlers hold it across the run, so a client disconnect that drops the
/// handler future still unregisters the workflow.
pub struct ActiveWorkflow {
    workflow_id: String,
    token: CancellationToken,
    active: ActiveMap,
}

impl ActiveWorkflow {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActiveWorkflow {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.workflow_id);
    }
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, telemetry: Arc<PrometheusTelemetry>) -> Self {
        Self {
            orchestrator: orchestrator.with_telemetry(telemetry.clone()),
            telemetry,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wire the heuristic backend, the configured executor and templates
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let renderer = match &config.templates_path {
            Some(path) => ResponseRenderer::load(path)?,
            None => ResponseRenderer::builtin()?,
        };
        let registry = registry_with_renderer(
            Arc::new(HeuristicBackend::new()),
            executor_for(config.execution_mode),
            Arc::new(renderer),
            &config.engine,
        );
        registry.ensure_complete()?;

        let orchestrator = Orchestrator::new(registry, config.engine.clone());
        Ok(Self::new(orchestrator, Arc::new(PrometheusTelemetry::new()?)))
    }

    /// Register a cancellation token for a workflow about to run
    pub fn track(&self, workflow_id: &str) -> Result<ActiveWorkflow, ApiError> {
        let mut active = lock(&self.active);
        if active.contains_key(workflow_id) {
            return Err(ApiError::Conflict(format!("workflow `{}` is already running", workflow_id)));
        }
        let token = CancellationToken::new();
        active.insert(workflow_id.to_string(), token.clone());
        Ok(ActiveWorkflow {
            workflow_id: workflow_id.to_string(),
            token,
            active: self.active.clone(),
        })
    }

    /// Trip the token of a running workflow; false when none is running
    pub fn cancel(&self, workflow_id: &str) -> bool {
        match lock(&self.active).get(workflow_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/workflows", post(handlers::start_workflow))
        .route("/v1/workflows/active", get(handlers::active_workflows))
        .route("/v1/workflows/resume", post(handlers::resume_workflow))
        .route("/v1/workflows/{id}/cancel", post(handlers::cancel_workflow))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(axum_middleware::from_fn(middleware::echo_workflow_id))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(config: ApiConfig) -> Result<(), ApiError> {
    let app = create_app(AppState::from_config(&config)?);
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;

    tracing::info!(addr = %config.addr, mode = ?config.execution_mode, "socflow API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
