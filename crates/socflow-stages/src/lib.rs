//! SOC Stages: the concrete analysis stages behind the workflow engine.
//!
//! Analysis stages consult an [`AnalysisBackend`] and parse its answer
//! defensively; control stages (human review, error handling, learning) are
//! deterministic. Response actions go through an [`ActionExecutor`].
//!
//! # Stage Flow
//!
//! ```text
//! threat ─► risk ─► correlation ─► decision ─► response ─► action ─► learning
//!   └──────── backend ────────────────┘           │           │
//!                                           templates     executor
//! ```

mod action_execution;
mod backend;
mod correlation;
mod decision;
mod error;
mod error_handling;
mod executor;
mod heuristic;
mod human_review;
mod incident;
mod learning;
mod payload;
mod playbooks;
mod response_generation;
mod risk_assessment;
mod scoring;
mod scripted;
mod templates;
mod threat_analysis;

#[cfg(test)]
mod test_support;

pub use action_execution::ActionExecutionStage;
pub use backend::{AnalysisBackend, AnalysisContext, AnalysisRequest, AnalysisTask};
pub use correlation::CorrelationStage;
pub use decision::DecisionStage;
pub use error::{BackendError, ExecutorError, PayloadError, TemplateError};
pub use error_handling::{ErrorHandlingStage, ErrorKind};
pub use executor::{executor_for, ActionExecutor, DisabledExecutor, DryRunExecutor, ExecutionMode};
pub use heuristic::HeuristicBackend;
pub use human_review::HumanReviewStage;
pub use learning::LearningStage;
pub use payload::{extract_json, parse_or_default, parse_payload, Payload};
pub use playbooks::{suggest as suggest_playbooks, Playbook, CATALOG as PLAYBOOK_CATALOG};
pub use response_generation::{channels_for, ResponseGenerationStage};
pub use risk_assessment::RiskAssessmentStage;
pub use scoring::{categorize, RiskCalculator, RiskInput};
pub use scripted::ScriptedBackend;
pub use templates::{ResponseRenderer, Template, TemplatesFile, BUILTIN_TEMPLATES, REQUIRED_TEMPLATES};
pub use threat_analysis::ThreatAnalysisStage;

use std::sync::Arc;

use socflow_core::{EngineConfig, StageRegistry};

// ============================================================================
// REGISTRY BUILDERS
// ============================================================================

/// Registry with all nine stages over the built-in templates
pub fn default_registry(
    backend: Arc<dyn AnalysisBackend>,
    executor: Arc<dyn ActionExecutor>,
    config: &EngineConfig,
) -> Result<StageRegistry, TemplateError> {
    let renderer = Arc::new(ResponseRenderer::builtin()?);
    Ok(registry_with_renderer(backend, executor, renderer, config))
}

/// Registry with all nine stages over a caller-supplied template catalog
pub fn registry_with_renderer(
    backend: Arc<dyn AnalysisBackend>,
    executor: Arc<dyn ActionExecutor>,
    renderer: Arc<ResponseRenderer>,
    config: &EngineConfig,
) -> StageRegistry {
    StageRegistry::new()
        .register(Arc::new(ThreatAnalysisStage::new(backend.clone())))
        .register(Arc::new(RiskAssessmentStage::new(backend.clone())))
        .register(Arc::new(CorrelationStage::new(backend.clone())))
        .register(Arc::new(DecisionStage::new(backend.clone())))
        .register(Arc::new(HumanReviewStage::new(config.confidence_threshold, renderer.clone())))
        .register(Arc::new(ResponseGenerationStage::new(backend, renderer)))
        .register(Arc::new(ActionExecutionStage::new(executor)))
        .register(Arc::new(ErrorHandlingStage::new(config.max_retries)))
        .register(Arc::new(LearningStage::new()))
}
