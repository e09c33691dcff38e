//! Analysis backend seam.
//!
//! Every analysis stage receives its backend through its constructor. The
//! backend sees a structured [`AnalysisContext`] and answers with raw text
//! that the stage parses defensively.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use socflow_core::outputs::{CorrelationResult, RiskAssessment, ThreatAnalysis, ThreatClassification};
use socflow_core::{
    Alert, Entity, Incident, RequestType, RunState, RunStateDelta, StageId, ThreatIntelligence,
};

use crate::error::BackendError;
use crate::payload::{parse_or_default, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTask {
    ThreatAnalysis,
    RiskAssessment,
    Correlation,
    Decision,
    Narrative,
}

impl AnalysisTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisTask::ThreatAnalysis => "threat_analysis",
            AnalysisTask::RiskAssessment => "risk_assessment",
            AnalysisTask::Correlation => "correlation",
            AnalysisTask::Decision => "decision",
            AnalysisTask::Narrative => "narrative",
        }
    }

    /// Expected answer shape, for backends driven by a language model
    pub fn instructions(&self) -> &'static str {
        match self {
            AnalysisTask::ThreatAnalysis => {
                "Identify threats in the alerts and incidents. Answer with one JSON object: \
                 {threats_detected: [{id, name, category, severity, related_alert_ids, indicators, description}], \
                 overall_threat_level, attack_vectors, mitre_techniques, summary, confidence, reasoning: [string]}"
            }
            AnalysisTask::RiskAssessment => {
                "Assess business risk. Answer with one JSON object: \
                 {assessment: {overall_score, level, factors: [{name, impact, description, mitigation}], \
                 affected_assets, business_impact, likelihood, confidence}, \
                 prioritization: {ranked: [{item_id, item_kind, priority, score, rationale}]}, reasoning: [string]}"
            }
            AnalysisTask::Correlation => {
                "Correlate the security events. Answer with one JSON object: \
                 {correlations: [{id, correlation_type, related_ids, strength, description}], confidence, reasoning: [string]}"
            }
            AnalysisTask::Decision => {
                "Decide the response. Answer with one JSON object: \
                 {classification: {category, severity, is_true_positive, confidence}, \
                 strategy: {strategy_type, priority, actions: [{id, action_type, target, description, automated}], rationale}, \
                 allocation: {analysts_required, estimated_effort_hours, teams, sla_minutes}, \
                 escalation: {should_escalate, target, reason, urgency}, confidence, reasoning: [string]}"
            }
            AnalysisTask::Narrative => {
                "Summarize the investigation for a SOC analyst. Answer with one JSON object: \
                 {summary, details, audience}"
            }
        }
    }
}

/// What a backend gets to see: the inputs plus upstream outputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisContext {
    pub workflow_id: String,
    pub request_type: RequestType,
    pub alerts: Vec<Alert>,
    pub incidents: Vec<Incident>,
    pub entities: Vec<Entity>,
    pub threat_intelligence: Vec<ThreatIntelligence>,
    pub threat_analysis: Option<ThreatAnalysis>,
    pub risk_assessment: Option<RiskAssessment>,
    pub correlations: Option<Vec<CorrelationResult>>,
    pub threat_classification: Option<ThreatClassification>,
    pub human_input_response: Option<String>,
}

impl AnalysisContext {
    pub fn from_state(state: &RunState) -> Self {
        Self {
            workflow_id: state.workflow_id.clone(),
            request_type: state.request_type,
            alerts: state.alerts.clone(),
            incidents: state.incidents.clone(),
            entities: state.entities.clone(),
            threat_intelligence: state.threat_intelligence.clone(),
            threat_analysis: state.threat_analysis.clone(),
            risk_assessment: state.risk_assessment.clone(),
            correlations: state.correlations.clone(),
            threat_classification: state.threat_classification.clone(),
            human_input_response: state.human_input_response.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub task: AnalysisTask,
    pub instructions: String,
    pub context: Value,
}

impl AnalysisRequest {
    pub fn new(task: AnalysisTask, context: &AnalysisContext) -> Result<Self, BackendError> {
        let context = serde_json::to_value(context).map_err(|e| BackendError::InvalidContext(e.to_string()))?;
        Ok(Self {
            task,
            instructions: task.instructions().to_string(),
            context,
        })
    }

    /// Typed view of the context
    pub fn context(&self) -> Result<AnalysisContext, BackendError> {
        serde_json::from_value(self.context.clone()).map_err(|e| BackendError::InvalidContext(e.to_string()))
    }
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Raw answer text; may wrap JSON in prose or code fences
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, BackendError>;
}

/// Outcome of one backend consultation
#[derive(Debug)]
pub(crate) struct Consulted<T> {
    pub payload: Payload<T>,
    /// Set when the answer could not be parsed and defaults were used
    pub parse_warning: Option<String>,
}

/// Ask the backend and parse its answer.
///
/// `Err` carries the failure delta to return when the backend is unreachable.
pub(crate) async fn consult<T>(
    backend: &dyn AnalysisBackend,
    stage: StageId,
    task: AnalysisTask,
    state: &RunState,
) -> Result<Consulted<T>, RunStateDelta>
where
    T: DeserializeOwned + Default,
{
    let request = AnalysisRequest::new(task, &AnalysisContext::from_state(state))
        .map_err(|e| RunStateDelta::failure(format!("{}: {}", stage, e)))?;

    let raw = backend.analyze(&request).await.map_err(|e| {
        warn!(%stage, backend = backend.name(), error = %e, "analysis backend failed");
        RunStateDelta::failure(format!("{}: {}", stage, e))
    })?;

    let (payload, parse_warning) = parse_or_default::<T>(&raw);
    if let Some(warning) = &parse_warning {
        warn!(%stage, backend = backend.name(), %warning, "unparsable analysis payload");
    }
    Ok(Consulted {
        payload,
        parse_warning: parse_warning.map(|w| format!("{}: {}; using defaults", stage, w)),
    })
}

/// Attach confidence, reasoning and an optional parse warning to `delta`.
///
/// A parse warning forces the confidence to 0.0.
pub(crate) fn annotate(
    delta: RunStateDelta,
    stage: StageId,
    confidence: f64,
    reasoning: Vec<String>,
    parse_warning: Option<String>,
) -> RunStateDelta {
    let confidence = if parse_warning.is_some() { 0.0 } else { confidence };
    let delta = delta
        .with_confidence(stage, confidence)
        .with_reasoning(stage, reasoning);
    match parse_warning {
        Some(warning) => delta.with_warning(warning),
        None => delta,
    }
}
