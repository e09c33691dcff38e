//! Run State: the single record threaded through one workflow execution,
//! and the partial updates stages return.
//!
//! Merge rules, per field:
//! - stage outputs and control scalars: last write wins
//! - `errors` / `warnings`: concatenated, never cleared mid-run
//! - `confidence_scores` / `reasoning_chains`: shallow map merge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::RetryMode;
use crate::data_model::{Alert, Entity, Incident, RequestType, ThreatIntelligence, WorkflowRequest};
use crate::outputs::*;
use crate::phase::{StageId, WorkflowPhase};

/// One executed stage, kept in order of execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    /// Pipeline attempt the stage ran in (0 for the first)
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// blake3 of the serialized state the stage saw
    pub in_hash: String,
    /// blake3 of the serialized delta the stage returned
    pub out_hash: String,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    // === Identity ===
    pub workflow_id: String,
    pub user_id: String,
    pub session_id: String,
    pub request_type: RequestType,
    /// Telemetry trace, kept across resumes
    #[serde(default)]
    pub trace_id: Option<String>,

    // === Inputs ===
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub threat_intelligence: Vec<ThreatIntelligence>,

    // === Stage outputs ===
    #[serde(default)]
    pub threat_analysis: Option<ThreatAnalysis>,
    #[serde(default)]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    pub risk_prioritization: Option<RiskPrioritization>,
    #[serde(default)]
    pub correlations: Option<Vec<CorrelationResult>>,
    #[serde(default)]
    pub threat_classification: Option<ThreatClassification>,
    #[serde(default)]
    pub response_strategy: Option<ResponseStrategy>,
    #[serde(default)]
    pub resource_allocation: Option<ResourceAllocation>,
    #[serde(default)]
    pub escalation_decision: Option<EscalationDecision>,
    #[serde(default)]
    pub natural_language_response: Option<NaturalLanguageResponse>,
    #[serde(default)]
    pub report: Option<Report>,
    #[serde(default)]
    pub alert_notifications: Option<Vec<AlertNotification>>,
    #[serde(default)]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(default)]
    pub playbook_suggestions: Option<Vec<PlaybookSuggestion>>,
    #[serde(default)]
    pub execution_results: Option<Vec<ExecutionResult>>,
    #[serde(default)]
    pub learning_insights: Option<Vec<String>>,

    // === Control ===
    pub current_phase: WorkflowPhase,
    #[serde(default)]
    pub last_stage: Option<StageId>,
    #[serde(default)]
    pub human_input_required: bool,
    #[serde(default)]
    pub human_input_prompt: Option<String>,
    #[serde(default)]
    pub human_input_response: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Number of `errors` already routed through error handling
    #[serde(default)]
    pub errors_handled: usize,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub stage_trail: Vec<StageRecord>,

    // === Telemetry ===
    #[serde(default)]
    pub confidence_scores: BTreeMap<StageId, f64>,
    #[serde(default)]
    pub reasoning_chains: BTreeMap<StageId, Vec<String>>,
    #[serde(default)]
    pub phase_durations: BTreeMap<StageId, u64>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_duration_ms: Option<u64>,
}

impl RunState {
    pub fn new(request: WorkflowRequest) -> Self {
        Self {
            workflow_id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id,
            session_id: request.session_id,
            request_type: request.request_type,
            trace_id: None,
            alerts: request.alerts,
            incidents: request.incidents,
            entities: request.entities,
            threat_intelligence: request.threat_intelligence,
            threat_analysis: None,
            risk_assessment: None,
            risk_prioritization: None,
            correlations: None,
            threat_classification: None,
            response_strategy: None,
            resource_allocation: None,
            escalation_decision: None,
            natural_language_response: None,
            report: None,
            alert_notifications: None,
            recommendations: None,
            playbook_suggestions: None,
            execution_results: None,
            learning_insights: None,
            current_phase: WorkflowPhase::ContextAnalysis,
            last_stage: None,
            human_input_required: false,
            human_input_prompt: None,
            human_input_response: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            errors_handled: 0,
            retry_count: 0,
            stage_trail: Vec::new(),
            confidence_scores: BTreeMap::new(),
            reasoning_chains: BTreeMap::new(),
            phase_durations: BTreeMap::new(),
            start_time: Utc::now(),
            end_time: None,
            total_duration_ms: None,
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self
    }

    /// Alerts or incidents were supplied
    pub fn has_security_events(&self) -> bool {
        !self.alerts.is_empty() || !self.incidents.is_empty()
    }

    /// Errors appended since the last pass through error handling
    pub fn has_unhandled_errors(&self) -> bool {
        self.errors.len() > self.errors_handled
    }

    /// Mean of recorded confidence scores; 0.0 when nothing was recorded
    pub fn overall_confidence(&self) -> f64 {
        if self.confidence_scores.is_empty() {
            return 0.0;
        }
        self.confidence_scores.values().sum::<f64>() / self.confidence_scores.len() as f64
    }

    /// The run ended: completed, cancelled, or failed with retries exhausted
    pub fn is_finished(&self) -> bool {
        self.current_phase.is_final()
            || (self.current_phase == WorkflowPhase::Error && self.end_time.is_some())
    }

    /// Waiting at the human-review gate for an operator answer
    pub fn is_paused(&self) -> bool {
        self.current_phase == WorkflowPhase::HumanReview && self.human_input_required
    }

    /// Record the operator answer and lift the gate
    pub fn provide_human_input(&mut self, response: impl Into<String>) {
        self.human_input_response = Some(response.into());
        self.human_input_required = false;
    }

    /// Force the run into `cancelled`; a finished run is left untouched
    pub fn cancel(&mut self) {
        if self.is_finished() {
            return;
        }
        self.current_phase = WorkflowPhase::Cancelled;
        self.human_input_required = false;
        self.end_time = Some(Utc::now());
    }

    pub fn is_set(&self, field: OutputField) -> bool {
        match field {
            OutputField::ThreatAnalysis => self.threat_analysis.is_some(),
            OutputField::RiskAssessment => self.risk_assessment.is_some(),
            OutputField::RiskPrioritization => self.risk_prioritization.is_some(),
            OutputField::Correlations => self.correlations.is_some(),
            OutputField::ThreatClassification => self.threat_classification.is_some(),
            OutputField::ResponseStrategy => self.response_strategy.is_some(),
            OutputField::ResourceAllocation => self.resource_allocation.is_some(),
            OutputField::EscalationDecision => self.escalation_decision.is_some(),
            OutputField::NaturalLanguageResponse => self.natural_language_response.is_some(),
            OutputField::Report => self.report.is_some(),
            OutputField::AlertNotifications => self.alert_notifications.is_some(),
            OutputField::Recommendations => self.recommendations.is_some(),
            OutputField::PlaybookSuggestions => self.playbook_suggestions.is_some(),
            OutputField::ExecutionResults => self.execution_results.is_some(),
            OutputField::LearningInsights => self.learning_insights.is_some(),
        }
    }

    /// Merge a stage delta into the state
    pub fn apply(&mut self, delta: RunStateDelta) {
        macro_rules! overwrite {
            ($target:ident, $source:ident; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $source.$field { $target.$field = Some(value); })*
            };
        }
        let target = &mut *self;
        overwrite!(
            target, delta;
            threat_analysis,
            risk_assessment,
            risk_prioritization,
            correlations,
            threat_classification,
            response_strategy,
            resource_allocation,
            escalation_decision,
            natural_language_response,
            report,
            alert_notifications,
            recommendations,
            playbook_suggestions,
            execution_results,
            learning_insights,
            human_input_prompt,
        );

        if let Some(phase) = delta.current_phase {
            self.current_phase = phase;
        }
        if let Some(required) = delta.human_input_required {
            self.human_input_required = required;
        }

        self.errors.extend(delta.errors);
        self.warnings.extend(delta.warnings);

        for (stage, score) in delta.confidence_scores {
            let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
            self.confidence_scores.insert(stage, score);
        }
        self.reasoning_chains.extend(delta.reasoning_chains);
    }

    /// Prepare another pipeline attempt after error handling.
    ///
    /// `Restart` clears every stage output so the pipeline runs from scratch.
    /// `Resume` keeps them, so the router skips stages that already succeeded.
    pub fn restart(&mut self, mode: RetryMode) {
        if mode == RetryMode::Restart {
            for field in OutputField::ALL {
                self.clear(field);
            }
            self.confidence_scores.clear();
            self.reasoning_chains.clear();
            self.human_input_prompt = None;
            self.human_input_response = None;
        }
        self.human_input_required = false;
        self.current_phase = WorkflowPhase::ContextAnalysis;
        self.last_stage = None;
        self.retry_count += 1;
    }

    fn clear(&mut self, field: OutputField) {
        match field {
            OutputField::ThreatAnalysis => self.threat_analysis = None,
            OutputField::RiskAssessment => self.risk_assessment = None,
            OutputField::RiskPrioritization => self.risk_prioritization = None,
            OutputField::Correlations => self.correlations = None,
            OutputField::ThreatClassification => self.threat_classification = None,
            OutputField::ResponseStrategy => self.response_strategy = None,
            OutputField::ResourceAllocation => self.resource_allocation = None,
            OutputField::EscalationDecision => self.escalation_decision = None,
            OutputField::NaturalLanguageResponse => self.natural_language_response = None,
            OutputField::Report => self.report = None,
            OutputField::AlertNotifications => self.alert_notifications = None,
            OutputField::Recommendations => self.recommendations = None,
            OutputField::PlaybookSuggestions => self.playbook_suggestions = None,
            OutputField::ExecutionResults => self.execution_results = None,
            OutputField::LearningInsights => self.learning_insights = None,
        }
    }
}

/// Partial update returned by a stage. `None` / empty means "unchanged".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunStateDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_analysis: Option<ThreatAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_prioritization: Option<RiskPrioritization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlations: Option<Vec<CorrelationResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_classification: Option<ThreatClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_strategy: Option<ResponseStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_allocation: Option<ResourceAllocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_decision: Option<EscalationDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_language_response: Option<NaturalLanguageResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_notifications: Option<Vec<AlertNotification>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook_suggestions: Option<Vec<PlaybookSuggestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_results: Option<Vec<ExecutionResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_insights: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<WorkflowPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_input_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_input_prompt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub confidence_scores: BTreeMap<StageId, f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub reasoning_chains: BTreeMap<StageId, Vec<String>>,
}

impl RunStateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expected domain failure: an error entry and the `error` phase
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            current_phase: Some(WorkflowPhase::Error),
            ..Default::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_confidence(mut self, stage: StageId, score: f64) -> Self {
        self.confidence_scores.insert(stage, score);
        self
    }

    pub fn with_reasoning(mut self, stage: StageId, steps: Vec<String>) -> Self {
        if !steps.is_empty() {
            self.reasoning_chains.insert(stage, steps);
        }
        self
    }

    pub fn is_failure(&self) -> bool {
        !self.errors.is_empty() || self.current_phase == Some(WorkflowPhase::Error)
    }

    /// Output fields this delta writes
    pub fn written_fields(&self) -> Vec<OutputField> {
        OutputField::ALL
            .into_iter()
            .filter(|field| self.writes(*field))
            .collect()
    }

    fn writes(&self, field: OutputField) -> bool {
        match field {
            OutputField::ThreatAnalysis => self.threat_analysis.is_some(),
            OutputField::RiskAssessment => self.risk_assessment.is_some(),
            OutputField::RiskPrioritization => self.risk_prioritization.is_some(),
            OutputField::Correlations => self.correlations.is_some(),
            OutputField::ThreatClassification => self.threat_classification.is_some(),
            OutputField::ResponseStrategy => self.response_strategy.is_some(),
            OutputField::ResourceAllocation => self.resource_allocation.is_some(),
            OutputField::EscalationDecision => self.escalation_decision.is_some(),
            OutputField::NaturalLanguageResponse => self.natural_language_response.is_some(),
            OutputField::Report => self.report.is_some(),
            OutputField::AlertNotifications => self.alert_notifications.is_some(),
            OutputField::Recommendations => self.recommendations.is_some(),
            OutputField::PlaybookSuggestions => self.playbook_suggestions.is_some(),
            OutputField::ExecutionResults => self.execution_results.is_some(),
            OutputField::LearningInsights => self.learning_insights.is_some(),
        }
    }

    /// Drop writes to fields `stage` does not own; returns the dropped fields
    pub fn retain_owned(&mut self, stage: StageId) -> Vec<OutputField> {
        let foreign: Vec<OutputField> = self
            .written_fields()
            .into_iter()
            .filter(|field| field.owner() != stage)
            .collect();
        for field in &foreign {
            match field {
                OutputField::ThreatAnalysis => self.threat_analysis = None,
                OutputField::RiskAssessment => self.risk_assessment = None,
                OutputField::RiskPrioritization => self.risk_prioritization = None,
                OutputField::Correlations => self.correlations = None,
                OutputField::ThreatClassification => self.threat_classification = None,
                OutputField::ResponseStrategy => self.response_strategy = None,
                OutputField::ResourceAllocation => self.resource_allocation = None,
                OutputField::EscalationDecision => self.escalation_decision = None,
                OutputField::NaturalLanguageResponse => self.natural_language_response = None,
                OutputField::Report => self.report = None,
                OutputField::AlertNotifications => self.alert_notifications = None,
                OutputField::Recommendations => self.recommendations = None,
                OutputField::PlaybookSuggestions => self.playbook_suggestions = None,
                OutputField::ExecutionResults => self.execution_results = None,
                OutputField::LearningInsights => self.learning_insights = None,
            }
        }
        foreign
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::Severity;

    fn state() -> RunState {
        RunState::new(WorkflowRequest::new("u-1", "s-1", RequestType::ThreatAnalysis))
    }

    #[test]
    fn test_new_state_starts_at_entry() {
        let state = state();
        assert_eq!(state.current_phase, WorkflowPhase::ContextAnalysis);
        assert!(state.last_stage.is_none());
        assert!(!state.is_finished());
        assert!(!state.workflow_id.is_empty());
    }

    #[test]
    fn test_apply_concatenates_errors_and_merges_maps() {
        let mut state = state();
        state.warnings.push("first".to_string());
        state.confidence_scores.insert(StageId::ThreatAnalysis, 0.4);

        let delta = RunStateDelta::failure("backend down")
            .with_warning("second")
            .with_confidence(StageId::RiskAssessment, 0.9);
        state.apply(delta);

        assert_eq!(state.errors, vec!["backend down".to_string()]);
        assert_eq!(state.warnings, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(state.confidence_scores.len(), 2);
        assert_eq!(state.current_phase, WorkflowPhase::Error);
    }

    #[test]
    fn test_apply_leaves_absent_fields_unchanged() {
        let mut state = state();
        state.threat_analysis = Some(ThreatAnalysis {
            summary: "keep me".to_string(),
            ..Default::default()
        });
        state.apply(RunStateDelta {
            risk_assessment: Some(RiskAssessment::default()),
            ..Default::default()
        });

        assert_eq!(state.threat_analysis.as_ref().unwrap().summary, "keep me");
        assert!(state.risk_assessment.is_some());
    }

    #[test]
    fn test_confidence_clamped() {
        let mut state = state();
        state.apply(
            RunStateDelta::new()
                .with_confidence(StageId::ThreatAnalysis, 1.7)
                .with_confidence(StageId::RiskAssessment, f64::NAN),
        );
        assert_eq!(state.confidence_scores[&StageId::ThreatAnalysis], 1.0);
        assert_eq!(state.confidence_scores[&StageId::RiskAssessment], 0.0);
    }

    #[test]
    fn test_overall_confidence_empty_is_zero() {
        let mut state = state();
        assert_eq!(state.overall_confidence(), 0.0);
        state.confidence_scores.insert(StageId::ThreatAnalysis, 0.8);
        state.confidence_scores.insert(StageId::RiskAssessment, 0.4);
        assert!((state.overall_confidence() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_retain_owned_drops_foreign_writes() {
        let mut delta = RunStateDelta {
            threat_analysis: Some(ThreatAnalysis::default()),
            escalation_decision: Some(EscalationDecision {
                should_escalate: true,
                urgency: Severity::High,
                ..Default::default()
            }),
            ..Default::default()
        };
        let dropped = delta.retain_owned(StageId::ThreatAnalysis);
        assert_eq!(dropped, vec![OutputField::EscalationDecision]);
        assert!(delta.threat_analysis.is_some());
        assert!(delta.escalation_decision.is_none());
    }

    #[test]
    fn test_restart_clears_outputs_but_keeps_errors() {
        let mut state = state();
        state.threat_analysis = Some(ThreatAnalysis::default());
        state.execution_results = Some(vec![]);
        state.confidence_scores.insert(StageId::ThreatAnalysis, 0.9);
        state.apply(RunStateDelta::failure("boom"));
        state.last_stage = Some(StageId::ErrorHandling);

        state.restart(RetryMode::Restart);

        assert!(state.threat_analysis.is_none());
        assert!(state.execution_results.is_none());
        assert!(state.confidence_scores.is_empty());
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.retry_count, 1);
        assert_eq!(state.current_phase, WorkflowPhase::ContextAnalysis);
        assert!(state.last_stage.is_none());
    }

    #[test]
    fn test_resume_keeps_outputs() {
        let mut state = state();
        state.threat_analysis = Some(ThreatAnalysis::default());
        state.restart(RetryMode::Resume);
        assert!(state.threat_analysis.is_some());
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn test_cancel_sets_end_time_once() {
        let mut state = state();
        state.cancel();
        assert_eq!(state.current_phase, WorkflowPhase::Cancelled);
        assert!(state.is_finished());
        let ended = state.end_time;
        state.cancel();
        assert_eq!(state.end_time, ended);
    }

    #[test]
    fn test_provide_human_input_lifts_gate() {
        let mut state = state();
        state.current_phase = WorkflowPhase::HumanReview;
        state.human_input_required = true;
        assert!(state.is_paused());
        state.provide_human_input("approved");
        assert!(!state.is_paused());
        assert_eq!(state.human_input_response.as_deref(), Some("approved"));
    }

    #[test]
    fn test_state_serializes_stage_keys_as_names() {
        let mut state = state();
        state.phase_durations.insert(StageId::ThreatAnalysis, 12);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase_durations"]["threat_analysis"], 12);
        assert_eq!(json["current_phase"], "context_analysis");

        let back: RunState = serde_json::from_value(json).unwrap();
        assert_eq!(back.phase_durations[&StageId::ThreatAnalysis], 12);
    }
}
