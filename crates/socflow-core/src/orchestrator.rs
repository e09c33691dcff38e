//! Orchestrator: drives a run state through the stage registry.
//!
//! One stage runs per loop iteration. After each stage the delta is checked
//! for ownership, merged, timed and hashed into the stage trail, and the
//! router picks the next step. The public entry points always hand back a
//! `RunState`; failures show up in `errors`, `warnings` and `current_phase`.

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::error::{RoutingError, SocflowError, StageError};
use crate::phase::{StageId, WorkflowPhase};
use crate::registry::StageRegistry;
use crate::router::{Route, Router, RoutingPolicy};
use crate::stage::Stage;
use crate::state::{RunState, RunStateDelta, StageRecord};
use crate::telemetry::{
    EventLevel, GuardedTelemetry, NoopTelemetry, PhaseMetrics, TelemetryBridge, WorkflowStatus,
};

#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: StageRegistry,
    router: Router,
    config: EngineConfig,
    telemetry: GuardedTelemetry,
}

impl Orchestrator {
    pub fn new(registry: StageRegistry, config: EngineConfig) -> Self {
        let telemetry = GuardedTelemetry::new(Arc::new(NoopTelemetry), config.telemetry_timeout());
        Self {
            registry,
            router: Router::new(RoutingPolicy::from(&config)),
            config,
            telemetry,
        }
    }

    pub fn with_telemetry(mut self, bridge: Arc<dyn TelemetryBridge>) -> Self {
        self.telemetry = GuardedTelemetry::new(bridge, self.config.telemetry_timeout());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run until the state is finished or paused at human review
    pub async fn run(&self, state: RunState) -> RunState {
        self.run_with_cancel(state, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run); `cancel` is checked before every stage
    pub async fn run_with_cancel(&self, state: RunState, cancel: &CancellationToken) -> RunState {
        let span = info_span!(
            "workflow",
            workflow_id = %state.workflow_id,
            request_type = state.request_type.as_str()
        );
        self.drive(state, cancel).instrument(span).await
    }

    /// Attach the operator answer to a paused state and continue it
    pub async fn resume(&self, state: RunState, response: impl Into<String>) -> RunState {
        self.resume_with_cancel(state, response, &CancellationToken::new())
            .await
    }

    pub async fn resume_with_cancel(
        &self,
        mut state: RunState,
        response: impl Into<String>,
        cancel: &CancellationToken,
    ) -> RunState {
        if state.is_finished() {
            return state;
        }
        if state.is_paused() {
            state.provide_human_input(response);
            if let Some(trace_id) = state.trace_id.clone() {
                self.telemetry
                    .event(
                        &trace_id,
                        "workflow_resumed",
                        &json!({ "workflow_id": state.workflow_id }),
                        EventLevel::Info,
                    )
                    .await;
            }
            info!(workflow_id = %state.workflow_id, "resuming after human review");
        } else {
            warn!(workflow_id = %state.workflow_id, phase = %state.current_phase, "resume on a run not awaiting review");
            state
                .warnings
                .push(format!("resume ignored: run was in phase `{}`", state.current_phase));
        }
        self.run_with_cancel(state, cancel).await
    }

    async fn drive(&self, mut state: RunState, cancel: &CancellationToken) -> RunState {
        if state.is_finished() {
            debug!(phase = %state.current_phase, "run already finished");
            return state;
        }

        let trace_id = self.ensure_trace(&mut state).await;
        let mut steps = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!("workflow cancelled");
                state.cancel();
                self.finish(&mut state, &trace_id, WorkflowStatus::Cancelled).await;
                return state;
            }

            let route = match self.router.route(&state) {
                Ok(route) => route,
                Err(e) => {
                    self.abort(&mut state, &trace_id, e).await;
                    return state;
                }
            };
            debug!(?route, phase = %state.current_phase, "routed");

            match route {
                Route::Stage(id) => {
                    if steps >= self.config.max_steps {
                        self.abort(&mut state, &trace_id, RoutingError::StepBudget(self.config.max_steps))
                            .await;
                        return state;
                    }
                    let Some(stage) = self.registry.get(id) else {
                        self.abort(&mut state, &trace_id, RoutingError::Unregistered(id)).await;
                        return state;
                    };
                    steps += 1;
                    self.execute(stage.as_ref(), &mut state, &trace_id).await;
                }
                Route::Await => {
                    state.current_phase = WorkflowPhase::HumanReview;
                    state.human_input_required = true;
                    info!("paused for human review");
                    return state;
                }
                Route::Restart => {
                    // The step budget bounds one attempt; retries are bounded by the router.
                    steps = 0;
                    state.restart(self.config.retry_mode);
                    info!(
                        attempt = state.retry_count,
                        errors = state.errors.len(),
                        "restarting pipeline"
                    );
                    self.telemetry
                        .event(
                            &trace_id,
                            "workflow_restarted",
                            &json!({
                                "attempt": state.retry_count,
                                "errors": state.errors.len(),
                                "retry_mode": self.config.retry_mode,
                            }),
                            EventLevel::Warning,
                        )
                        .await;
                }
                Route::Complete => {
                    state.current_phase = WorkflowPhase::Completed;
                    self.finish(&mut state, &trace_id, WorkflowStatus::Completed).await;
                    return state;
                }
                Route::Fail => {
                    error!(errors = state.errors.len(), "retry budget exhausted");
                    state.current_phase = WorkflowPhase::Error;
                    self.finish(&mut state, &trace_id, WorkflowStatus::Failed).await;
                    return state;
                }
            }
        }
    }

    /// Run one stage and fold its delta into `state`
    async fn execute(&self, stage: &dyn Stage, state: &mut RunState, trace_id: &str) {
        let id = stage.id();
        let input = serde_json::to_vec(&*state).unwrap_or_default();
        let in_hash = hash_bytes(&input);

        self.telemetry
            .start_phase(trace_id, id.as_str(), Some(stage.agent_type()))
            .await;
        debug!(stage = %id, attempt = state.retry_count, "stage started");

        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = self.invoke(stage, state).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (mut delta, fault) = match outcome {
            Ok(delta) => (delta, None),
            Err(e) => {
                error!(stage = %id, error = %e, "stage raised");
                (RunStateDelta::failure(e.to_string()), Some(e.to_string()))
            }
        };

        for field in delta.retain_owned(id) {
            warn!(stage = %id, %field, "ownership violation");
            delta
                .warnings
                .push(format!("{} attempted to write {}; ignored", id, field));
            self.telemetry
                .event(
                    trace_id,
                    "ownership_violation",
                    &json!({ "stage": id, "field": field }),
                    EventLevel::Warning,
                )
                .await;
        }

        let failed = delta.is_failure();
        if failed && delta.errors.is_empty() {
            delta.errors.push(format!("{} reported failure without detail", id));
        }
        if failed && !delta.confidence_scores.contains_key(&id) {
            delta.confidence_scores.insert(id, 0.0);
        }
        // Stages only signal failure; the orchestrator owns the phase.
        delta.current_phase = Some(if failed { WorkflowPhase::Error } else { id.phase() });

        let output = serde_json::to_vec(&delta).unwrap_or_default();
        let first_error = delta.errors.first().cloned();

        state.apply(delta);
        state.last_stage = Some(id);
        state.phase_durations.insert(id, latency_ms);
        state.stage_trail.push(StageRecord {
            stage: id,
            attempt: state.retry_count,
            started_at,
            latency_ms,
            in_hash,
            out_hash: hash_bytes(&output),
            failed,
        });
        if id == StageId::ErrorHandling {
            state.errors_handled = state.errors.len();
        }

        let metrics = PhaseMetrics {
            input_tokens: Some(estimate_tokens(input.len())),
            output_tokens: Some(estimate_tokens(output.len())),
            latency_ms: Some(latency_ms),
            error: fault.or(first_error),
        };
        self.telemetry.complete_phase(trace_id, id.as_str(), &metrics).await;

        if id == StageId::HumanReview && state.human_input_required {
            self.telemetry
                .event(
                    trace_id,
                    "human_review_requested",
                    &json!({ "prompt": state.human_input_prompt }),
                    EventLevel::Info,
                )
                .await;
        }

        if failed {
            warn!(stage = %id, latency_ms, "stage failed");
        } else {
            debug!(stage = %id, latency_ms, "stage completed");
        }
    }

    /// Call the stage with the timeout and panic guard
    async fn invoke(&self, stage: &dyn Stage, state: &RunState) -> Result<RunStateDelta, StageError> {
        let id = stage.id();
        let guarded = AssertUnwindSafe(stage.run(state)).catch_unwind();
        let outcome = match self.config.stage_timeout() {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(StageError::Timeout {
                        stage: id,
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => guarded.await,
        };
        outcome.unwrap_or_else(|payload| {
            Err(StageError::Panicked {
                stage: id,
                message: panic_message(payload.as_ref()),
            })
        })
    }

    async fn ensure_trace(&self, state: &mut RunState) -> String {
        if let Some(trace_id) = &state.trace_id {
            return trace_id.clone();
        }
        let metadata = json!({
            "workflow_id": state.workflow_id,
            "user_id": state.user_id,
            "session_id": state.session_id,
            "alerts": state.alerts.len(),
            "incidents": state.incidents.len(),
            "entities": state.entities.len(),
            "threat_intelligence": state.threat_intelligence.len(),
        });
        let trace_id = self
            .telemetry
            .start_workflow(state.request_type.as_str(), &metadata)
            .await
            .unwrap_or_else(|| state.workflow_id.clone());
        state.trace_id = Some(trace_id.clone());
        trace_id
    }

    /// Routing failures skip retry and end the run in `error`
    async fn abort(&self, state: &mut RunState, trace_id: &str, cause: RoutingError) {
        let e = SocflowError::from(cause);
        error!(error = %e, phase = %state.current_phase, "routing failure");
        state.errors.push(e.to_string());
        state.errors_handled = state.errors.len();
        state.current_phase = WorkflowPhase::Error;
        state.human_input_required = false;
        self.finish(state, trace_id, WorkflowStatus::Failed).await;
    }

    async fn finish(&self, state: &mut RunState, trace_id: &str, status: WorkflowStatus) {
        let end = *state.end_time.get_or_insert_with(Utc::now);
        let wall_ms = (end - state.start_time).num_milliseconds().max(0) as u64;
        let stage_ms: u64 = state.phase_durations.values().sum();
        state.total_duration_ms = Some(wall_ms.max(stage_ms));

        info!(
            status = status.as_str(),
            total_ms = state.total_duration_ms,
            retries = state.retry_count,
            errors = state.errors.len(),
            "workflow finished"
        );
        self.telemetry
            .complete_workflow(trace_id, status, &final_metrics(state))
            .await;
    }
}

fn final_metrics(state: &RunState) -> Value {
    json!({
        "total_duration_ms": state.total_duration_ms,
        "retry_count": state.retry_count,
        "stages_run": state.stage_trail.len(),
        "errors": state.errors.len(),
        "warnings": state.warnings.len(),
        "overall_confidence": state.overall_confidence(),
    })
}

fn hash_bytes(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data))
}

/// Rough token count for serialized payloads
fn estimate_tokens(bytes: usize) -> u64 {
    (bytes / 4) as u64
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{Alert, RequestType, Severity, WorkflowRequest};
    use crate::outputs::*;
    use crate::telemetry::RecordingTelemetry;
    use async_trait::async_trait;

    struct Scripted {
        id: StageId,
        respond: fn(&RunState) -> Result<RunStateDelta, StageError>,
    }

    #[async_trait]
    impl Stage for Scripted {
        fn id(&self) -> StageId {
            self.id
        }

        async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
            (self.respond)(state)
        }
    }

    fn stage(id: StageId, respond: fn(&RunState) -> Result<RunStateDelta, StageError>) -> Arc<dyn Stage> {
        Arc::new(Scripted { id, respond })
    }

    fn threat_request() -> RunState {
        RunState::new(
            WorkflowRequest::new("u", "s", RequestType::ThreatAnalysis)
                .with_alerts(vec![Alert::new("a-1", "beacon", Severity::Critical)]),
        )
    }

    fn happy_registry() -> StageRegistry {
        StageRegistry::new()
            .register(stage(StageId::ThreatAnalysis, |_| {
                Ok(RunStateDelta {
                    threat_analysis: Some(ThreatAnalysis::default()),
                    ..Default::default()
                }
                .with_confidence(StageId::ThreatAnalysis, 0.9))
            }))
            .register(stage(StageId::RiskAssessment, |_| {
                Ok(RunStateDelta {
                    risk_assessment: Some(RiskAssessment::default()),
                    ..Default::default()
                }
                .with_confidence(StageId::RiskAssessment, 0.8))
            }))
            .register(stage(StageId::DecisionMaking, |_| {
                Ok(RunStateDelta {
                    threat_classification: Some(ThreatClassification::default()),
                    response_strategy: Some(ResponseStrategy::default()),
                    ..Default::default()
                }
                .with_confidence(StageId::DecisionMaking, 0.7))
            }))
            .register(stage(StageId::ResponseGeneration, |_| {
                Ok(RunStateDelta {
                    natural_language_response: Some(NaturalLanguageResponse::default()),
                    ..Default::default()
                })
            }))
            .register(stage(StageId::Learning, |_| {
                Ok(RunStateDelta {
                    learning_insights: Some(vec![]),
                    ..Default::default()
                })
            }))
            .register(stage(StageId::ErrorHandling, |_| Ok(RunStateDelta::new())))
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_traces() {
        let recorder = Arc::new(RecordingTelemetry::new());
        let orchestrator =
            Orchestrator::new(happy_registry(), EngineConfig::default()).with_telemetry(recorder.clone());

        let state = orchestrator.run(threat_request()).await;

        assert_eq!(state.current_phase, WorkflowPhase::Completed);
        assert!(state.end_time.is_some());
        let trail: Vec<StageId> = state.stage_trail.iter().map(|r| r.stage).collect();
        assert_eq!(
            trail,
            vec![
                StageId::ThreatAnalysis,
                StageId::RiskAssessment,
                StageId::DecisionMaking,
                StageId::ResponseGeneration,
                StageId::Learning,
            ]
        );
        assert_eq!(state.phase_durations.len(), 5);
        assert!(state.stage_trail.iter().all(|r| r.in_hash.starts_with("blake3:")));
        assert_eq!(recorder.completed_phases().await.len(), 5);
    }

    #[tokio::test]
    async fn test_ownership_violation_is_dropped_with_warning() {
        let registry = happy_registry().register(stage(StageId::ThreatAnalysis, |_| {
            Ok(RunStateDelta {
                threat_analysis: Some(ThreatAnalysis::default()),
                escalation_decision: Some(EscalationDecision {
                    should_escalate: true,
                    ..Default::default()
                }),
                ..Default::default()
            }
            .with_confidence(StageId::ThreatAnalysis, 0.9))
        }));
        let state = Orchestrator::new(registry, EngineConfig::default())
            .run(threat_request())
            .await;

        assert!(state.escalation_decision.is_none());
        assert!(state
            .warnings
            .iter()
            .any(|w| w == "threat_analysis attempted to write escalation_decision; ignored"));
        assert_eq!(state.current_phase, WorkflowPhase::Completed);
    }

    #[tokio::test]
    async fn test_panicking_stage_is_contained() {
        let registry = happy_registry().register(stage(StageId::RiskAssessment, |_| panic!("index out of range")));
        let config = EngineConfig {
            max_retries: 2,
            ..Default::default()
        };
        let state = Orchestrator::new(registry, config).run(threat_request()).await;

        assert_eq!(state.current_phase, WorkflowPhase::Error);
        assert!(state.is_finished());
        assert!(state.errors[0].contains("index out of range"));
        assert_eq!(state.retry_count, 1);
    }

    #[tokio::test]
    async fn test_unregistered_stage_is_fatal_without_retry() {
        let registry = StageRegistry::new().register(stage(StageId::ErrorHandling, |_| Ok(RunStateDelta::new())));
        let state = Orchestrator::new(registry, EngineConfig::default())
            .run(threat_request())
            .await;

        assert_eq!(state.current_phase, WorkflowPhase::Error);
        assert_eq!(state.retry_count, 0);
        assert!(state.errors[0].starts_with("ROUTE/"));
        assert!(state.stage_trail.is_empty());
    }

    #[tokio::test]
    async fn test_step_budget_renews_on_restart() {
        let registry = happy_registry().register(stage(StageId::Learning, |_| {
            Ok(RunStateDelta::failure("learning: insight store unavailable"))
        }));
        let config = EngineConfig {
            max_retries: 10,
            max_steps: 8,
            ..Default::default()
        };
        let state = Orchestrator::new(registry, config).run(threat_request()).await;

        assert_eq!(state.current_phase, WorkflowPhase::Error);
        assert_eq!(state.retry_count, 9);
        assert_eq!(state.errors.len(), 10);
        assert!(state.errors.iter().all(|e| e == "learning: insight store unavailable"));
    }

    #[tokio::test]
    async fn test_step_budget_is_fatal() {
        let config = EngineConfig {
            max_steps: 2,
            ..Default::default()
        };
        let state = Orchestrator::new(happy_registry(), config).run(threat_request()).await;

        assert_eq!(state.current_phase, WorkflowPhase::Error);
        assert_eq!(state.stage_trail.len(), 2);
        assert!(state.errors[0].contains("step budget"));
    }

    #[tokio::test]
    async fn test_slow_stage_times_out() {
        struct Slow;

        #[async_trait]
        impl Stage for Slow {
            fn id(&self) -> StageId {
                StageId::ThreatAnalysis
            }

            async fn run(&self, _state: &RunState) -> Result<RunStateDelta, StageError> {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(RunStateDelta::new())
            }
        }

        let config = EngineConfig {
            stage_timeout_ms: Some(10),
            max_retries: 1,
            ..Default::default()
        };
        let registry = happy_registry().register(Arc::new(Slow));
        let state = Orchestrator::new(registry, config).run(threat_request()).await;

        assert_eq!(state.current_phase, WorkflowPhase::Error);
        assert!(state.errors[0].starts_with("STAGE/TIMEOUT"));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_stage() {
        let token = CancellationToken::new();
        token.cancel();
        let state = Orchestrator::new(happy_registry(), EngineConfig::default())
            .run_with_cancel(threat_request(), &token)
            .await;

        assert_eq!(state.current_phase, WorkflowPhase::Cancelled);
        assert!(state.stage_trail.is_empty());
        assert!(state.total_duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_finished_state_returned_untouched() {
        let mut state = threat_request();
        state.cancel();
        let before = state.clone();
        let after = Orchestrator::new(happy_registry(), EngineConfig::default())
            .run(state)
            .await;
        assert_eq!(after, before);
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(401), 100);
    }
}
