//! Full pipeline runs over the real stages.
use socflow_core::outputs::{ExecutionStatus, NotificationChannel, StrategyType};
use socflow_core::*;
use socflow_stages::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ransomware_request() -> WorkflowRequest {
    WorkflowRequest::new("analyst-7", "session-7", RequestType::IncidentInvestigation)
        .with_alerts(vec![
            Alert::new("a-1", "Ransomware note dropped", Severity::Critical)
                .with_indicators(vec!["198.51.100.7".into()])
                .with_entities(vec!["e-1".into()])
                .with_techniques(vec!["T1486".into()]),
            Alert::new("a-2", "Suspicious SMB session", Severity::High).with_entities(vec!["e-1".into()]),
        ])
        .with_entities(vec![Entity::new("e-1", "fileserver-01", EntityType::Host).with_criticality(Severity::Critical)])
        .with_threat_intelligence(vec![ThreatIntelligence::new("ti-1", "198.51.100.7", Severity::Critical)])
}

fn orchestrator(backend: Arc<dyn AnalysisBackend>) -> Orchestrator {
    orchestrator_with(backend, EngineConfig::default())
}

fn orchestrator_with(backend: Arc<dyn AnalysisBackend>, config: EngineConfig) -> Orchestrator {
    let registry = default_registry(backend, Arc::new(DryRunExecutor), &config).unwrap();
    Orchestrator::new(registry, config).with_telemetry(Arc::new(TracingTelemetry))
}

fn trail(state: &RunState) -> Vec<StageId> {
    state.stage_trail.iter().map(|r| r.stage).collect()
}

#[tokio::test]
async fn test_critical_incident_pauses_then_completes() {
    let orchestrator = orchestrator(Arc::new(HeuristicBackend::new()));

    let paused = orchestrator.run(RunState::new(ransomware_request())).await;
    assert!(paused.is_paused());
    assert_eq!(
        trail(&paused),
        vec![
            StageId::ThreatAnalysis,
            StageId::RiskAssessment,
            StageId::CorrelationAnalysis,
            StageId::DecisionMaking,
            StageId::HumanReview,
        ]
    );
    assert_eq!(paused.response_strategy.as_ref().unwrap().strategy_type, StrategyType::Contain);
    assert!(paused.human_input_prompt.as_ref().unwrap().contains("Escalation to incident-response-lead"));

    let done = orchestrator.resume(paused, "approve containment").await;
    assert_eq!(done.current_phase, WorkflowPhase::Completed);
    assert!(done.errors.is_empty());
    assert_eq!(
        trail(&done)[5..],
        [StageId::ResponseGeneration, StageId::ActionExecution, StageId::Learning]
    );

    let channels: Vec<NotificationChannel> = done.alert_notifications.as_ref().unwrap().iter().map(|n| n.channel).collect();
    assert_eq!(channels, vec![NotificationChannel::Pager, NotificationChannel::Teams]);
    assert!(done.report.as_ref().unwrap().rendered.contains("## Analyst Guidance"));

    let results = done.execution_results.as_ref().unwrap();
    let isolate = results.iter().find(|r| r.target == "fileserver-01").unwrap();
    assert_eq!(isolate.status, ExecutionStatus::Skipped);
    assert!(results.iter().any(|r| r.status == ExecutionStatus::DryRun));

    let insights = done.learning_insights.as_ref().unwrap();
    assert!(insights.iter().any(|i| i == "analyst review was required; answer: approve containment"));
    assert!(done.total_duration_ms.is_some());
}

#[tokio::test]
async fn test_rejected_plan_executes_nothing() {
    let orchestrator = orchestrator(Arc::new(HeuristicBackend::new()));
    let paused = orchestrator.run(RunState::new(ransomware_request())).await;

    let done = orchestrator.resume(paused, "deny - this is a red team exercise").await;
    assert_eq!(done.current_phase, WorkflowPhase::Completed);
    assert!(done
        .execution_results
        .as_ref()
        .unwrap()
        .iter()
        .all(|r| r.status == ExecutionStatus::Skipped));
}

#[tokio::test]
async fn test_low_severity_alert_completes_unattended() {
    let request = WorkflowRequest::new("analyst-7", "session-8", RequestType::GeneralAnalysis)
        .with_alerts(vec![Alert::new("a-9", "Port scan from guest wifi", Severity::Low)]);
    let orchestrator = orchestrator(Arc::new(HeuristicBackend::new()));

    let done = orchestrator.run(RunState::new(request)).await;
    assert_eq!(done.current_phase, WorkflowPhase::Completed);
    assert_eq!(
        trail(&done),
        vec![
            StageId::ThreatAnalysis,
            StageId::RiskAssessment,
            StageId::DecisionMaking,
            StageId::ResponseGeneration,
            StageId::Learning,
        ]
    );
    assert!(done.human_input_prompt.is_none());
    assert!(done.execution_results.is_none());
    assert_eq!(done.alert_notifications.as_ref().unwrap()[0].channel, NotificationChannel::Dashboard);
}

#[tokio::test]
async fn test_unparsable_threat_payload_degrades() {
    let backend = ScriptedBackend::new()
        .with_answer(AnalysisTask::ThreatAnalysis, "The logs look bad but I cannot format JSON today.")
        .with_fallback(Arc::new(HeuristicBackend::new()));
    let orchestrator = orchestrator(Arc::new(backend));

    let state = orchestrator.run(RunState::new(ransomware_request())).await;
    assert!(state.errors.is_empty());
    assert_eq!(state.confidence_scores[&StageId::ThreatAnalysis], 0.0);
    assert!(state.threat_analysis.as_ref().unwrap().threats_detected.is_empty());
    assert!(state
        .warnings
        .iter()
        .any(|w| w.starts_with("threat_analysis: PAYLOAD/NO_JSON")));
    assert!(state.is_paused());
}

#[tokio::test]
async fn test_unreachable_backend_exhausts_retries() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_failure(AnalysisTask::ThreatAnalysis, BackendError::Unreachable("connection refused".into())),
    );
    let orchestrator = orchestrator(backend.clone());

    let state = orchestrator.run(RunState::new(ransomware_request())).await;
    assert_eq!(state.current_phase, WorkflowPhase::Error);
    assert!(state.is_finished());
    assert_eq!(state.errors.len(), 3);
    assert_eq!(backend.calls(), 3);
    assert_eq!(state.retry_count, 2);
    assert!(state
        .warnings
        .iter()
        .any(|w| w.starts_with("giving up after 3 error(s)")));
}

/// Low-confidence answers; the first decision request fails
#[derive(Default)]
struct HesitantBackend {
    decisions: AtomicUsize,
}

#[async_trait::async_trait]
impl AnalysisBackend for HesitantBackend {
    fn name(&self) -> &str {
        "hesitant"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, BackendError> {
        match request.task {
            AnalysisTask::ThreatAnalysis => Ok(r#"{"overall_threat_level": "medium", "summary": "unclear", "confidence": 0.3}"#.into()),
            AnalysisTask::RiskAssessment => Ok(r#"{"assessment": {"overall_score": 40, "level": "medium", "confidence": 0.3}}"#.into()),
            AnalysisTask::Correlation => Ok(r#"{"correlations": [], "confidence": 0.3}"#.into()),
            AnalysisTask::Decision => {
                if self.decisions.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BackendError::Unreachable("connection reset".into()))
                } else {
                    Ok(r#"{"classification": {"category": "malware", "severity": "medium", "confidence": 0.45},
                           "strategy": {"strategy_type": "monitor"}, "confidence": 0.45}"#
                        .into())
                }
            }
            AnalysisTask::Narrative => Ok(r#"{"summary": "Monitoring a medium severity alert."}"#.into()),
        }
    }
}

#[tokio::test]
async fn test_resume_retry_keeps_review_gate() {
    let config = EngineConfig {
        retry_mode: RetryMode::Resume,
        ..EngineConfig::default()
    };
    let orchestrator = orchestrator_with(Arc::new(HesitantBackend::default()), config);
    let request = WorkflowRequest::new("analyst-7", "session-7", RequestType::ThreatAnalysis)
        .with_alerts(vec![Alert::new("a-1", "Unsigned binary launched", Severity::Medium)]);

    let state = orchestrator.run(RunState::new(request)).await;
    assert_eq!(
        trail(&state),
        vec![
            StageId::ThreatAnalysis,
            StageId::RiskAssessment,
            StageId::DecisionMaking,
            StageId::ErrorHandling,
            StageId::DecisionMaking,
            StageId::HumanReview,
        ]
    );
    assert!(state.is_paused());
    assert!(!state.confidence_scores.contains_key(&StageId::ErrorHandling));
    assert!((state.overall_confidence() - 0.35).abs() < 1e-9);
}
