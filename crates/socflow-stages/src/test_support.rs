use std::sync::Arc;

use socflow_core::{
    Alert, Entity, EntityType, RequestType, RunState, Severity, ThreatIntelligence, WorkflowRequest,
};

use crate::backend::AnalysisTask;
use crate::scripted::ScriptedBackend;

/// Two related alerts on a critical host plus a matching intel record
pub fn state() -> RunState {
    let request = WorkflowRequest::new("analyst-1", "session-1", RequestType::IncidentInvestigation)
        .with_alerts(vec![
            Alert::new("a-1", "Ransomware note dropped", Severity::Critical)
                .with_indicators(vec!["198.51.100.7".into()])
                .with_entities(vec!["e-1".into()])
                .with_techniques(vec!["T1486".into()]),
            Alert::new("a-2", "Suspicious SMB session", Severity::High).with_entities(vec!["e-1".into()]),
        ])
        .with_entities(vec![Entity::new("e-1", "fileserver-01", EntityType::Host).with_criticality(Severity::Critical)])
        .with_threat_intelligence(vec![ThreatIntelligence::new("ti-1", "198.51.100.7", Severity::Critical)]);
    RunState::new(request).with_workflow_id("wf-test")
}

pub fn scripted(task: AnalysisTask, answer: &str) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::new().with_answer(task, answer))
}
