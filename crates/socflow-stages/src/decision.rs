use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use socflow_core::outputs::{EscalationDecision, ResourceAllocation, ResponseStrategy, ThreatClassification};
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::backend::{annotate, consult, AnalysisBackend, AnalysisTask};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DecisionPayload {
    classification: ThreatClassification,
    strategy: ResponseStrategy,
    allocation: ResourceAllocation,
    escalation: EscalationDecision,
    confidence: f64,
}

/// Classifies the threat and picks the response strategy
pub struct DecisionStage {
    backend: Arc<dyn AnalysisBackend>,
}

impl DecisionStage {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for DecisionStage {
    fn id(&self) -> StageId {
        StageId::DecisionMaking
    }

    fn agent_type(&self) -> &'static str {
        "decision_maker"
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let consulted = match consult::<DecisionPayload>(self.backend.as_ref(), self.id(), AnalysisTask::Decision, state).await {
            Ok(consulted) => consulted,
            Err(failure) => return Ok(failure),
        };

        let DecisionPayload {
            mut classification,
            mut strategy,
            allocation,
            escalation,
            confidence,
        } = consulted.payload.value;

        if classification.category.trim().is_empty() {
            classification.category = "suspicious_activity".to_string();
        }
        // Actions are keyed by id downstream, so ids must be present and unique.
        let mut seen = HashSet::new();
        for (index, action) in strategy.actions.iter_mut().enumerate() {
            if action.id.trim().is_empty() || !seen.insert(action.id.clone()) {
                action.id = format!("act-{}", index + 1);
                seen.insert(action.id.clone());
            }
        }

        let delta = RunStateDelta {
            threat_classification: Some(classification),
            response_strategy: Some(strategy),
            resource_allocation: Some(allocation),
            escalation_decision: Some(escalation),
            ..Default::default()
        };
        Ok(annotate(delta, self.id(), confidence, consulted.payload.reasoning, consulted.parse_warning))
    }
}
