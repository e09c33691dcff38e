use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use socflow_core::outputs::CorrelationResult;
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::backend::{annotate, consult, AnalysisBackend, AnalysisTask};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CorrelationPayload {
    correlations: Vec<CorrelationResult>,
    confidence: f64,
}

/// Links related alerts, incidents, entities and intel
pub struct CorrelationStage {
    backend: Arc<dyn AnalysisBackend>,
}

impl CorrelationStage {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for CorrelationStage {
    fn id(&self) -> StageId {
        StageId::CorrelationAnalysis
    }

    fn agent_type(&self) -> &'static str {
        "correlation_engine"
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let consulted =
            match consult::<CorrelationPayload>(self.backend.as_ref(), self.id(), AnalysisTask::Correlation, state).await {
                Ok(consulted) => consulted,
                Err(failure) => return Ok(failure),
            };

        let CorrelationPayload {
            mut correlations,
            confidence,
        } = consulted.payload.value;
        // Self-links carry no information.
        correlations.retain(|c| c.related_ids.len() >= 2);
        for correlation in &mut correlations {
            correlation.strength = correlation.strength.clamp(0.0, 1.0);
        }

        // An empty list is still an answer: the field is set so routing moves on.
        let delta = RunStateDelta {
            correlations: Some(correlations),
            ..Default::default()
        };
        Ok(annotate(delta, self.id(), confidence, consulted.payload.reasoning, consulted.parse_warning))
    }
}
