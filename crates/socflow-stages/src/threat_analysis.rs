use async_trait::async_trait;
use std::sync::Arc;

use socflow_core::outputs::ThreatAnalysis;
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::backend::{annotate, consult, AnalysisBackend, AnalysisTask};

/// Identifies threats in the supplied alerts and incidents
pub struct ThreatAnalysisStage {
    backend: Arc<dyn AnalysisBackend>,
}

impl ThreatAnalysisStage {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for ThreatAnalysisStage {
    fn id(&self) -> StageId {
        StageId::ThreatAnalysis
    }

    fn agent_type(&self) -> &'static str {
        "threat_analyzer"
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let consulted = match consult::<ThreatAnalysis>(self.backend.as_ref(), self.id(), AnalysisTask::ThreatAnalysis, state).await {
            Ok(consulted) => consulted,
            Err(failure) => return Ok(failure),
        };

        let analysis = consulted.payload.value;
        let confidence = analysis.confidence;
        let delta = RunStateDelta {
            threat_analysis: Some(analysis),
            ..Default::default()
        };
        Ok(annotate(delta, self.id(), confidence, consulted.payload.reasoning, consulted.parse_warning))
    }
}
