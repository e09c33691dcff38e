use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use socflow_core::outputs::{RiskAssessment, RiskPrioritization};
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::backend::{annotate, consult, AnalysisBackend, AnalysisTask};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RiskPayload {
    assessment: RiskAssessment,
    prioritization: RiskPrioritization,
}

/// Scores business risk and ranks what to handle first
pub struct RiskAssessmentStage {
    backend: Arc<dyn AnalysisBackend>,
}

impl RiskAssessmentStage {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for RiskAssessmentStage {
    fn id(&self) -> StageId {
        StageId::RiskAssessment
    }

    fn agent_type(&self) -> &'static str {
        "risk_assessor"
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let consulted = match consult::<RiskPayload>(self.backend.as_ref(), self.id(), AnalysisTask::RiskAssessment, state).await {
            Ok(consulted) => consulted,
            Err(failure) => return Ok(failure),
        };

        let RiskPayload {
            mut assessment,
            mut prioritization,
        } = consulted.payload.value;
        assessment.overall_score = assessment.overall_score.min(100);
        prioritization.ranked.sort_by_key(|item| item.priority);

        let confidence = assessment.confidence;
        let delta = RunStateDelta {
            risk_assessment: Some(assessment),
            risk_prioritization: Some(prioritization),
            ..Default::default()
        };
        Ok(annotate(delta, self.id(), confidence, consulted.payload.reasoning, consulted.parse_warning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::HeuristicBackend;
    use crate::test_support::{scripted, state};
    use socflow_core::Severity;

    #[tokio::test]
    async fn test_score_clamped_and_ranking_sorted() {
        let answer = r#"{"assessment": {"overall_score": 140, "level": "critical", "confidence": 0.7},
                         "prioritization": {"ranked": [
                            {"item_id": "a-2", "priority": 2},
                            {"item_id": "a-1", "priority": 1}
                         ]}}"#;
        let stage = RiskAssessmentStage::new(scripted(AnalysisTask::RiskAssessment, answer));
        let delta = stage.run(&state()).await.unwrap();

        assert_eq!(delta.risk_assessment.as_ref().unwrap().overall_score, 100);
        assert_eq!(delta.risk_prioritization.unwrap().ranked[0].item_id, "a-1");
        assert_eq!(delta.confidence_scores[&StageId::RiskAssessment], 0.7);
    }

    #[tokio::test]
    async fn test_heuristic_risk_is_critical_for_critical_host() {
        let stage = RiskAssessmentStage::new(Arc::new(HeuristicBackend::new()));
        let delta = stage.run(&state()).await.unwrap();

        let assessment = delta.risk_assessment.unwrap();
        assert_eq!(assessment.level, Severity::Critical);
        assert!(assessment.factors.iter().any(|f| f.name == "critical_assets"));
        assert!(!delta.reasoning_chains[&StageId::RiskAssessment].is_empty());
    }
}
