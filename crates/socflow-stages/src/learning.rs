use async_trait::async_trait;

use socflow_core::outputs::ExecutionStatus;
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::incident;

/// Stages scoring below this are called out for tuning
const LOW_CONFIDENCE: f64 = 0.5;

/// Distills what this run teaches about the pipeline
#[derive(Debug, Clone, Default)]
pub struct LearningStage;

impl LearningStage {
    pub fn new() -> Self {
        Self
    }

    fn insights(&self, state: &RunState) -> Vec<String> {
        let mut insights = vec![format!(
            "{} handled with {} strategy at {} overall confidence",
            incident::category(state),
            incident::strategy_label(state),
            incident::percent(state.overall_confidence())
        )];

        for (stage, score) in state.confidence_scores.iter().filter(|(_, s)| **s < LOW_CONFIDENCE) {
            insights.push(format!("low confidence in {} ({}); review its inputs or prompts", stage, incident::percent(*score)));
        }

        if let Some(last) = state.warnings.last() {
            insights.push(format!("{} warning(s) raised; most recent: {}", state.warnings.len(), last));
        }

        let failed = state
            .execution_results
            .iter()
            .flatten()
            .filter(|r| r.status == ExecutionStatus::Failed)
            .count();
        if failed > 0 {
            insights.push(format!("{} response action(s) failed and need manual follow-up", failed));
        }

        if let Some(answer) = &state.human_input_response {
            insights.push(format!("analyst review was required; answer: {}", answer));
        }

        if state.retry_count > 0 {
            insights.push(format!("pipeline restarted {} time(s) before completing", state.retry_count));
        }

        insights
    }
}

#[async_trait]
impl Stage for LearningStage {
    fn id(&self) -> StageId {
        StageId::Learning
    }

    fn agent_type(&self) -> &'static str {
        "learning"
    }

    fn deterministic(&self) -> bool {
        true
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let insights = self.insights(state);
        Ok(RunStateDelta {
            learning_insights: Some(insights),
            ..Default::default()
        })
    }
}
