use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use socflow_core::outputs::StrategyType;
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::incident;
use crate::templates::ResponseRenderer;

/// Raises the operator prompt and holds the run until someone answers.
///
/// The prompt lists every reason that tripped the gate.
pub struct HumanReviewStage {
    confidence_threshold: f64,
    renderer: Arc<ResponseRenderer>,
}

impl HumanReviewStage {
    pub fn new(confidence_threshold: f64, renderer: Arc<ResponseRenderer>) -> Self {
        Self {
            confidence_threshold,
            renderer,
        }
    }

    fn reasons(&self, state: &RunState) -> Vec<String> {
        let mut reasons = Vec::new();

        let confidence = state.overall_confidence();
        if confidence < self.confidence_threshold {
            reasons.push(format!(
                "Overall confidence {} is below the {} threshold",
                incident::percent(confidence),
                incident::percent(self.confidence_threshold)
            ));
        }
        if let Some(escalation) = state.escalation_decision.as_ref().filter(|e| e.should_escalate) {
            let target = if escalation.target.is_empty() { "an escalation owner" } else { escalation.target.as_str() };
            reasons.push(format!("Escalation to {} requested: {}", target, escalation.reason));
        }
        if incident::strategy(state) == Some(StrategyType::Escalate) {
            reasons.push("Response strategy is escalate".to_string());
        }
        if reasons.is_empty() {
            reasons.push("Analyst confirmation requested".to_string());
        }
        reasons
    }
}

#[async_trait]
impl Stage for HumanReviewStage {
    fn id(&self) -> StageId {
        StageId::HumanReview
    }

    fn agent_type(&self) -> &'static str {
        "human_review"
    }

    fn deterministic(&self) -> bool {
        true
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let reasons = self.reasons(state);
        let data = json!({
            "workflow_id": state.workflow_id,
            "reasons": reasons,
            "strategy": incident::strategy_label(state),
            "action_count": incident::planned_actions(state).len(),
        });

        let mut delta = RunStateDelta::new();
        let prompt = match self.renderer.render("human_review_prompt", &data) {
            Ok(prompt) => prompt,
            Err(e) => {
                delta.warnings.push(format!("{}: {}", self.id(), e));
                format!("Workflow {} needs analyst review: {}", state.workflow_id, reasons.join("; "))
            }
        };

        delta.human_input_prompt = Some(prompt);
        delta.human_input_required = Some(true);
        Ok(delta.with_reasoning(self.id(), reasons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state;
    use socflow_core::outputs::{EscalationDecision, ResponseStrategy};

    fn stage() -> HumanReviewStage {
        HumanReviewStage::new(0.5, Arc::new(ResponseRenderer::builtin().unwrap()))
    }

    #[tokio::test]
    async fn test_low_confidence_reason() {
        let mut state = state();
        state.confidence_scores.insert(StageId::ThreatAnalysis, 0.2);

        let delta = stage().run(&state).await.unwrap();
        assert_eq!(delta.human_input_required, Some(true));
        assert!(delta.confidence_scores.is_empty());
        let prompt = delta.human_input_prompt.unwrap();
        assert!(prompt.contains("Overall confidence 20% is below the 50% threshold"));
        assert!(prompt.contains("wf-test"));
    }

    #[tokio::test]
    async fn test_every_trigger_listed() {
        let mut state = state();
        state.confidence_scores.insert(StageId::DecisionMaking, 0.9);
        state.escalation_decision = Some(EscalationDecision {
            should_escalate: true,
            target: "ir-lead".to_string(),
            reason: "domain controller involved".to_string(),
            ..Default::default()
        });
        state.response_strategy = Some(ResponseStrategy {
            strategy_type: StrategyType::Escalate,
            ..Default::default()
        });

        let delta = stage().run(&state).await.unwrap();
        let reasons = &delta.reasoning_chains[&StageId::HumanReview];
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("ir-lead"));
        assert!(delta.human_input_prompt.unwrap().contains("Proposed strategy: escalate with 0 planned action(s)."));
    }

    #[tokio::test]
    async fn test_same_state_same_prompt() {
        let state = state();
        let first = stage().run(&state).await.unwrap();
        let second = stage().run(&state).await.unwrap();
        assert_eq!(first, second);
    }
}
