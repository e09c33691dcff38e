use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use socflow_core::outputs::ExecutionStatus;
use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

use crate::executor::{result, ActionExecutor};
use crate::incident;

/// Operator answers that veto every planned action
const REJECTIONS: [&str; 2] = ["reject", "deny"];

/// Carries out the automated actions of the chosen strategy.
///
/// Each action is attempted once. Manual actions, and every action after an
/// operator rejection, are recorded as skipped.
pub struct ActionExecutionStage {
    executor: Arc<dyn ActionExecutor>,
}

impl ActionExecutionStage {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }
}

fn rejected(state: &RunState) -> bool {
    state
        .human_input_response
        .as_deref()
        .map(|answer| answer.trim().to_ascii_lowercase())
        .is_some_and(|answer| REJECTIONS.iter().any(|word| answer.starts_with(word)))
}

#[async_trait]
impl Stage for ActionExecutionStage {
    fn id(&self) -> StageId {
        StageId::ActionExecution
    }

    fn agent_type(&self) -> &'static str {
        "action_executor"
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let vetoed = rejected(state);
        let mut results = Vec::new();
        let mut warnings = Vec::new();
        let mut reasoning = Vec::new();
        let mut attempted = 0usize;
        let mut completed = 0usize;

        for action in incident::planned_actions(state) {
            if vetoed {
                results.push(result(action, ExecutionStatus::Skipped, "rejected by analyst".to_string()));
                continue;
            }
            if !action.automated {
                results.push(result(action, ExecutionStatus::Skipped, "manual action awaiting analyst".to_string()));
                continue;
            }

            attempted += 1;
            match self.executor.execute(action).await {
                Ok(outcome) => {
                    if matches!(outcome.status, ExecutionStatus::Succeeded | ExecutionStatus::DryRun) {
                        completed += 1;
                    }
                    info!(action = %action.id, executor = self.executor.name(), status = ?outcome.status, "action executed");
                    reasoning.push(format!("{} on {}: {:?}", action.id, action.target, outcome.status));
                    results.push(outcome);
                }
                Err(e) => {
                    warn!(action = %action.id, executor = self.executor.name(), error = %e, "action failed");
                    warnings.push(format!("{}: {} failed: {}", self.id(), action.id, e));
                    reasoning.push(format!("{} on {}: failed", action.id, action.target));
                    results.push(result(action, ExecutionStatus::Failed, e.to_string()));
                }
            }
        }

        if vetoed {
            reasoning.push("analyst rejected the response plan".to_string());
        }

        let confidence = if attempted == 0 {
            1.0
        } else {
            completed as f64 / attempted as f64
        };

        let delta = RunStateDelta {
            execution_results: Some(results),
            warnings,
            ..Default::default()
        };
        Ok(delta
            .with_confidence(self.id(), confidence)
            .with_reasoning(self.id(), reasoning))
    }
}
