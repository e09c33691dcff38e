use async_trait::async_trait;

use socflow_core::{RunState, RunStateDelta, Stage, StageError, StageId};

/// Broad cause of a recorded error, read from its message prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Backend,
    Timeout,
    Panic,
    Routing,
    Other,
}

impl ErrorKind {
    pub fn classify(message: &str) -> Self {
        if message.contains("BACKEND/") {
            ErrorKind::Backend
        } else if message.contains("STAGE/TIMEOUT") {
            ErrorKind::Timeout
        } else if message.contains("STAGE/PANIC") {
            ErrorKind::Panic
        } else if message.contains("ROUTE/") {
            ErrorKind::Routing
        } else {
            ErrorKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Backend => "backend",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Panic => "panic",
            ErrorKind::Routing => "routing",
            ErrorKind::Other => "other",
        }
    }
}

/// Reviews errors recorded since the last pass.
///
/// Whether the pipeline restarts is the router's call; this stage only
/// records what happened.
pub struct ErrorHandlingStage {
    max_retries: usize,
}

impl ErrorHandlingStage {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }
}

#[async_trait]
impl Stage for ErrorHandlingStage {
    fn id(&self) -> StageId {
        StageId::ErrorHandling
    }

    fn agent_type(&self) -> &'static str {
        "error_handler"
    }

    fn deterministic(&self) -> bool {
        true
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let total = state.errors.len();
        let retrying = total < self.max_retries;
        let fresh = state.errors.iter().skip(state.errors_handled);

        let mut delta = RunStateDelta::new();
        let mut reasoning = Vec::new();
        for message in fresh {
            let kind = ErrorKind::classify(message);
            reasoning.push(format!("{} error: {}", kind.as_str(), message));
            delta.warnings.push(if retrying {
                format!("recovering from {} error ({}/{}): {}", kind.as_str(), total, self.max_retries, message)
            } else {
                format!("giving up after {} error(s): {}", total, message)
            });
        }
        reasoning.push(if retrying {
            format!("restarting pipeline, attempt {}", state.retry_count + 2)
        } else {
            format!("retry budget of {} exhausted", self.max_retries)
        });

        Ok(delta.with_reasoning(self.id(), reasoning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state;

    #[test]
    fn test_classification() {
        assert_eq!(ErrorKind::classify("threat_analysis: BACKEND/UNREACHABLE: refused"), ErrorKind::Backend);
        assert_eq!(ErrorKind::classify("STAGE/TIMEOUT: decision_making exceeded 10ms"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("STAGE/PANIC: learning panicked: boom"), ErrorKind::Panic);
        assert_eq!(ErrorKind::classify("ROUTE/step budget of 64 exhausted"), ErrorKind::Routing);
        assert_eq!(ErrorKind::classify("disk full"), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_only_fresh_errors_reviewed() {
        let mut state = state();
        state.errors = vec!["old failure".to_string(), "risk_assessment: BACKEND/REJECTED: quota".to_string()];
        state.errors_handled = 1;

        let delta = ErrorHandlingStage::new(3).run(&state).await.unwrap();
        assert_eq!(delta.warnings.len(), 1);
        assert!(delta.warnings[0].starts_with("recovering from backend error (2/3)"));
        assert!(delta.errors.is_empty());
        assert!(!delta.is_failure());
        assert!(delta.confidence_scores.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_budget_noted() {
        let mut state = state();
        state.errors = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        state.errors_handled = 2;

        let delta = ErrorHandlingStage::new(3).run(&state).await.unwrap();
        assert_eq!(delta.warnings, vec!["giving up after 3 error(s): c".to_string()]);
        assert_eq!(
            delta.reasoning_chains[&StageId::ErrorHandling].last().unwrap(),
            "retry budget of 3 exhausted"
        );
    }
}
