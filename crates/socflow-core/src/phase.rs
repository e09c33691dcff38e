//! Phases of the workflow state machine and the stages that drive them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a run in the workflow state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// Entry point: the router evaluates the analysis predicates from scratch
    #[default]
    ContextAnalysis,
    /// Threat analysis, risk assessment and correlation
    Reasoning,
    DecisionMaking,
    ResponseGeneration,
    ActionExecution,
    /// Paused until an operator answers
    HumanReview,
    Learning,
    Completed,
    /// Retrying while budget remains, terminal once the run has ended
    Error,
    Cancelled,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 10] = [
        WorkflowPhase::ContextAnalysis,
        WorkflowPhase::Reasoning,
        WorkflowPhase::DecisionMaking,
        WorkflowPhase::ResponseGeneration,
        WorkflowPhase::ActionExecution,
        WorkflowPhase::HumanReview,
        WorkflowPhase::Learning,
        WorkflowPhase::Completed,
        WorkflowPhase::Error,
        WorkflowPhase::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::ContextAnalysis => "context_analysis",
            WorkflowPhase::Reasoning => "reasoning",
            WorkflowPhase::DecisionMaking => "decision_making",
            WorkflowPhase::ResponseGeneration => "response_generation",
            WorkflowPhase::ActionExecution => "action_execution",
            WorkflowPhase::HumanReview => "human_review",
            WorkflowPhase::Learning => "learning",
            WorkflowPhase::Completed => "completed",
            WorkflowPhase::Error => "error",
            WorkflowPhase::Cancelled => "cancelled",
        }
    }

    /// Phases that can never be left once reached.
    ///
    /// `Error` is not listed: it only becomes final when the run ends with
    /// retries exhausted, see [`crate::RunState::is_finished`].
    pub fn is_final(&self) -> bool {
        matches!(self, WorkflowPhase::Completed | WorkflowPhase::Cancelled)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowPhase {
    type Err = crate::error::SocflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowPhase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| crate::error::SocflowError::InvalidPhase(s.to_string()))
    }
}

/// Executable stages known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ThreatAnalysis,
    RiskAssessment,
    CorrelationAnalysis,
    DecisionMaking,
    ResponseGeneration,
    ActionExecution,
    HumanReview,
    ErrorHandling,
    Learning,
}

impl StageId {
    pub const ALL: [StageId; 9] = [
        StageId::ThreatAnalysis,
        StageId::RiskAssessment,
        StageId::CorrelationAnalysis,
        StageId::DecisionMaking,
        StageId::ResponseGeneration,
        StageId::ActionExecution,
        StageId::HumanReview,
        StageId::ErrorHandling,
        StageId::Learning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::ThreatAnalysis => "threat_analysis",
            StageId::RiskAssessment => "risk_assessment",
            StageId::CorrelationAnalysis => "correlation_analysis",
            StageId::DecisionMaking => "decision_making",
            StageId::ResponseGeneration => "response_generation",
            StageId::ActionExecution => "action_execution",
            StageId::HumanReview => "human_review",
            StageId::ErrorHandling => "error_handling",
            StageId::Learning => "learning",
        }
    }

    /// Phase the run is in while this stage executes
    pub fn phase(&self) -> WorkflowPhase {
        match self {
            StageId::ThreatAnalysis | StageId::RiskAssessment | StageId::CorrelationAnalysis => {
                WorkflowPhase::Reasoning
            }
            StageId::DecisionMaking => WorkflowPhase::DecisionMaking,
            StageId::ResponseGeneration => WorkflowPhase::ResponseGeneration,
            StageId::ActionExecution => WorkflowPhase::ActionExecution,
            StageId::HumanReview => WorkflowPhase::HumanReview,
            StageId::ErrorHandling => WorkflowPhase::Error,
            StageId::Learning => WorkflowPhase::Learning,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trips_through_str() {
        for phase in WorkflowPhase::ALL {
            assert_eq!(phase.as_str().parse::<WorkflowPhase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_unknown_phase_rejected() {
        assert!("thinking".parse::<WorkflowPhase>().is_err());
        assert!(serde_json::from_str::<WorkflowPhase>("\"thinking\"").is_err());
    }

    #[test]
    fn test_reasoning_stages_share_phase() {
        assert_eq!(StageId::ThreatAnalysis.phase(), WorkflowPhase::Reasoning);
        assert_eq!(StageId::CorrelationAnalysis.phase(), WorkflowPhase::Reasoning);
        assert_eq!(StageId::ErrorHandling.phase(), WorkflowPhase::Error);
    }

    #[test]
    fn test_final_phases() {
        assert!(WorkflowPhase::Completed.is_final());
        assert!(WorkflowPhase::Cancelled.is_final());
        assert!(!WorkflowPhase::Error.is_final());
        assert!(!WorkflowPhase::HumanReview.is_final());
    }
}
