//! Router: pure decisions over the run state.
//!
//! Every transition point is a plain function of `(policy, state)`; the
//! orchestrator applies the returned [`Route`]. Predicates are evaluated in a
//! fixed order and each one is guarded by "output not yet set", so a stage is
//! never selected twice within one pipeline attempt.
//!
//! ```text
//! entry ─► threat ─► risk ─► correlation ─► decision ─┬─► response ─► action ─► learning ─► complete
//!   │        (first matching predicate wins)          └─► human_review ─(await)─┘
//!   └─ any unhandled error ─► error_handling ─► restart | fail
//! ```

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::RoutingError;
use crate::outputs::StrategyType;
use crate::phase::{StageId, WorkflowPhase};
use crate::state::RunState;

/// What the orchestrator does next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", content = "stage", rename_all = "snake_case")]
pub enum Route {
    /// Run this stage
    Stage(StageId),
    /// Hold at the human-review gate and return to the caller
    Await,
    /// Start another pipeline attempt from the entry stage
    Restart,
    /// Finish as `completed`
    Complete,
    /// Finish as `error`
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingPolicy {
    pub max_retries: usize,
    pub confidence_threshold: f64,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RoutingPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            confidence_threshold: config.confidence_threshold,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    policy: RoutingPolicy,
}

impl Router {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Decide the next step for `state`.
    ///
    /// Errors mean the state itself is inconsistent and the run must stop.
    pub fn route(&self, state: &RunState) -> Result<Route, RoutingError> {
        let phase = state.current_phase;
        if phase.is_final() || state.is_finished() {
            return Err(RoutingError::FinalPhase(phase));
        }

        if phase != WorkflowPhase::ContextAnalysis {
            match state.last_stage {
                None => return Err(RoutingError::MissingStage(phase)),
                Some(stage) if stage.phase() != phase && phase != WorkflowPhase::Error => {
                    return Err(RoutingError::PhaseMismatch { phase, stage });
                }
                Some(_) => {}
            }
        }

        if state.has_unhandled_errors() {
            return Ok(Route::Stage(StageId::ErrorHandling));
        }

        if phase == WorkflowPhase::ContextAnalysis {
            return Ok(self.from_entry(state));
        }

        // Checked above: every other phase has a last stage.
        let Some(last) = state.last_stage else {
            return Err(RoutingError::MissingStage(phase));
        };

        Ok(match last {
            StageId::ThreatAnalysis | StageId::RiskAssessment | StageId::CorrelationAnalysis => {
                self.after_reasoning(state)
            }
            StageId::DecisionMaking => self.after_decision(state),
            StageId::HumanReview => self.after_human_review(state),
            StageId::ResponseGeneration => self.after_response(state),
            StageId::ActionExecution => self.after_action_execution(state),
            StageId::Learning => Route::Complete,
            StageId::ErrorHandling => self.after_error_handling(state),
        })
    }

    /// Entry predicates, evaluated at `context_analysis`
    pub fn from_entry(&self, state: &RunState) -> Route {
        self.analysis_chain(state)
    }

    /// After threat analysis, risk assessment or correlation
    pub fn after_reasoning(&self, state: &RunState) -> Route {
        self.analysis_chain(state)
    }

    pub fn after_decision(&self, state: &RunState) -> Route {
        if self.needs_human_review(state) {
            Route::Stage(StageId::HumanReview)
        } else if state.natural_language_response.is_none() {
            Route::Stage(StageId::ResponseGeneration)
        } else {
            self.after_response(state)
        }
    }

    pub fn after_human_review(&self, state: &RunState) -> Route {
        if state.human_input_required || state.human_input_response.is_none() {
            Route::Await
        } else if state.natural_language_response.is_none() {
            Route::Stage(StageId::ResponseGeneration)
        } else {
            self.after_response(state)
        }
    }

    pub fn after_response(&self, state: &RunState) -> Route {
        let has_actions = state
            .response_strategy
            .as_ref()
            .is_some_and(|strategy| !strategy.actions.is_empty());
        if has_actions && state.execution_results.is_none() {
            Route::Stage(StageId::ActionExecution)
        } else {
            self.after_action_execution(state)
        }
    }

    pub fn after_action_execution(&self, state: &RunState) -> Route {
        if state.learning_insights.is_none() {
            Route::Stage(StageId::Learning)
        } else {
            Route::Complete
        }
    }

    pub fn after_error_handling(&self, state: &RunState) -> Route {
        if state.errors.len() < self.policy.max_retries {
            Route::Restart
        } else {
            Route::Fail
        }
    }

    /// Low confidence, a decided escalation, or an escalate strategy.
    ///
    /// Never true once an operator has answered.
    pub fn needs_human_review(&self, state: &RunState) -> bool {
        if state.human_input_response.is_some() {
            return false;
        }
        let low_confidence = state.overall_confidence() < self.policy.confidence_threshold;
        let escalated = state
            .escalation_decision
            .as_ref()
            .is_some_and(|decision| decision.should_escalate);
        let escalate_strategy = state
            .response_strategy
            .as_ref()
            .is_some_and(|strategy| strategy.strategy_type == StrategyType::Escalate);
        low_confidence || escalated || escalate_strategy
    }

    pub fn should_run_threat_analysis(&self, state: &RunState) -> bool {
        state.request_type.wants_threat_analysis()
            && state.has_security_events()
            && state.threat_analysis.is_none()
    }

    pub fn should_run_risk_assessment(&self, state: &RunState) -> bool {
        state.request_type.wants_risk_assessment()
            && state.has_security_events()
            && state.risk_assessment.is_none()
    }

    pub fn should_run_correlation(&self, state: &RunState) -> bool {
        let events = state.alerts.len() + state.incidents.len();
        let context = !state.entities.is_empty() || !state.threat_intelligence.is_empty();
        state.request_type.wants_correlation()
            && (events >= 2 || (events == 1 && context))
            && state.correlations.is_none()
    }

    pub fn should_run_decision(&self, state: &RunState) -> bool {
        let analysed = state.threat_analysis.is_some()
            || state.risk_assessment.is_some()
            || state.correlations.is_some();
        analysed && state.threat_classification.is_none()
    }

    fn analysis_chain(&self, state: &RunState) -> Route {
        if self.should_run_threat_analysis(state) {
            Route::Stage(StageId::ThreatAnalysis)
        } else if self.should_run_risk_assessment(state) {
            Route::Stage(StageId::RiskAssessment)
        } else if self.should_run_correlation(state) {
            Route::Stage(StageId::CorrelationAnalysis)
        } else if self.should_run_decision(state) {
            Route::Stage(StageId::DecisionMaking)
        } else if state.threat_classification.is_some() {
            // A resumed attempt that already decided picks up downstream.
            self.after_decision(state)
        } else {
            Route::Complete
        }
    }
}
