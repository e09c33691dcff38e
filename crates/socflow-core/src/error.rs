//! Unified Error Model
use thiserror::Error;

use crate::phase::{StageId, WorkflowPhase};

#[derive(Error, Debug)]
pub enum SocflowError {
    #[error("CONFIG/{0}")]
    Config(String),

    #[error("PHASE/unknown phase `{0}`")]
    InvalidPhase(String),

    #[error("ROUTE/{0}")]
    Routing(#[from] RoutingError),

    #[error("REGISTRY/{0}")]
    Registry(String),

    #[error("SERIALIZE/{0}")]
    Serialize(String),
}

/// Unexpected failure raised by a stage.
///
/// Expected domain failures are reported inside the returned delta instead.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("STAGE/EXEC: {0}")]
    ExecutionFailed(String),

    #[error("STAGE/INPUT: {0}")]
    InvalidInput(String),

    #[error("STAGE/TIMEOUT: {stage} exceeded {timeout_ms}ms")]
    Timeout { stage: StageId, timeout_ms: u64 },

    #[error("STAGE/PANIC: {stage} panicked: {message}")]
    Panicked { stage: StageId, message: String },
}

/// The router was asked to decide from a state it cannot interpret
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("run already reached final phase `{0}`")]
    FinalPhase(WorkflowPhase),

    #[error("phase `{phase}` does not match last stage `{stage}`")]
    PhaseMismatch { phase: WorkflowPhase, stage: StageId },

    #[error("phase `{0}` reached without any stage having run")]
    MissingStage(WorkflowPhase),

    #[error("no stage registered for `{0}`")]
    Unregistered(StageId),

    #[error("step budget of {0} exhausted")]
    StepBudget(usize),
}

#[derive(Error, Debug, Clone)]
pub enum TelemetryError {
    #[error("TELEMETRY/SINK: {0}")]
    Sink(String),

    #[error("TELEMETRY/TIMEOUT: {0} exceeded {1}ms")]
    Timeout(&'static str, u64),
}
