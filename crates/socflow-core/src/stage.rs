//! Stage Trait: the contract every analysis stage honors
use async_trait::async_trait;

use crate::error::StageError;
use crate::phase::StageId;
use crate::state::{RunState, RunStateDelta};

/// A unit of analysis work producing a partial state update.
///
/// Expected domain failures (backend unreachable, bad input) are returned as
/// `Ok(RunStateDelta::failure(..))`. `Err` is reserved for unexpected faults.
/// A stage only writes the output fields it owns and fully overwrites them
/// when run again. Side effects are never retried inside the stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is
    fn id(&self) -> StageId;

    /// Agent label reported to telemetry
    fn agent_type(&self) -> &'static str {
        "analysis"
    }

    /// Same state in, same delta out (no backend or clock involved)
    fn deterministic(&self) -> bool {
        false
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError>;
}
