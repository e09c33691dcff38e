//! Response action execution seam.
//!
//! Executors perform side effects, so stages call them exactly once per
//! action and never retry.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use socflow_core::outputs::{ExecutionResult, ExecutionStatus, PlannedAction};

use crate::error::ExecutorError;

/// How planned actions are carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Record what would have been done
    #[default]
    DryRun,
    /// Record every action as skipped
    Disabled,
}

impl std::str::FromStr for ExecutionMode {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dry_run" | "dry-run" | "dryrun" => Ok(ExecutionMode::DryRun),
            "disabled" | "off" => Ok(ExecutionMode::Disabled),
            other => Err(ExecutorError::Unsupported(format!("execution mode `{}`", other))),
        }
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, action: &PlannedAction) -> Result<ExecutionResult, ExecutorError>;
}

/// Executor for `mode`
pub fn executor_for(mode: ExecutionMode) -> Arc<dyn ActionExecutor> {
    match mode {
        ExecutionMode::DryRun => Arc::new(DryRunExecutor),
        ExecutionMode::Disabled => Arc::new(DisabledExecutor),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn execute(&self, action: &PlannedAction) -> Result<ExecutionResult, ExecutorError> {
        if action.target.trim().is_empty() {
            return Err(ExecutorError::Failed(format!("{} has no target", action.id)));
        }
        Ok(result(
            action,
            ExecutionStatus::DryRun,
            format!("would run {:?} against {}", action.action_type, action.target),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExecutor;

#[async_trait]
impl ActionExecutor for DisabledExecutor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn execute(&self, action: &PlannedAction) -> Result<ExecutionResult, ExecutorError> {
        Ok(result(action, ExecutionStatus::Skipped, "action execution disabled".to_string()))
    }
}

pub(crate) fn result(action: &PlannedAction, status: ExecutionStatus, message: String) -> ExecutionResult {
    ExecutionResult {
        action_id: action.id.clone(),
        action_type: action.action_type,
        target: action.target.clone(),
        status,
        message,
        executed_at: Some(Utc::now()),
    }
}
