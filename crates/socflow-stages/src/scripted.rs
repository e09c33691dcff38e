//! Fixed-answer backend for replays and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{AnalysisBackend, AnalysisRequest, AnalysisTask};
use crate::error::BackendError;

/// Answers each task with a scripted reply, or delegates to a fallback
#[derive(Default)]
pub struct ScriptedBackend {
    answers: HashMap<AnalysisTask, Result<String, BackendError>>,
    fallback: Option<Arc<dyn AnalysisBackend>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, task: AnalysisTask, answer: impl Into<String>) -> Self {
        self.answers.insert(task, Ok(answer.into()));
        self
    }

    pub fn with_failure(mut self, task: AnalysisTask, error: BackendError) -> Self {
        self.answers.insert(task, Err(error));
        self
    }

    /// Backend for tasks without a scripted reply
    pub fn with_fallback(mut self, fallback: Arc<dyn AnalysisBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = self.answers.get(&request.task) {
            return answer.clone();
        }
        match &self.fallback {
            Some(fallback) => fallback.analyze(request).await,
            None => Err(BackendError::Rejected(format!("no scripted answer for {}", request.task.as_str()))),
        }
    }
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tasks: Vec<&str> = self.answers.keys().map(AnalysisTask::as_str).collect();
        tasks.sort_unstable();
        f.debug_struct("ScriptedBackend")
            .field("tasks", &tasks)
            .field("fallback", &self.fallback.as_ref().map(|b| b.name().to_string()))
            .field("calls", &self.calls())
            .finish()
    }
}
