//! Telemetry Bridge: best-effort observability sink.
//!
//! Bridges report failures through [`TelemetryError`], but the orchestrator
//! only ever talks to them through [`GuardedTelemetry`], which bounds every
//! call with a timeout and swallows errors and panics. A broken sink degrades
//! observability, never the workflow.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::TelemetryError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[async_trait]
pub trait TelemetryBridge: Send + Sync {
    /// Open a trace for one workflow; returns its trace id
    async fn start_workflow(&self, workflow_type: &str, metadata: &Value) -> Result<String, TelemetryError>;

    async fn start_phase(&self, trace_id: &str, phase: &str, agent_type: Option<&str>) -> Result<(), TelemetryError>;

    async fn complete_phase(&self, trace_id: &str, phase: &str, metrics: &PhaseMetrics) -> Result<(), TelemetryError>;

    async fn complete_workflow(
        &self,
        trace_id: &str,
        status: WorkflowStatus,
        final_metrics: &Value,
    ) -> Result<(), TelemetryError>;

    async fn log_custom_event(
        &self,
        trace_id: &str,
        name: &str,
        data: &Value,
        level: EventLevel,
    ) -> Result<(), TelemetryError>;
}

// ============================================================================
// GUARD
// ============================================================================

/// Timeout-bounded, error-swallowing front for a bridge
#[derive(Clone)]
pub struct GuardedTelemetry {
    bridge: Arc<dyn TelemetryBridge>,
    timeout: Duration,
}

impl GuardedTelemetry {
    pub fn new(bridge: Arc<dyn TelemetryBridge>, timeout: Duration) -> Self {
        Self { bridge, timeout }
    }

    pub async fn start_workflow(&self, workflow_type: &str, metadata: &Value) -> Option<String> {
        self.call("start_workflow", self.bridge.start_workflow(workflow_type, metadata))
            .await
    }

    pub async fn start_phase(&self, trace_id: &str, phase: &str, agent_type: Option<&str>) {
        self.call("start_phase", self.bridge.start_phase(trace_id, phase, agent_type))
            .await;
    }

    pub async fn complete_phase(&self, trace_id: &str, phase: &str, metrics: &PhaseMetrics) {
        self.call("complete_phase", self.bridge.complete_phase(trace_id, phase, metrics))
            .await;
    }

    pub async fn complete_workflow(&self, trace_id: &str, status: WorkflowStatus, final_metrics: &Value) {
        self.call(
            "complete_workflow",
            self.bridge.complete_workflow(trace_id, status, final_metrics),
        )
        .await;
    }

    pub async fn event(&self, trace_id: &str, name: &str, data: &Value, level: EventLevel) {
        self.call(
            "log_custom_event",
            self.bridge.log_custom_event(trace_id, name, data, level),
        )
        .await;
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, TelemetryError>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(Ok(Ok(value))) => Some(value),
            Ok(Ok(Err(e))) => {
                warn!(op, error = %e, "telemetry call failed");
                None
            }
            Ok(Err(_)) => {
                warn!(op, "telemetry bridge panicked");
                None
            }
            Err(_) => {
                let e = TelemetryError::Timeout(op, self.timeout.as_millis() as u64);
                warn!(op, error = %e, "telemetry call timed out");
                None
            }
        }
    }
}

impl std::fmt::Debug for GuardedTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedTelemetry")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BRIDGES
// ============================================================================

/// Used when no sink is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

#[async_trait]
impl TelemetryBridge for NoopTelemetry {
    async fn start_workflow(&self, _workflow_type: &str, _metadata: &Value) -> Result<String, TelemetryError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn start_phase(&self, _trace_id: &str, _phase: &str, _agent_type: Option<&str>) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn complete_phase(&self, _trace_id: &str, _phase: &str, _metrics: &PhaseMetrics) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn complete_workflow(
        &self,
        _trace_id: &str,
        _status: WorkflowStatus,
        _final_metrics: &Value,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn log_custom_event(
        &self,
        _trace_id: &str,
        _name: &str,
        _data: &Value,
        _level: EventLevel,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Mirrors telemetry into `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

#[async_trait]
impl TelemetryBridge for TracingTelemetry {
    async fn start_workflow(&self, workflow_type: &str, metadata: &Value) -> Result<String, TelemetryError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        info!(%trace_id, workflow_type, %metadata, "workflow started");
        Ok(trace_id)
    }

    async fn start_phase(&self, trace_id: &str, phase: &str, agent_type: Option<&str>) -> Result<(), TelemetryError> {
        debug!(trace_id, phase, agent_type, "phase started");
        Ok(())
    }

    async fn complete_phase(&self, trace_id: &str, phase: &str, metrics: &PhaseMetrics) -> Result<(), TelemetryError> {
        match &metrics.error {
            Some(error) => warn!(trace_id, phase, latency_ms = metrics.latency_ms, %error, "phase failed"),
            None => debug!(
                trace_id,
                phase,
                latency_ms = metrics.latency_ms,
                input_tokens = metrics.input_tokens,
                output_tokens = metrics.output_tokens,
                "phase completed"
            ),
        }
        Ok(())
    }

    async fn complete_workflow(
        &self,
        trace_id: &str,
        status: WorkflowStatus,
        final_metrics: &Value,
    ) -> Result<(), TelemetryError> {
        info!(trace_id, status = status.as_str(), %final_metrics, "workflow finished");
        Ok(())
    }

    async fn log_custom_event(
        &self,
        trace_id: &str,
        name: &str,
        data: &Value,
        level: EventLevel,
    ) -> Result<(), TelemetryError> {
        match level {
            EventLevel::Debug => debug!(trace_id, event = name, %data),
            EventLevel::Info => info!(trace_id, event = name, %data),
            EventLevel::Warning | EventLevel::Error => warn!(trace_id, event = name, %data),
        }
        Ok(())
    }
}

/// One call received by [`RecordingTelemetry`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    WorkflowStarted { trace_id: String, workflow_type: String },
    PhaseStarted { trace_id: String, phase: String, agent_type: Option<String> },
    PhaseCompleted { trace_id: String, phase: String, metrics: PhaseMetrics },
    WorkflowCompleted { trace_id: String, status: WorkflowStatus },
    Custom { trace_id: String, name: String, data: Value, level: EventLevel },
}

/// Keeps every call in memory
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().await.clone()
    }

    /// Phases reported complete, in order
    pub async fn completed_phases(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::PhaseCompleted { phase, .. } => Some(phase.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn custom_events(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::Custom { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    async fn push(&self, event: TelemetryEvent) {
        self.events.lock().await.push(event);
    }
}

#[async_trait]
impl TelemetryBridge for RecordingTelemetry {
    async fn start_workflow(&self, workflow_type: &str, _metadata: &Value) -> Result<String, TelemetryError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        self.push(TelemetryEvent::WorkflowStarted {
            trace_id: trace_id.clone(),
            workflow_type: workflow_type.to_string(),
        })
        .await;
        Ok(trace_id)
    }

    async fn start_phase(&self, trace_id: &str, phase: &str, agent_type: Option<&str>) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::PhaseStarted {
            trace_id: trace_id.to_string(),
            phase: phase.to_string(),
            agent_type: agent_type.map(str::to_string),
        })
        .await;
        Ok(())
    }

    async fn complete_phase(&self, trace_id: &str, phase: &str, metrics: &PhaseMetrics) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::PhaseCompleted {
            trace_id: trace_id.to_string(),
            phase: phase.to_string(),
            metrics: metrics.clone(),
        })
        .await;
        Ok(())
    }

    async fn complete_workflow(
        &self,
        trace_id: &str,
        status: WorkflowStatus,
        _final_metrics: &Value,
    ) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::WorkflowCompleted {
            trace_id: trace_id.to_string(),
            status,
        })
        .await;
        Ok(())
    }

    async fn log_custom_event(
        &self,
        trace_id: &str,
        name: &str,
        data: &Value,
        level: EventLevel,
    ) -> Result<(), TelemetryError> {
        self.push(TelemetryEvent::Custom {
            trace_id: trace_id.to_string(),
            name: name.to_string(),
            data: data.clone(),
            level,
        })
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Broken;

    #[async_trait]
    impl TelemetryBridge for Broken {
        async fn start_workflow(&self, _: &str, _: &Value) -> Result<String, TelemetryError> {
            Err(TelemetryError::Sink("collector unreachable".into()))
        }
        async fn start_phase(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), TelemetryError> {
            panic!("sink bug")
        }
        async fn complete_phase(&self, _: &str, _: &str, _: &PhaseMetrics) -> Result<(), TelemetryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
        async fn complete_workflow(&self, _: &str, _: WorkflowStatus, _: &Value) -> Result<(), TelemetryError> {
            Err(TelemetryError::Sink("closed".into()))
        }
        async fn log_custom_event(&self, _: &str, _: &str, _: &Value, _: EventLevel) -> Result<(), TelemetryError> {
            Err(TelemetryError::Sink("closed".into()))
        }
    }

    #[tokio::test]
    async fn test_guard_swallows_errors_panics_and_timeouts() {
        let guard = GuardedTelemetry::new(Arc::new(Broken), Duration::from_millis(20));
        assert!(guard.start_workflow("threat_analysis", &json!({})).await.is_none());
        guard.start_phase("t", "threat_analysis", None).await;
        guard.complete_phase("t", "threat_analysis", &PhaseMetrics::default()).await;
        guard.complete_workflow("t", WorkflowStatus::Failed, &json!({})).await;
        guard.event("t", "x", &json!({}), EventLevel::Info).await;
    }

    #[tokio::test]
    async fn test_tracing_bridge_issues_trace_ids() {
        let guard = GuardedTelemetry::new(Arc::new(TracingTelemetry), Duration::from_secs(1));
        let first = guard.start_workflow("threat_analysis", &json!({})).await.unwrap();
        let second = guard.start_workflow("threat_analysis", &json!({})).await.unwrap();
        assert_ne!(first, second);
        guard
            .complete_phase(&first, "threat_analysis", &PhaseMetrics { error: Some("boom".into()), ..Default::default() })
            .await;
    }

    #[tokio::test]
    async fn test_recording_keeps_order() {
        let recorder = Arc::new(RecordingTelemetry::new());
        let guard = GuardedTelemetry::new(recorder.clone(), Duration::from_secs(1));

        let trace = guard.start_workflow("threat_analysis", &json!({})).await.unwrap();
        guard.start_phase(&trace, "threat_analysis", Some("analysis")).await;
        guard
            .complete_phase(&trace, "threat_analysis", &PhaseMetrics { latency_ms: Some(3), ..Default::default() })
            .await;
        guard.event(&trace, "human_review_requested", &json!({}), EventLevel::Info).await;
        guard.complete_workflow(&trace, WorkflowStatus::Completed, &json!({})).await;

        assert_eq!(recorder.events().await.len(), 5);
        assert_eq!(recorder.completed_phases().await, vec!["threat_analysis".to_string()]);
        assert_eq!(recorder.custom_events().await, vec!["human_review_requested".to_string()]);
    }
}
