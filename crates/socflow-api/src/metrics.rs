//! Prometheus-backed telemetry bridge and the `/metrics` encoder
use async_trait::async_trait;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde_json::Value;
use tracing::debug;

use socflow_core::{EventLevel, PhaseMetrics, TelemetryBridge, TelemetryError, WorkflowStatus};

/// Counts workflows, phases, tokens and events per label
pub struct PrometheusTelemetry {
    registry: Registry,
    workflows_started: IntCounterVec,
    workflows_finished: IntCounterVec,
    workflows_active: IntGauge,
    phase_latency: HistogramVec,
    phase_failures: IntCounterVec,
    tokens: IntCounterVec,
    events: IntCounterVec,
}

impl PrometheusTelemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let workflows_started = IntCounterVec::new(
            Opts::new("socflow_workflows_started_total", "Workflows started"),
            &["workflow_type"],
        )?;
        let workflows_finished = IntCounterVec::new(
            Opts::new("socflow_workflows_finished_total", "Workflows finished by status"),
            &["status"],
        )?;
        let workflows_active = IntGauge::new("socflow_workflows_active", "Workflows currently running")?;
        let phase_latency = HistogramVec::new(
            HistogramOpts::new("socflow_phase_latency_seconds", "Stage latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 120.0]),
            &["phase"],
        )?;
        let phase_failures = IntCounterVec::new(
            Opts::new("socflow_phase_failures_total", "Stages that reported a failure"),
            &["phase"],
        )?;
        let tokens = IntCounterVec::new(
            Opts::new("socflow_tokens_total", "Estimated tokens by phase and direction"),
            &["phase", "direction"],
        )?;
        let events = IntCounterVec::new(
            Opts::new("socflow_events_total", "Custom workflow events"),
            &["name", "level"],
        )?;

        registry.register(Box::new(workflows_started.clone()))?;
        registry.register(Box::new(workflows_finished.clone()))?;
        registry.register(Box::new(workflows_active.clone()))?;
        registry.register(Box::new(phase_latency.clone()))?;
        registry.register(Box::new(phase_failures.clone()))?;
        registry.register(Box::new(tokens.clone()))?;
        registry.register(Box::new(events.clone()))?;

        Ok(Self {
            registry,
            workflows_started,
            workflows_finished,
            workflows_active,
            phase_latency,
            phase_failures,
            tokens,
            events,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        encode(&self.registry)
    }
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

fn level_label(level: EventLevel) -> &'static str {
    match level {
        EventLevel::Debug => "debug",
        EventLevel::Info => "info",
        EventLevel::Warning => "warning",
        EventLevel::Error => "error",
    }
}

#[async_trait]
impl TelemetryBridge for PrometheusTelemetry {
    async fn start_workflow(&self, workflow_type: &str, _metadata: &Value) -> Result<String, TelemetryError> {
        self.workflows_started.with_label_values(&[workflow_type]).inc();
        self.workflows_active.inc();
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn start_phase(&self, trace_id: &str, phase: &str, _agent_type: Option<&str>) -> Result<(), TelemetryError> {
        debug!(trace_id, phase, "phase started");
        Ok(())
    }

    async fn complete_phase(&self, _trace_id: &str, phase: &str, metrics: &PhaseMetrics) -> Result<(), TelemetryError> {
        if let Some(ms) = metrics.latency_ms {
            self.phase_latency.with_label_values(&[phase]).observe(ms as f64 / 1000.0);
        }
        if let Some(input) = metrics.input_tokens {
            self.tokens.with_label_values(&[phase, "input"]).inc_by(input);
        }
        if let Some(output) = metrics.output_tokens {
            self.tokens.with_label_values(&[phase, "output"]).inc_by(output);
        }
        if metrics.error.is_some() {
            self.phase_failures.with_label_values(&[phase]).inc();
        }
        Ok(())
    }

    async fn complete_workflow(
        &self,
        _trace_id: &str,
        status: WorkflowStatus,
        _final_metrics: &Value,
    ) -> Result<(), TelemetryError> {
        self.workflows_finished.with_label_values(&[status.as_str()]).inc();
        self.workflows_active.dec();
        Ok(())
    }

    async fn log_custom_event(
        &self,
        _trace_id: &str,
        name: &str,
        _data: &Value,
        level: EventLevel,
    ) -> Result<(), TelemetryError> {
        self.events.with_label_values(&[name, level_label(level)]).inc();
        Ok(())
    }
}

impl std::fmt::Debug for PrometheusTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusTelemetry")
            .field("workflows_active", &self.workflows_active.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_workflow_lifecycle_counted() {
        let telemetry = PrometheusTelemetry::new().unwrap();
        let trace = telemetry.start_workflow("soc_analysis", &json!({})).await.unwrap();
        telemetry
            .complete_phase(
                &trace,
                "threat_analysis",
                &PhaseMetrics {
                    input_tokens: Some(120),
                    output_tokens: Some(40),
                    latency_ms: Some(250),
                    error: None,
                },
            )
            .await
            .unwrap();
        telemetry.complete_workflow(&trace, WorkflowStatus::Completed, &json!({})).await.unwrap();

        let text = telemetry.encode().unwrap();
        assert!(text.contains("socflow_workflows_started_total{workflow_type=\"soc_analysis\"} 1"));
        assert!(text.contains("socflow_workflows_finished_total{status=\"completed\"} 1"));
        assert!(text.contains("socflow_tokens_total{direction=\"input\",phase=\"threat_analysis\"} 120"));
        assert!(text.contains("socflow_workflows_active 0"));
    }

    #[tokio::test]
    async fn test_failed_phase_counted() {
        let telemetry = PrometheusTelemetry::new().unwrap();
        let metrics = PhaseMetrics {
            error: Some("BACKEND/UNREACHABLE".to_string()),
            ..Default::default()
        };
        telemetry.complete_phase("t", "decision_making", &metrics).await.unwrap();
        assert!(telemetry
            .encode()
            .unwrap()
            .contains("socflow_phase_failures_total{phase=\"decision_making\"} 1"));
    }
}
