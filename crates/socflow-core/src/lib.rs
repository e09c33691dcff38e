//! socflow core: stage contract, run state, router and orchestrator
//!
//! A workflow is a single `RunState` threaded through a sequence of stages.
//! Each stage returns a partial update; the router picks the next stage from
//! the merged state; the orchestrator drives the loop and reports to a
//! best-effort telemetry bridge.

pub mod config;
pub mod data_model;
pub mod error;
pub mod orchestrator;
pub mod outputs;
pub mod phase;
pub mod registry;
pub mod router;
pub mod stage;
pub mod state;
pub mod telemetry;

pub use config::{EngineConfig, RetryMode};
pub use data_model::{
    Alert, AlertStatus, Entity, EntityType, Incident, IncidentStatus, RequestType, Severity,
    ThreatIntelligence, WorkflowRequest,
};
pub use error::{RoutingError, SocflowError, StageError, TelemetryError};
pub use orchestrator::Orchestrator;
pub use outputs::OutputField;
pub use phase::{StageId, WorkflowPhase};
pub use registry::StageRegistry;
pub use router::{Route, Router, RoutingPolicy};
pub use stage::Stage;
pub use state::{RunState, RunStateDelta, StageRecord};
pub use telemetry::{
    EventLevel, GuardedTelemetry, NoopTelemetry, PhaseMetrics, RecordingTelemetry, TelemetryBridge,
    TelemetryEvent, TracingTelemetry, WorkflowStatus,
};

/// Engine version
pub const SOCFLOW_VERSION: &str = "1.0.0";
