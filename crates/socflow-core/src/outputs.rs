//! Stage outputs accumulated on the run state.
//!
//! Every type here tolerates missing fields when deserialized, so that a
//! partially well-formed analysis payload still yields a usable value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_model::Severity;
use crate::phase::StageId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetectedThreat {
    pub id: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    pub related_alert_ids: Vec<String>,
    pub indicators: Vec<String>,
    pub description: String,
}

/// Default when the payload cannot be parsed: no threats, confidence 0.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ThreatAnalysis {
    pub threats_detected: Vec<DetectedThreat>,
    pub overall_threat_level: Severity,
    pub attack_vectors: Vec<String>,
    pub mitre_techniques: Vec<String>,
    pub summary: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RiskFactor {
    pub name: String,
    /// Contribution to the overall score (0-100)
    pub impact: u32,
    pub description: String,
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RiskAssessment {
    /// Overall risk score (0-100)
    pub overall_score: u32,
    pub level: Severity,
    pub factors: Vec<RiskFactor>,
    pub affected_assets: Vec<String>,
    pub business_impact: String,
    /// Probability the threat materializes, 0.0-1.0
    pub likelihood: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrioritizedItem {
    pub item_id: String,
    /// "alert" | "incident" | "entity"
    pub item_kind: String,
    /// 1 is the most urgent
    pub priority: u32,
    pub score: u32,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RiskPrioritization {
    pub ranked: Vec<PrioritizedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationType {
    #[default]
    Temporal,
    SharedEntity,
    SharedIndicator,
    SharedTechnique,
    IncidentLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorrelationResult {
    pub id: String,
    pub correlation_type: CorrelationType,
    pub related_ids: Vec<String>,
    /// 0.0-1.0
    pub strength: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ThreatClassification {
    pub category: String,
    pub severity: Severity,
    pub is_true_positive: bool,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    #[default]
    Monitor,
    Investigate,
    Contain,
    Eradicate,
    Recover,
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    IsolateHost,
    BlockIndicator,
    DisableAccount,
    ResetCredentials,
    QuarantineFile,
    CollectForensics,
    #[default]
    Notify,
    CreateTicket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannedAction {
    pub id: String,
    pub action_type: ActionType,
    pub target: String,
    pub description: String,
    /// Safe to run without an operator
    pub automated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResponseStrategy {
    pub strategy_type: StrategyType,
    pub priority: Severity,
    pub actions: Vec<PlannedAction>,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResourceAllocation {
    pub analysts_required: u32,
    pub estimated_effort_hours: f64,
    pub teams: Vec<String>,
    /// Time to first response
    pub sla_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EscalationDecision {
    pub should_escalate: bool,
    /// Team or tier to escalate to
    pub target: String,
    pub reason: String,
    pub urgency: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NaturalLanguageResponse {
    pub summary: String,
    pub details: String,
    pub audience: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub executive_summary: String,
    pub sections: Vec<ReportSection>,
    /// Rendered markdown document
    pub rendered: String,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[default]
    Dashboard,
    Email,
    Teams,
    Slack,
    Pager,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AlertNotification {
    pub id: String,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub severity: Severity,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Severity,
    pub automated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlaybookSuggestion {
    pub playbook_id: String,
    pub name: String,
    /// 0.0-1.0
    pub relevance: f64,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    #[default]
    Skipped,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutionResult {
    pub action_id: String,
    pub action_type: ActionType,
    pub target: String,
    pub status: ExecutionStatus,
    pub message: String,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Named stage output slots on the run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    ThreatAnalysis,
    RiskAssessment,
    RiskPrioritization,
    Correlations,
    ThreatClassification,
    ResponseStrategy,
    ResourceAllocation,
    EscalationDecision,
    NaturalLanguageResponse,
    Report,
    AlertNotifications,
    Recommendations,
    PlaybookSuggestions,
    ExecutionResults,
    LearningInsights,
}

impl OutputField {
    pub const ALL: [OutputField; 15] = [
        OutputField::ThreatAnalysis,
        OutputField::RiskAssessment,
        OutputField::RiskPrioritization,
        OutputField::Correlations,
        OutputField::ThreatClassification,
        OutputField::ResponseStrategy,
        OutputField::ResourceAllocation,
        OutputField::EscalationDecision,
        OutputField::NaturalLanguageResponse,
        OutputField::Report,
        OutputField::AlertNotifications,
        OutputField::Recommendations,
        OutputField::PlaybookSuggestions,
        OutputField::ExecutionResults,
        OutputField::LearningInsights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputField::ThreatAnalysis => "threat_analysis",
            OutputField::RiskAssessment => "risk_assessment",
            OutputField::RiskPrioritization => "risk_prioritization",
            OutputField::Correlations => "correlations",
            OutputField::ThreatClassification => "threat_classification",
            OutputField::ResponseStrategy => "response_strategy",
            OutputField::ResourceAllocation => "resource_allocation",
            OutputField::EscalationDecision => "escalation_decision",
            OutputField::NaturalLanguageResponse => "natural_language_response",
            OutputField::Report => "report",
            OutputField::AlertNotifications => "alert_notifications",
            OutputField::Recommendations => "recommendations",
            OutputField::PlaybookSuggestions => "playbook_suggestions",
            OutputField::ExecutionResults => "execution_results",
            OutputField::LearningInsights => "learning_insights",
        }
    }

    /// The only stage allowed to write this field
    pub fn owner(&self) -> StageId {
        match self {
            OutputField::ThreatAnalysis => StageId::ThreatAnalysis,
            OutputField::RiskAssessment | OutputField::RiskPrioritization => StageId::RiskAssessment,
            OutputField::Correlations => StageId::CorrelationAnalysis,
            OutputField::ThreatClassification
            | OutputField::ResponseStrategy
            | OutputField::ResourceAllocation
            | OutputField::EscalationDecision => StageId::DecisionMaking,
            OutputField::NaturalLanguageResponse
            | OutputField::Report
            | OutputField::AlertNotifications
            | OutputField::Recommendations
            | OutputField::PlaybookSuggestions => StageId::ResponseGeneration,
            OutputField::ExecutionResults => StageId::ActionExecution,
            OutputField::LearningInsights => StageId::Learning,
        }
    }
}

impl std::fmt::Display for OutputField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
