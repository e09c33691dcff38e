//! Data Model: security telemetry handed to a workflow by its caller
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Severity or threat level shared by alerts, incidents, intel and verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info = 0,
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    /// Weight used when scoring (0-100 scale contributions)
    pub fn weight(&self) -> u32 {
        match self {
            Severity::Info => 0,
            Severity::Low => 10,
            Severity::Medium => 30,
            Severity::High => 60,
            Severity::Critical => 85,
        }
    }

    /// Severity band for a 0-100 score
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=5 => Severity::Info,
            6..=30 => Severity::Low,
            31..=60 => Severity::Medium,
            61..=80 => Severity::High,
            _ => Severity::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Kind of analysis the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    ThreatAnalysis,
    IncidentInvestigation,
    RiskAssessment,
    CorrelationAnalysis,
    Prediction,
    ThreatHunting,
    #[default]
    GeneralAnalysis,
    AutomatedResponse,
    PlaybookExecution,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ThreatAnalysis => "threat_analysis",
            RequestType::IncidentInvestigation => "incident_investigation",
            RequestType::RiskAssessment => "risk_assessment",
            RequestType::CorrelationAnalysis => "correlation_analysis",
            RequestType::Prediction => "prediction",
            RequestType::ThreatHunting => "threat_hunting",
            RequestType::GeneralAnalysis => "general_analysis",
            RequestType::AutomatedResponse => "automated_response",
            RequestType::PlaybookExecution => "playbook_execution",
        }
    }

    pub fn wants_threat_analysis(&self) -> bool {
        !matches!(self, RequestType::RiskAssessment)
    }

    pub fn wants_risk_assessment(&self) -> bool {
        !matches!(self, RequestType::CorrelationAnalysis | RequestType::ThreatHunting)
    }

    pub fn wants_correlation(&self) -> bool {
        !matches!(self, RequestType::RiskAssessment | RequestType::Prediction)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub status: AlertStatus,
    pub timestamp: DateTime<Utc>,
    /// Indicators of compromise observed with the alert (IPs, hashes, domains)
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub mitre_techniques: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[default]
    Open,
    Investigating,
    Contained,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub alert_ids: Vec<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Host,
    User,
    IpAddress,
    Domain,
    Process,
    File,
    Application,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub entity_type: EntityType,
    /// Business criticality of the asset
    #[serde(default)]
    pub criticality: Severity,
    /// Current risk score, 0-100
    #[serde(default)]
    pub risk_score: u32,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIntelligence {
    pub id: String,
    /// Indicator value (IP, domain, hash, ...)
    pub indicator: String,
    #[serde(default)]
    pub indicator_type: String,
    pub threat_level: Severity,
    #[serde(default)]
    pub source: String,
    /// Feed confidence, 0.0-1.0
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mitre_techniques: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// What a caller supplies to start a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowRequest {
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub threat_intelligence: Vec<ThreatIntelligence>,
}

impl WorkflowRequest {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>, request_type: RequestType) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            request_type,
            ..Default::default()
        }
    }

    pub fn with_alerts(mut self, alerts: Vec<Alert>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_incidents(mut self, incidents: Vec<Incident>) -> Self {
        self.incidents = incidents;
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_threat_intelligence(mut self, intel: Vec<ThreatIntelligence>) -> Self {
        self.threat_intelligence = intel;
        self
    }
}

impl Alert {
    /// Minimal open alert, timestamped now
    pub fn new(id: impl Into<String>, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            severity,
            source: String::new(),
            status: AlertStatus::Open,
            timestamp: Utc::now(),
            indicators: Vec::new(),
            entity_ids: Vec::new(),
            mitre_techniques: Vec::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_indicators(mut self, indicators: Vec<String>) -> Self {
        self.indicators = indicators;
        self
    }

    pub fn with_entities(mut self, entity_ids: Vec<String>) -> Self {
        self.entity_ids = entity_ids;
        self
    }

    pub fn with_techniques(mut self, techniques: Vec<String>) -> Self {
        self.mitre_techniques = techniques;
        self
    }
}

impl Incident {
    pub fn new(id: impl Into<String>, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            severity,
            status: IncidentStatus::Open,
            created_at: Utc::now(),
            updated_at: None,
            alert_ids: Vec::new(),
            assignee: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_alerts(mut self, alert_ids: Vec<String>) -> Self {
        self.alert_ids = alert_ids;
        self
    }
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type,
            criticality: Severity::Low,
            risk_score: 0,
            last_seen: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_criticality(mut self, criticality: Severity) -> Self {
        self.criticality = criticality;
        self
    }
}

impl ThreatIntelligence {
    pub fn new(id: impl Into<String>, indicator: impl Into<String>, threat_level: Severity) -> Self {
        Self {
            id: id.into(),
            indicator: indicator.into(),
            indicator_type: String::new(),
            threat_level,
            source: String::new(),
            confidence: 0.5,
            first_seen: None,
            last_seen: None,
            mitre_techniques: Vec::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Info < Severity::Low);
        assert_eq!(Severity::from_score(90), Severity::Critical);
        assert_eq!(Severity::from_score(45), Severity::Medium);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: WorkflowRequest = serde_json::from_value(serde_json::json!({
            "user_id": "analyst-1",
            "session_id": "s-1",
            "alerts": [{
                "id": "a-1",
                "title": "Suspicious login",
                "severity": "high",
                "timestamp": "2026-01-01T00:00:00Z"
            }]
        }))
        .unwrap();

        assert_eq!(request.request_type, RequestType::GeneralAnalysis);
        assert_eq!(request.alerts.len(), 1);
        assert_eq!(request.alerts[0].status, AlertStatus::Open);
        assert!(request.incidents.is_empty());
    }

    #[test]
    fn test_request_type_relevance() {
        assert!(RequestType::ThreatAnalysis.wants_risk_assessment());
        assert!(!RequestType::RiskAssessment.wants_threat_analysis());
        assert!(!RequestType::ThreatHunting.wants_risk_assessment());
    }
}
