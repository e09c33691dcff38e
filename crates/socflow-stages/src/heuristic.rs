//! Deterministic offline backend.
//!
//! Produces well-formed payloads from severity, criticality and indicator
//! overlap, so the full pipeline runs without a model behind it.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use socflow_core::outputs::*;
use socflow_core::{EntityType, Severity};

use crate::backend::{AnalysisBackend, AnalysisContext, AnalysisRequest, AnalysisTask};
use crate::error::BackendError;
use crate::scoring::{categorize, intel_matches, max_event_severity, prioritize, RiskCalculator, RiskInput};

/// Alerts closer than this are temporally correlated
const TEMPORAL_WINDOW_MINUTES: i64 = 15;

#[derive(Debug, Clone, Default)]
pub struct HeuristicBackend {
    calculator: RiskCalculator,
}

impl HeuristicBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calculator(calculator: RiskCalculator) -> Self {
        Self { calculator }
    }

    fn answer(&self, task: AnalysisTask, context: &AnalysisContext) -> Value {
        match task {
            AnalysisTask::ThreatAnalysis => threat_analysis(context),
            AnalysisTask::RiskAssessment => self.risk_assessment(context),
            AnalysisTask::Correlation => correlate(context),
            AnalysisTask::Decision => decide(context),
            AnalysisTask::Narrative => narrate(context),
        }
    }

    fn risk_assessment(&self, context: &AnalysisContext) -> Value {
        let assessment = self.calculator.calculate(&RiskInput::from_context(context));
        let reasoning: Vec<String> = assessment
            .factors
            .iter()
            .map(|f| format!("{} (+{}): {}", f.name, f.impact, f.description))
            .collect();
        json!({
            "assessment": assessment,
            "prioritization": prioritize(context),
            "reasoning": reasoning,
        })
    }
}

#[async_trait]
impl AnalysisBackend for HeuristicBackend {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, BackendError> {
        let context = request.context()?;
        Ok(self.answer(request.task, &context).to_string())
    }
}

fn threat_analysis(context: &AnalysisContext) -> Value {
    let matches = intel_matches(context);
    let mut reasoning = Vec::new();
    let mut threats = Vec::new();

    for alert in context.alerts.iter().filter(|a| a.severity >= Severity::Medium) {
        let category = categorize(&format!("{} {}", alert.title, alert.description), &alert.mitre_techniques);
        let matched: Vec<String> = alert
            .indicators
            .iter()
            .filter(|i| matches.iter().any(|(m, _)| m == *i))
            .cloned()
            .collect();
        let severity = matches
            .iter()
            .filter(|(m, _)| matched.contains(m))
            .map(|(_, level)| *level)
            .fold(alert.severity, Severity::max);
        reasoning.push(format!("alert {} looks like {} ({})", alert.id, category, severity));
        threats.push(DetectedThreat {
            id: format!("threat-{}", alert.id),
            name: alert.title.clone(),
            category: category.to_string(),
            severity,
            related_alert_ids: vec![alert.id.clone()],
            indicators: alert.indicators.clone(),
            description: alert.description.clone(),
        });
    }

    for incident in context.incidents.iter().filter(|i| i.severity >= Severity::Medium) {
        let category = categorize(&format!("{} {}", incident.title, incident.description), &[]);
        reasoning.push(format!("incident {} looks like {}", incident.id, category));
        threats.push(DetectedThreat {
            id: format!("threat-{}", incident.id),
            name: incident.title.clone(),
            category: category.to_string(),
            severity: incident.severity,
            related_alert_ids: incident.alert_ids.clone(),
            indicators: Vec::new(),
            description: incident.description.clone(),
        });
    }

    if !matches.is_empty() {
        reasoning.push(format!("{} indicator(s) matched threat intelligence", matches.len()));
    }

    let overall = threats
        .iter()
        .map(|t| t.severity)
        .chain(max_event_severity(context))
        .max()
        .unwrap_or(Severity::Info);
    let techniques: BTreeSet<String> = context
        .alerts
        .iter()
        .flat_map(|a| a.mitre_techniques.iter().cloned())
        .chain(context.threat_intelligence.iter().flat_map(|t| t.mitre_techniques.iter().cloned()))
        .collect();
    let vectors: BTreeSet<String> = threats.iter().map(|t| t.category.clone()).collect();

    let events = context.alerts.len() + context.incidents.len();
    let mut confidence = 0.5 + 0.1 * events.min(3) as f64;
    if !matches.is_empty() {
        confidence += 0.1;
    }

    let analysis = ThreatAnalysis {
        summary: format!(
            "{} threat(s) detected across {} event(s); overall level {}",
            threats.len(),
            events,
            overall
        ),
        threats_detected: threats,
        overall_threat_level: overall,
        attack_vectors: vectors.into_iter().collect(),
        mitre_techniques: techniques.into_iter().collect(),
        confidence: confidence.min(0.95),
    };

    let mut payload = json!(analysis);
    payload["reasoning"] = json!(reasoning);
    payload
}

fn correlate(context: &AnalysisContext) -> Value {
    let mut correlations: Vec<CorrelationResult> = Vec::new();
    let mut push = |kind: CorrelationType, ids: Vec<String>, strength: f64, description: String| {
        correlations.push(CorrelationResult {
            id: format!("corr-{}", correlations.len() + 1),
            correlation_type: kind,
            related_ids: ids,
            strength,
            description,
        });
    };

    for (i, a) in context.alerts.iter().enumerate() {
        for b in context.alerts.iter().skip(i + 1) {
            let pair = vec![a.id.clone(), b.id.clone()];
            if let Some(shared) = first_shared(&a.entity_ids, &b.entity_ids) {
                push(CorrelationType::SharedEntity, pair.clone(), 0.8, format!("both involve entity {}", shared));
            }
            if let Some(shared) = first_shared(&a.indicators, &b.indicators) {
                push(CorrelationType::SharedIndicator, pair.clone(), 0.9, format!("both observed indicator {}", shared));
            }
            if let Some(shared) = first_shared(&a.mitre_techniques, &b.mitre_techniques) {
                push(CorrelationType::SharedTechnique, pair.clone(), 0.6, format!("both map to {}", shared));
            }
            if (a.timestamp - b.timestamp).abs() <= Duration::minutes(TEMPORAL_WINDOW_MINUTES) {
                push(
                    CorrelationType::Temporal,
                    pair,
                    0.4,
                    format!("within {} minutes of each other", TEMPORAL_WINDOW_MINUTES),
                );
            }
        }
    }

    for incident in &context.incidents {
        let linked: Vec<String> = context
            .alerts
            .iter()
            .filter(|a| incident.alert_ids.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();
        if !linked.is_empty() {
            let mut ids = vec![incident.id.clone()];
            ids.extend(linked);
            push(CorrelationType::IncidentLink, ids, 0.95, format!("alerts attached to incident {}", incident.id));
        }
    }

    for (indicator, level) in intel_matches(context) {
        let ids: Vec<String> = context
            .alerts
            .iter()
            .filter(|a| a.indicators.contains(&indicator))
            .map(|a| a.id.clone())
            .chain(
                context
                    .threat_intelligence
                    .iter()
                    .filter(|intel| intel.indicator == indicator)
                    .map(|intel| intel.id.clone()),
            )
            .collect();
        push(CorrelationType::SharedIndicator, ids, 0.85, format!("indicator {} is known {} intel", indicator, level));
    }

    let reasoning: Vec<String> = correlations
        .iter()
        .map(|c| format!("{}: {}", c.related_ids.join(" <-> "), c.description))
        .collect();
    json!({
        "confidence": (0.5 + 0.08 * correlations.len().min(5) as f64),
        "correlations": correlations,
        "reasoning": reasoning,
    })
}

fn first_shared(a: &[String], b: &[String]) -> Option<String> {
    a.iter().find(|x| b.contains(x)).cloned()
}

fn decide(context: &AnalysisContext) -> Value {
    let threat_level = context
        .threat_analysis
        .as_ref()
        .map(|t| t.overall_threat_level)
        .unwrap_or(Severity::Info);
    let risk_level = context
        .risk_assessment
        .as_ref()
        .map(|r| r.level)
        .unwrap_or(Severity::Info);
    let severity = threat_level.max(risk_level).max(max_event_severity(context).unwrap_or(Severity::Info));
    let category = context
        .threat_analysis
        .as_ref()
        .and_then(|t| t.threats_detected.first())
        .map(|t| t.category.clone())
        .unwrap_or_else(|| "suspicious_activity".to_string());
    let detected = context
        .threat_analysis
        .as_ref()
        .is_some_and(|t| !t.threats_detected.is_empty());
    let risky = context.risk_assessment.as_ref().is_some_and(|r| r.overall_score > 30);
    let critical_assets: Vec<&str> = context
        .entities
        .iter()
        .filter(|e| e.criticality >= Severity::High)
        .map(|e| e.name.as_str())
        .collect();

    let strategy_type = match severity {
        Severity::Critical | Severity::High if detected || risky => StrategyType::Contain,
        Severity::Critical | Severity::High | Severity::Medium => StrategyType::Investigate,
        Severity::Low | Severity::Info => StrategyType::Monitor,
    };
    let actions = plan_actions(context, strategy_type);
    let action_count = actions.len();

    let should_escalate = severity == Severity::Critical && (!critical_assets.is_empty() || context.incidents.len() > 1);
    let escalation = EscalationDecision {
        should_escalate,
        target: if should_escalate { "incident-response-lead".into() } else { String::new() },
        reason: if should_escalate {
            format!("critical {} touching critical assets or multiple incidents", category)
        } else {
            String::new()
        },
        urgency: severity,
    };

    let (analysts, hours, sla) = match severity {
        Severity::Critical => (4, 16.0, 15),
        Severity::High => (2, 8.0, 60),
        Severity::Medium => (1, 4.0, 240),
        Severity::Low => (1, 1.0, 1440),
        Severity::Info => (1, 0.5, 2880),
    };
    let mut teams = vec!["soc-tier-1".to_string()];
    if severity >= Severity::High {
        teams.push("incident-response".to_string());
    }

    let upstream: Vec<f64> = context
        .threat_analysis
        .iter()
        .map(|t| t.confidence)
        .chain(context.risk_assessment.iter().map(|r| r.confidence))
        .collect();
    let confidence = if upstream.is_empty() {
        0.5
    } else {
        upstream.iter().sum::<f64>() / upstream.len() as f64
    };

    json!({
        "classification": ThreatClassification {
            category: category.clone(),
            severity,
            is_true_positive: detected || risky,
            confidence,
        },
        "strategy": ResponseStrategy {
            strategy_type,
            priority: severity,
            rationale: format!("{} severity {} calls for {:?}", severity, category, strategy_type).to_lowercase(),
            actions,
        },
        "allocation": ResourceAllocation {
            analysts_required: analysts,
            estimated_effort_hours: hours,
            teams,
            sla_minutes: sla,
        },
        "escalation": escalation,
        "confidence": confidence,
        "reasoning": [
            format!("threat level {}, risk level {}", threat_level, risk_level),
            format!("strategy {:?} with {} planned action(s)", strategy_type, action_count),
        ],
    })
}

fn plan_actions(context: &AnalysisContext, strategy: StrategyType) -> Vec<PlannedAction> {
    let mut actions = Vec::new();
    let mut add = |action_type: ActionType, target: &str, description: String, automated: bool| {
        actions.push(PlannedAction {
            id: format!("act-{}", actions.len() + 1),
            action_type,
            target: target.to_string(),
            description,
            automated,
        });
    };

    match strategy {
        StrategyType::Contain | StrategyType::Eradicate => {
            for entity in &context.entities {
                match entity.entity_type {
                    EntityType::Host => add(
                        ActionType::IsolateHost,
                        &entity.name,
                        format!("Isolate host {} from the network", entity.name),
                        entity.criticality < Severity::Critical,
                    ),
                    EntityType::User => add(
                        ActionType::DisableAccount,
                        &entity.name,
                        format!("Disable account {}", entity.name),
                        false,
                    ),
                    _ => {}
                }
            }
            let indicators: BTreeSet<&String> = context.alerts.iter().flat_map(|a| a.indicators.iter()).collect();
            for indicator in indicators {
                add(
                    ActionType::BlockIndicator,
                    indicator.as_str(),
                    format!("Block indicator {}", indicator),
                    true,
                );
            }
            add(ActionType::CollectForensics, "affected-hosts", "Collect forensic images".to_string(), true);
            add(ActionType::Notify, "soc", "Notify the SOC on-call".to_string(), true);
        }
        StrategyType::Investigate | StrategyType::Escalate => {
            add(ActionType::CollectForensics, "affected-hosts", "Collect triage evidence".to_string(), true);
            add(ActionType::CreateTicket, "soc-queue", "Open an investigation ticket".to_string(), true);
        }
        StrategyType::Monitor | StrategyType::Recover => {}
    }
    actions
}

fn narrate(context: &AnalysisContext) -> Value {
    let classification = context.threat_classification.clone().unwrap_or_default();
    let events = context.alerts.len() + context.incidents.len();
    let mut details = Vec::new();
    if let Some(analysis) = &context.threat_analysis {
        details.push(analysis.summary.clone());
    }
    if let Some(risk) = &context.risk_assessment {
        details.push(format!("Risk score {} ({}): {}", risk.overall_score, risk.level, risk.business_impact));
    }
    if let Some(correlations) = &context.correlations {
        details.push(format!("{} correlation(s) found between events", correlations.len()));
    }
    if let Some(response) = &context.human_input_response {
        details.push(format!("Analyst guidance: {}", response));
    }

    json!(NaturalLanguageResponse {
        summary: format!(
            "{} {} activity across {} event(s); {}",
            classification.severity,
            classification.category.replace('_', " "),
            events,
            if classification.is_true_positive { "likely true positive" } else { "unconfirmed" }
        ),
        details: details.join("\n"),
        audience: "soc_analyst".to_string(),
    })
}
