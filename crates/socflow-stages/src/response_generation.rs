use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use socflow_core::outputs::{
    AlertNotification, NaturalLanguageResponse, NotificationChannel, Recommendation, Report, ReportSection,
};
use socflow_core::{RunState, RunStateDelta, Severity, Stage, StageError, StageId};

use crate::backend::{annotate, consult, AnalysisBackend, AnalysisTask};
use crate::incident;
use crate::playbooks;
use crate::templates::ResponseRenderer;

/// Where notifications go for a given severity
pub fn channels_for(severity: Severity) -> Vec<(NotificationChannel, &'static str)> {
    match severity {
        Severity::Critical => vec![
            (NotificationChannel::Pager, "soc-oncall"),
            (NotificationChannel::Teams, "soc-alerts"),
        ],
        Severity::High => vec![(NotificationChannel::Teams, "soc-alerts")],
        Severity::Medium | Severity::Low | Severity::Info => {
            vec![(NotificationChannel::Dashboard, "soc-dashboard")]
        }
    }
}

/// Writes the narrative, report, notifications, recommendations and playbooks
pub struct ResponseGenerationStage {
    backend: Arc<dyn AnalysisBackend>,
    renderer: Arc<ResponseRenderer>,
}

impl ResponseGenerationStage {
    pub fn new(backend: Arc<dyn AnalysisBackend>, renderer: Arc<ResponseRenderer>) -> Self {
        Self { backend, renderer }
    }

    fn template_data(&self, state: &RunState, narrative: &NaturalLanguageResponse) -> Value {
        let category = incident::category(state);
        json!({
            "title": format!("Security Incident Report: {}", category),
            "workflow_id": state.workflow_id,
            "severity": incident::severity(state),
            "category": category,
            "confidence": state.overall_confidence(),
            "strategy": incident::strategy_label(state),
            "summary": narrative.summary,
            "threat": state.threat_analysis,
            "risk": state.risk_assessment,
            "correlations": state.correlations.as_ref().filter(|c| !c.is_empty()),
            "actions": incident::planned_actions(state),
            "analyst_response": state.human_input_response,
        })
    }

    fn render(&self, name: &str, data: &Value, fallback: &str, warnings: &mut Vec<String>) -> String {
        match self.renderer.render(name, data) {
            Ok(text) => text,
            Err(e) => {
                warnings.push(format!("{}: {}", self.id(), e));
                fallback.to_string()
            }
        }
    }

    fn report(&self, state: &RunState, narrative: &NaturalLanguageResponse, data: &Value, warnings: &mut Vec<String>) -> Report {
        let mut sections = vec![ReportSection {
            heading: "Executive Summary".to_string(),
            body: narrative.summary.clone(),
        }];
        if let Some(threat) = &state.threat_analysis {
            sections.push(ReportSection {
                heading: "Threat Analysis".to_string(),
                body: threat.summary.clone(),
            });
        }
        if let Some(risk) = &state.risk_assessment {
            sections.push(ReportSection {
                heading: "Risk".to_string(),
                body: format!("Score {}/100 ({}). {}", risk.overall_score, risk.level, risk.business_impact),
            });
        }
        if let Some(strategy) = &state.response_strategy {
            sections.push(ReportSection {
                heading: "Response Plan".to_string(),
                body: strategy.rationale.clone(),
            });
        }
        if !narrative.details.is_empty() {
            sections.push(ReportSection {
                heading: "Details".to_string(),
                body: narrative.details.clone(),
            });
        }

        let title = data["title"].as_str().unwrap_or("Security Incident Report").to_string();
        Report {
            id: format!("rpt-{}", state.workflow_id),
            rendered: self.render("incident_report", data, &narrative.summary, warnings),
            title,
            executive_summary: narrative.summary.clone(),
            sections,
            generated_at: Some(Utc::now()),
        }
    }

    fn notifications(&self, state: &RunState, data: &Value, warnings: &mut Vec<String>) -> Vec<AlertNotification> {
        let severity = incident::severity(state);
        let subject = format!("[{}] {} alert", severity, incident::category(state));
        let summary = data["summary"].as_str().unwrap_or_default().to_string();

        channels_for(severity)
            .into_iter()
            .enumerate()
            .map(|(index, (channel, recipient))| {
                let template = if channel == NotificationChannel::Teams { "teams_message" } else { "notification" };
                AlertNotification {
                    id: format!("ntf-{}", index + 1),
                    channel,
                    recipient: recipient.to_string(),
                    severity,
                    subject: subject.clone(),
                    message: self.render(template, data, &summary, warnings),
                }
            })
            .collect()
    }
}

fn recommendations(state: &RunState) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = Vec::new();
    let risk_level = state.risk_assessment.as_ref().map(|r| r.level).unwrap_or_default();

    let factors = state.risk_assessment.iter().flat_map(|r| r.factors.iter());
    for factor in factors {
        if let Some(mitigation) = &factor.mitigation {
            recommendations.push(Recommendation {
                id: String::new(),
                title: factor.name.replace('_', " "),
                description: mitigation.clone(),
                priority: risk_level,
                automated: false,
            });
        }
    }

    let priority = state.response_strategy.as_ref().map(|s| s.priority).unwrap_or_default();
    for action in incident::planned_actions(state) {
        recommendations.push(Recommendation {
            id: String::new(),
            title: format!("{:?} {}", action.action_type, action.target),
            description: action.description.clone(),
            priority,
            automated: action.automated,
        });
    }

    let mut seen = std::collections::HashSet::new();
    recommendations.retain(|r| seen.insert(r.description.clone()));
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    for (index, recommendation) in recommendations.iter_mut().enumerate() {
        recommendation.id = format!("rec-{}", index + 1);
    }
    recommendations
}

fn fallback_narrative(state: &RunState) -> NaturalLanguageResponse {
    let summary = match &state.threat_analysis {
        Some(threat) if !threat.summary.is_empty() => threat.summary.clone(),
        _ => format!(
            "Automated analysis of {} alert(s) and {} incident(s) classified as {} ({}).",
            state.alerts.len(),
            state.incidents.len(),
            incident::category(state),
            incident::severity(state)
        ),
    };
    NaturalLanguageResponse {
        summary,
        details: String::new(),
        audience: "soc_analyst".to_string(),
    }
}

#[async_trait]
impl Stage for ResponseGenerationStage {
    fn id(&self) -> StageId {
        StageId::ResponseGeneration
    }

    fn agent_type(&self) -> &'static str {
        "response_generator"
    }

    async fn run(&self, state: &RunState) -> Result<RunStateDelta, StageError> {
        let consulted =
            match consult::<NaturalLanguageResponse>(self.backend.as_ref(), self.id(), AnalysisTask::Narrative, state).await {
                Ok(consulted) => consulted,
                Err(failure) => return Ok(failure),
            };

        let mut narrative = consulted.payload.value;
        if consulted.parse_warning.is_some() || narrative.summary.trim().is_empty() {
            narrative = fallback_narrative(state);
        }

        let mut warnings = Vec::new();
        let data = self.template_data(state, &narrative);
        let report = self.report(state, &narrative, &data, &mut warnings);
        let notifications = self.notifications(state, &data, &mut warnings);

        let confidence = state
            .threat_classification
            .as_ref()
            .map(|c| c.confidence)
            .unwrap_or_else(|| state.overall_confidence());

        let delta = RunStateDelta {
            report: Some(report),
            alert_notifications: Some(notifications),
            recommendations: Some(recommendations(state)),
            playbook_suggestions: Some(playbooks::suggest(&incident::category(state), incident::strategy(state))),
            natural_language_response: Some(narrative),
            warnings,
            ..Default::default()
        };
        Ok(annotate(delta, self.id(), confidence, consulted.payload.reasoning, consulted.parse_warning))
    }
}
