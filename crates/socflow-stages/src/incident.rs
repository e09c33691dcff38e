//! Read-only summary of a run used by the reporting stages

use socflow_core::outputs::{PlannedAction, StrategyType};
use socflow_core::{RunState, Severity};

/// Best available severity: verdict, then threat level, then risk, then raw events
pub fn severity(state: &RunState) -> Severity {
    if let Some(classification) = &state.threat_classification {
        return classification.severity;
    }
    state
        .threat_analysis
        .as_ref()
        .map(|t| t.overall_threat_level)
        .or_else(|| state.risk_assessment.as_ref().map(|r| r.level))
        .or_else(|| {
            state
                .alerts
                .iter()
                .map(|a| a.severity)
                .chain(state.incidents.iter().map(|i| i.severity))
                .max()
        })
        .unwrap_or(Severity::Low)
}

pub fn category(state: &RunState) -> String {
    state
        .threat_classification
        .as_ref()
        .map(|c| c.category.clone())
        .filter(|c| !c.is_empty())
        .or_else(|| {
            state
                .threat_analysis
                .as_ref()
                .and_then(|t| t.threats_detected.first())
                .map(|t| t.category.clone())
        })
        .unwrap_or_else(|| "suspicious_activity".to_string())
}

pub fn strategy(state: &RunState) -> Option<StrategyType> {
    state.response_strategy.as_ref().map(|s| s.strategy_type)
}

pub fn strategy_label(state: &RunState) -> &'static str {
    match strategy(state) {
        Some(StrategyType::Monitor) => "monitor",
        Some(StrategyType::Investigate) => "investigate",
        Some(StrategyType::Contain) => "contain",
        Some(StrategyType::Eradicate) => "eradicate",
        Some(StrategyType::Recover) => "recover",
        Some(StrategyType::Escalate) => "escalate",
        None => "undecided",
    }
}

pub fn planned_actions(state: &RunState) -> &[PlannedAction] {
    state
        .response_strategy
        .as_ref()
        .map(|s| s.actions.as_slice())
        .unwrap_or(&[])
}

pub fn percent(score: f64) -> String {
    format!("{}%", (score * 100.0).round() as i64)
}
