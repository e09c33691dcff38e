//! Risk scoring and threat categorization used by the heuristic backend.
//!
//! Risk is additive: each factor contributes an impact, the sum is capped at
//! 100 and banded into a severity level.

use std::collections::BTreeSet;

use socflow_core::outputs::{PrioritizedItem, RiskAssessment, RiskFactor, RiskPrioritization};
use socflow_core::Severity;

use crate::backend::AnalysisContext;

/// Keyword table: first category whose keyword appears wins
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("ransomware", &["ransom", "encrypt", "t1486"]),
    ("data_exfiltration", &["exfil", "data transfer", "upload", "t1041", "t1048"]),
    ("lateral_movement", &["lateral", "psexec", "rdp", "smb", "t1021"]),
    ("credential_compromise", &["brute", "password", "credential", "login", "mfa", "t1110", "t1078"]),
    ("phishing", &["phish", "email", "attachment", "t1566"]),
    ("command_and_control", &["beacon", "c2", "command and control", "t1071"]),
    ("malware", &["malware", "trojan", "virus", "payload", "t1204"]),
    ("denial_of_service", &["ddos", "denial of service", "flood", "t1498"]),
];

/// Category for free text plus technique ids; `suspicious_activity` when nothing matches
pub fn categorize(text: &str, techniques: &[String]) -> &'static str {
    let haystack = format!("{} {}", text, techniques.join(" ")).to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("suspicious_activity")
}

/// Threat-intel indicators that show up on any alert
pub fn intel_matches(context: &AnalysisContext) -> Vec<(String, Severity)> {
    let observed: BTreeSet<&str> = context
        .alerts
        .iter()
        .flat_map(|a| a.indicators.iter().map(String::as_str))
        .collect();
    context
        .threat_intelligence
        .iter()
        .filter(|intel| observed.contains(intel.indicator.as_str()))
        .map(|intel| (intel.indicator.clone(), intel.threat_level))
        .collect()
}

/// Highest severity across alerts and incidents
pub fn max_event_severity(context: &AnalysisContext) -> Option<Severity> {
    context
        .alerts
        .iter()
        .map(|a| a.severity)
        .chain(context.incidents.iter().map(|i| i.severity))
        .max()
}

// ============================================================================
// RISK
// ============================================================================

/// Inputs the calculator scores
#[derive(Debug, Clone, Default)]
pub struct RiskInput {
    pub max_severity: Option<Severity>,
    pub event_count: usize,
    pub critical_assets: Vec<String>,
    pub affected_assets: Vec<String>,
    pub intel_matches: usize,
    pub technique_count: usize,
    pub threat_level: Option<Severity>,
}

impl RiskInput {
    pub fn from_context(context: &AnalysisContext) -> Self {
        let techniques: BTreeSet<&String> = context
            .alerts
            .iter()
            .flat_map(|a| a.mitre_techniques.iter())
            .collect();
        Self {
            max_severity: max_event_severity(context),
            event_count: context.alerts.len() + context.incidents.len(),
            critical_assets: context
                .entities
                .iter()
                .filter(|e| e.criticality >= Severity::High)
                .map(|e| e.name.clone())
                .collect(),
            affected_assets: context.entities.iter().map(|e| e.name.clone()).collect(),
            intel_matches: intel_matches(context).len(),
            technique_count: techniques.len(),
            threat_level: context.threat_analysis.as_ref().map(|t| t.overall_threat_level),
        }
    }
}

/// Risk calculator with configurable weights
#[derive(Debug, Clone)]
pub struct RiskCalculator {
    /// Event volume thresholds and impacts
    pub volume_thresholds: Vec<(usize, u32)>,
    pub critical_asset_penalty: u32,
    pub intel_match_penalty: u32,
    pub technique_penalty: u32,
    pub active_threat_penalty: u32,
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self {
            volume_thresholds: vec![
                (2, 5),   // 2+ events: +5
                (5, 10),  // 5+ events: +10
                (10, 20), // 10+ events: +20
            ],
            critical_asset_penalty: 20,
            intel_match_penalty: 15,
            technique_penalty: 10,
            active_threat_penalty: 15,
        }
    }
}

impl RiskCalculator {
    pub fn severity_impact(severity: Severity) -> u32 {
        match severity {
            Severity::Info => 0,
            Severity::Low => 5,
            Severity::Medium => 15,
            Severity::High => 30,
            Severity::Critical => 40,
        }
    }

    pub fn calculate(&self, input: &RiskInput) -> RiskAssessment {
        let mut factors = Vec::new();

        if let Some(severity) = input.max_severity {
            let impact = Self::severity_impact(severity);
            if impact > 0 {
                factors.push(factor(
                    "event_severity",
                    impact,
                    format!("Highest event severity is {}", severity),
                    None,
                ));
            }
        }

        for &(threshold, impact) in &self.volume_thresholds {
            if input.event_count >= threshold {
                factors.retain(|f| f.name != "event_volume");
                factors.push(factor(
                    "event_volume",
                    impact,
                    format!("{} related security events", input.event_count),
                    Some("Triage related events together"),
                ));
            }
        }

        if !input.critical_assets.is_empty() {
            factors.push(factor(
                "critical_assets",
                self.critical_asset_penalty,
                format!("Critical assets involved: {}", input.critical_assets.join(", ")),
                Some("Prioritize containment on critical assets"),
            ));
        }

        if input.intel_matches > 0 {
            factors.push(factor(
                "threat_intel_match",
                self.intel_match_penalty,
                format!("{} indicator(s) match threat intelligence", input.intel_matches),
                Some("Block matched indicators at the perimeter"),
            ));
        }

        if input.technique_count > 0 {
            factors.push(factor(
                "known_techniques",
                self.technique_penalty,
                format!("{} MITRE ATT&CK technique(s) observed", input.technique_count),
                Some("Review detections for the observed techniques"),
            ));
        }

        if matches!(input.threat_level, Some(Severity::High | Severity::Critical)) {
            factors.push(factor(
                "active_threat",
                self.active_threat_penalty,
                "Threat analysis reports an active high-severity threat",
                Some("Start incident response"),
            ));
        }

        let score: u32 = factors.iter().map(|f| f.impact).sum::<u32>().min(100);
        let level = Severity::from_score(score).max(Severity::Low);
        let business_impact = explain(&factors, level);

        RiskAssessment {
            overall_score: score,
            level,
            confidence: (0.6 + 0.05 * factors.len() as f64).min(0.9),
            factors,
            affected_assets: input.affected_assets.clone(),
            business_impact,
            likelihood: score as f64 / 100.0,
        }
    }
}

fn factor(name: &str, impact: u32, description: impl Into<String>, mitigation: Option<&str>) -> RiskFactor {
    RiskFactor {
        name: name.to_string(),
        impact,
        description: description.into(),
        mitigation: mitigation.map(str::to_string),
    }
}

fn explain(factors: &[RiskFactor], level: Severity) -> String {
    let level_desc = match level {
        Severity::Info | Severity::Low => "Low business risk - monitor",
        Severity::Medium => "Moderate business risk - investigate",
        Severity::High => "High business risk - respond promptly",
        Severity::Critical => "Critical business risk - immediate response required",
    };

    if factors.is_empty() {
        level_desc.to_string()
    } else {
        let names: Vec<&str> = factors.iter().take(3).map(|f| f.name.as_str()).collect();
        format!("{}. Key factors: {}", level_desc, names.join(", "))
    }
}

/// Rank alerts, incidents and entities by urgency
pub fn prioritize(context: &AnalysisContext) -> RiskPrioritization {
    let mut items: Vec<PrioritizedItem> = Vec::new();

    for alert in &context.alerts {
        items.push(item(&alert.id, "alert", alert.severity.weight(), format!("{} alert", alert.severity)));
    }
    for incident in &context.incidents {
        // Incidents outrank alerts of the same severity.
        items.push(item(
            &incident.id,
            "incident",
            (incident.severity.weight() + 10).min(100),
            format!("{} incident", incident.severity),
        ));
    }
    for entity in &context.entities {
        let score = ((entity.criticality.weight() + entity.risk_score) / 2).min(100);
        items.push(item(
            &entity.id,
            "entity",
            score,
            format!("{} criticality, risk score {}", entity.criticality, entity.risk_score),
        ));
    }

    items.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.item_id.cmp(&b.item_id)));
    for (rank, entry) in items.iter_mut().enumerate() {
        entry.priority = rank as u32 + 1;
    }
    RiskPrioritization { ranked: items }
}

fn item(id: &str, kind: &str, score: u32, rationale: String) -> PrioritizedItem {
    PrioritizedItem {
        item_id: id.to_string(),
        item_kind: kind.to_string(),
        priority: 0,
        score,
        rationale,
    }
}
