//! Built-in response playbook catalog, keyed by threat category

use socflow_core::outputs::{PlaybookSuggestion, StrategyType};

#[derive(Debug, Clone, Copy)]
pub struct Playbook {
    pub id: &'static str,
    pub name: &'static str,
    pub categories: &'static [&'static str],
    pub steps: &'static [&'static str],
}

pub const CATALOG: &[Playbook] = &[
    Playbook {
        id: "PB-RANSOM-01",
        name: "Ransomware containment",
        categories: &["ransomware"],
        steps: &[
            "Isolate affected hosts from the network",
            "Disable shared drive access for affected accounts",
            "Identify the encryption process and preserve a sample",
            "Check backup integrity before restoration",
        ],
    },
    Playbook {
        id: "PB-EXFIL-01",
        name: "Data exfiltration response",
        categories: &["data_exfiltration"],
        steps: &[
            "Block destination indicators at the egress proxy",
            "Identify data sets accessed by the source account",
            "Engage legal and privacy for notification review",
        ],
    },
    Playbook {
        id: "PB-CRED-01",
        name: "Compromised credentials",
        categories: &["credential_compromise"],
        steps: &[
            "Reset credentials and revoke active sessions",
            "Enforce MFA re-registration",
            "Review sign-in logs for the past 30 days",
        ],
    },
    Playbook {
        id: "PB-LATERAL-01",
        name: "Lateral movement hunt",
        categories: &["lateral_movement", "command_and_control"],
        steps: &[
            "Map remote sessions originating from the source host",
            "Block C2 indicators at the perimeter",
            "Hunt for the same technique across the fleet",
        ],
    },
    Playbook {
        id: "PB-PHISH-01",
        name: "Phishing triage",
        categories: &["phishing"],
        steps: &[
            "Purge the message from all mailboxes",
            "Block sender and embedded URLs",
            "Identify recipients who interacted with the message",
        ],
    },
    Playbook {
        id: "PB-MALWARE-01",
        name: "Malware eradication",
        categories: &["malware"],
        steps: &[
            "Quarantine the detected file",
            "Run a full endpoint scan",
            "Reimage the host if persistence is found",
        ],
    },
    Playbook {
        id: "PB-DOS-01",
        name: "Denial of service mitigation",
        categories: &["denial_of_service"],
        steps: &[
            "Enable upstream traffic scrubbing",
            "Rate-limit the affected endpoints",
        ],
    },
    Playbook {
        id: "PB-TRIAGE-01",
        name: "General alert triage",
        categories: &[],
        steps: &[
            "Validate the alert against recent baseline activity",
            "Enrich indicators with threat intelligence",
            "Document findings in the case ticket",
        ],
    },
];

/// Playbooks for `category`, most relevant first.
///
/// The general triage playbook is always last, so the list is never empty.
pub fn suggest(category: &str, strategy: Option<StrategyType>) -> Vec<PlaybookSuggestion> {
    let containing = matches!(
        strategy,
        Some(StrategyType::Contain | StrategyType::Eradicate | StrategyType::Escalate)
    );

    let mut suggestions: Vec<PlaybookSuggestion> = CATALOG
        .iter()
        .filter(|p| p.categories.contains(&category))
        .map(|p| suggestion(p, if containing { 0.95 } else { 0.85 }))
        .collect();

    if let Some(general) = CATALOG.iter().find(|p| p.categories.is_empty()) {
        let relevance = if suggestions.is_empty() { 0.6 } else { 0.3 };
        suggestions.push(suggestion(general, relevance));
    }
    suggestions
}

fn suggestion(playbook: &Playbook, relevance: f64) -> PlaybookSuggestion {
    PlaybookSuggestion {
        playbook_id: playbook.id.to_string(),
        name: playbook.name.to_string(),
        relevance,
        steps: playbook.steps.iter().map(|s| s.to_string()).collect(),
    }
}
