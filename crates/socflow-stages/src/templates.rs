//! Response templates: YAML catalog rendered with Handlebars.
//!
//! Helpers available to templates:
//! - percent: 0.85 -> "85%"
//! - upper: uppercase a string
//! - truncate: cut a string to N characters with an ellipsis
//! - join: join an array with a separator

use handlebars::{handlebars_helper, Handlebars};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::TemplateError;

/// Catalog compiled into the crate
pub const BUILTIN_TEMPLATES: &str = include_str!("../templates/response-templates.yaml");

/// Templates the stages render by name
pub const REQUIRED_TEMPLATES: [&str; 4] = ["incident_report", "notification", "teams_message", "human_review_prompt"];

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesFile {
    pub version: String,
    pub templates: HashMap<String, Template>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub description: String,
    pub template: String,
}

impl TemplatesFile {
    pub fn load(path: &str) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TemplateError::Load(format!("failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, TemplateError> {
        serde_yaml::from_str(yaml).map_err(|e| TemplateError::Load(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }
}

handlebars_helper!(percent: |value: Json| {
    format!("{}%", (value.as_f64().unwrap_or(0.0) * 100.0).round() as i64)
});

handlebars_helper!(upper: |value: Json| {
    value.as_str().map(str::to_uppercase).unwrap_or_default()
});

handlebars_helper!(truncate: |value: Json, max: u64| {
    let text = value.as_str().unwrap_or("");
    let max = max as usize;
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
});

handlebars_helper!(join: |items: Json, separator: str| {
    items
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(separator)
        })
        .unwrap_or_default()
});

/// Compiled renderer with registered helpers
pub struct ResponseRenderer {
    handlebars: Handlebars<'static>,
    templates: TemplatesFile,
}

impl ResponseRenderer {
    pub fn new(templates: TemplatesFile) -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Output is markdown and plain text, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_helper("percent", Box::new(percent));
        handlebars.register_helper("upper", Box::new(upper));
        handlebars.register_helper("truncate", Box::new(truncate));
        handlebars.register_helper("join", Box::new(join));

        for (name, template) in &templates.templates {
            handlebars
                .register_template_string(name, &template.template)
                .map_err(|e| TemplateError::Load(format!("{}: {}", name, e)))?;
        }

        let missing: Vec<&str> = REQUIRED_TEMPLATES
            .iter()
            .copied()
            .filter(|name| !templates.templates.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::Load(format!("missing templates: {}", missing.join(", "))));
        }

        Ok(Self { handlebars, templates })
    }

    /// Renderer over the compiled-in catalog
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::new(TemplatesFile::from_yaml(BUILTIN_TEMPLATES)?)
    }

    pub fn load(path: &str) -> Result<Self, TemplateError> {
        Self::new(TemplatesFile::load(path)?)
    }

    pub fn render(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        self.handlebars
            .render(name, data)
            .map_err(|e| TemplateError::Render(format!("{}: {}", name, e)))
    }

    pub fn list_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ResponseRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRenderer")
            .field("version", &self.templates.version)
            .field("templates", &self.list_templates())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_catalog_loads() {
        let renderer = ResponseRenderer::builtin().unwrap();
        for name in REQUIRED_TEMPLATES {
            assert!(renderer.list_templates().contains(&name));
        }
    }

    #[test]
    fn test_missing_required_template_rejected() {
        let yaml = r#"
version: "1.0"
templates:
  notification:
    description: only one
    template: "{{summary}}"
"#;
        let err = ResponseRenderer::new(TemplatesFile::from_yaml(yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("incident_report"));
    }

    #[test]
    fn test_notification_helpers() {
        let renderer = ResponseRenderer::builtin().unwrap();
        let out = renderer
            .render(
                "notification",
                &json!({
                    "severity": "critical",
                    "category": "ransomware",
                    "summary": "Encryption burst on fileserver-01",
                    "workflow_id": "wf-1",
                    "strategy": "contain",
                }),
            )
            .unwrap();
        assert_eq!(
            out,
            "[CRITICAL] ransomware - Encryption burst on fileserver-01 (workflow wf-1, strategy contain)"
        );
    }

    #[test]
    fn test_report_lists_actions_without_escaping() {
        let renderer = ResponseRenderer::builtin().unwrap();
        let out = renderer
            .render(
                "incident_report",
                &json!({
                    "title": "Incident <wf-1>",
                    "severity": "high",
                    "confidence": 0.72,
                    "actions": [
                        {"action_type": "block_indicator", "target": "10.0.0.9", "description": "Block it", "automated": true}
                    ],
                }),
            )
            .unwrap();
        assert!(out.starts_with("# Incident <wf-1>"));
        assert!(out.contains("72%"));
        assert!(out.contains("- [auto] block_indicator on 10.0.0.9: Block it"));
        assert!(!out.contains("## Risk"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let renderer = ResponseRenderer::builtin().unwrap();
        let summary = "é".repeat(200);
        let out = renderer
            .render("notification", &json!({ "summary": summary, "severity": "low" }))
            .unwrap();
        assert!(out.contains(&format!("{}...", "é".repeat(160))));
    }
}
