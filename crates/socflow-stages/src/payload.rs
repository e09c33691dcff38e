//! Untrusted backend payloads.
//!
//! Backends answer with free text that should contain one JSON object,
//! sometimes inside a fenced code block, sometimes surrounded by prose.
//! Anything that fails to parse degrades to the type's default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PayloadError;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fenced json pattern is valid")
});

/// A parsed payload plus the reasoning steps the backend listed
#[derive(Debug, Clone, PartialEq)]
pub struct Payload<T> {
    pub value: T,
    pub reasoning: Vec<String>,
}

/// Locate the JSON object in backend output.
///
/// A fenced block wins; otherwise the first balanced `{...}` is taken.
pub fn extract_json(raw: &str) -> Option<&str> {
    if let Some(block) = FENCED_JSON.captures(raw).and_then(|c| c.get(1)) {
        return Some(block.as_str());
    }
    first_balanced_object(raw)
}

/// Parse `raw` into `T`, pulling an optional top-level `reasoning` array
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<Payload<T>, PayloadError> {
    let json = extract_json(raw).ok_or(PayloadError::NoJson)?;
    let mut value: Value = serde_json::from_str(json).map_err(|e| PayloadError::Shape(e.to_string()))?;

    let reasoning = value
        .as_object_mut()
        .and_then(|object| object.remove("reasoning"))
        .and_then(|steps| match steps {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ),
            Value::String(step) => Some(vec![step]),
            _ => None,
        })
        .unwrap_or_default();

    let value = serde_json::from_value(value).map_err(|e| PayloadError::Shape(e.to_string()))?;
    Ok(Payload { value, reasoning })
}

/// Like [`parse_payload`], falling back to `T::default()` with a warning
pub fn parse_or_default<T: DeserializeOwned + Default>(raw: &str) -> (Payload<T>, Option<String>) {
    match parse_payload(raw) {
        Ok(payload) => (payload, None),
        Err(e) => (
            Payload {
                value: T::default(),
                reasoning: Vec::new(),
            },
            Some(e.to_string()),
        ),
    }
}

fn first_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use socflow_core::outputs::ThreatAnalysis;

    #[test]
    fn test_fenced_block_preferred() {
        let raw = "Here is {not json}\n```json\n{\"summary\": \"c2 beacon\"}\n```\nthanks";
        assert_eq!(extract_json(raw), Some("{\"summary\": \"c2 beacon\"}"));
    }

    #[test]
    fn test_balanced_object_in_prose() {
        let raw = r#"Analysis: {"summary": "brace } in string", "nested": {"a": 1}} trailing"#;
        assert_eq!(
            extract_json(raw),
            Some(r#"{"summary": "brace } in string", "nested": {"a": 1}}"#)
        );
    }

    #[test]
    fn test_unbalanced_object_is_none() {
        assert_eq!(extract_json("{\"summary\": \"cut off"), None);
        assert_eq!(extract_json("no json at all"), None);
    }

    #[test]
    fn test_reasoning_pulled_out() {
        let raw = r#"{"summary": "x", "confidence": 0.8, "reasoning": ["saw beacon", "matched intel"]}"#;
        let payload: Payload<ThreatAnalysis> = parse_payload(raw).unwrap();
        assert_eq!(payload.value.confidence, 0.8);
        assert_eq!(payload.reasoning.len(), 2);
    }

    #[test]
    fn test_wrong_shape_degrades_to_default() {
        let (payload, warning) = parse_or_default::<ThreatAnalysis>(r#"{"confidence": "very"}"#);
        assert_eq!(payload.value, ThreatAnalysis::default());
        assert!(warning.unwrap().starts_with("PAYLOAD/SHAPE"));
    }
}
