use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::judge::extract_json_object;
use super::truncate_chars;
use crate::config::{FOCUS_DIFF_MAX_CHARS, FOCUS_MAX_TOKENS, FOCUS_TEMPERATURE};
use crate::llm::{CompletionRequest, LlmClient};

pub const DEFAULT_FOCUS: &str = "code_quality";

/// Labels the classifier may choose from.
pub const FOCUS_LABELS: &[&str] = &[
    "error_handling",
    "null_check",
    "security_vulnerability",
    "performance_issue",
    "race_condition",
    "memory_leak",
    "input_validation",
    "authentication",
    "data_integrity",
    "logging",
    "edge_case",
    "type_safety",
    "api_contract",
    "configuration",
    "refactoring",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusClassification {
    pub focus: String,
    pub explanation: String,
}

impl FocusClassification {
    fn fallback(explanation: impl Into<String>) -> Self {
        Self {
            focus: DEFAULT_FOCUS.to_string(),
            explanation: explanation.into(),
        }
    }
}

pub fn build_focus_prompt(diff: &str, title: &str) -> String {
    format!(
        r#"Analyze this pull request and determine what a code reviewer should focus on.

PR Title: {title}

Diff:
```
{diff}
```

Choose ONE focus area:
{labels}

Respond with JSON: {{"focus": "chosen_focus", "explanation": "brief reason"}}"#,
        title = title,
        diff = truncate_chars(diff, FOCUS_DIFF_MAX_CHARS),
        labels = FOCUS_LABELS.join(", "),
    )
}

/// Reads the focus object out of a model reply. Labels outside
/// `FOCUS_LABELS` are rejected.
pub fn parse_focus_response(raw: &str) -> Result<FocusClassification, String> {
    let obj = extract_json_object(raw.trim())
        .ok_or_else(|| format!("no JSON object in reply: {}", truncate_chars(raw.trim(), 100)))?;

    let focus = obj
        .get("focus")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_lowercase())
        .ok_or_else(|| "reply has no focus field".to_string())?;

    if !FOCUS_LABELS.contains(&focus.as_str()) {
        return Err(format!("unknown focus label '{}'", focus));
    }

    let explanation = obj
        .get("explanation")
        .and_then(|v| v.as_str())
        .unwrap_or("General code review")
        .to_string();

    Ok(FocusClassification { focus, explanation })
}

/// Picks the expected-focus label for a PR. Never fails: any transport or
/// parse problem yields `DEFAULT_FOCUS` with a diagnostic explanation.
pub struct FocusClassifier {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl FocusClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub async fn classify(&self, diff: &str, title: &str) -> FocusClassification {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: None,
            user: build_focus_prompt(diff, title),
            max_tokens: FOCUS_MAX_TOKENS,
            temperature: FOCUS_TEMPERATURE,
        };

        let raw = match self.llm.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Focus classification call failed: {}", e);
                return FocusClassification::fallback(format!("Could not analyze: {}", e));
            }
        };

        parse_focus_response(&raw).unwrap_or_else(|e| {
            warn!("Focus classification unreadable: {}", e);
            FocusClassification::fallback(format!("Could not analyze: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let c = parse_focus_response(r#"{"focus": "race_condition", "explanation": "shared map"}"#)
            .unwrap();
        assert_eq!(c.focus, "race_condition");
        assert_eq!(c.explanation, "shared map");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"focus\": \"Input_Validation\"}\n```";
        let c = parse_focus_response(raw).unwrap();
        assert_eq!(c.focus, "input_validation");
        assert_eq!(c.explanation, "General code review");
    }

    #[test]
    fn test_parse_rejects_unknown_label() {
        let err = parse_focus_response(r#"{"focus": "vibes"}"#).unwrap_err();
        assert!(err.contains("vibes"));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse_focus_response("I think this is about logging").is_err());
    }

    #[test]
    fn test_prompt_lists_labels_and_truncates_diff() {
        let diff = "x".repeat(FOCUS_DIFF_MAX_CHARS + 500);
        let prompt = build_focus_prompt(&diff, "Add cache");
        assert!(prompt.contains("PR Title: Add cache"));
        assert!(prompt.contains("memory_leak"));
        assert!(!prompt.contains(&"x".repeat(FOCUS_DIFF_MAX_CHARS + 1)));
    }
}
