use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{truncate_chars, JudgeVerdict};
use crate::config::{JUDGE_FIELD_MAX_CHARS, JUDGE_MAX_TOKENS, JUDGE_TEMPERATURE, KEYWORD_PREFIX_CHARS};
use crate::llm::{CompletionRequest, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeKind {
    CriticalDetection,
    Hallucination,
    Helpfulness,
}

impl JudgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            JudgeKind::CriticalDetection => "critical_detection",
            JudgeKind::Hallucination => "hallucination",
            JudgeKind::Helpfulness => "helpfulness",
        }
    }

    /// Which value of `detected` is the undesirable one, i.e. the side that
    /// keeps the judge's explanation.
    fn explains_when_detected(&self) -> bool {
        matches!(self, JudgeKind::Hallucination)
    }

    fn verdict(&self, detected: bool, explanation: Option<String>) -> JudgeVerdict {
        let reason = if detected == self.explains_when_detected() {
            explanation
        } else {
            None
        };
        JudgeVerdict { detected, reason }
    }
}

/// Template inputs. Every field is cut to `JUDGE_FIELD_MAX_CHARS` before it
/// goes into the prompt.
#[derive(Debug, Clone, Copy)]
pub struct JudgeFields<'a> {
    pub diff: &'a str,
    pub review: &'a str,
    /// Description of the expected issue; only the critical detection
    /// template uses it.
    pub expected_focus: Option<&'a str>,
}

const RESPONSE_FORMAT: &str = r#"Respond with ONLY a JSON object (no markdown fences, no extra text):
{"judgment": "Yes" or "No", "explanation": "one or two sentences"}"#;

pub fn build_judge_prompt(kind: JudgeKind, fields: &JudgeFields<'_>) -> String {
    let diff = truncate_chars(fields.diff, JUDGE_FIELD_MAX_CHARS);
    let review = truncate_chars(fields.review, JUDGE_FIELD_MAX_CHARS);

    match kind {
        JudgeKind::CriticalDetection => {
            let focus = truncate_chars(
                fields.expected_focus.unwrap_or("not specified"),
                JUDGE_FIELD_MAX_CHARS,
            );
            format!(
                r#"You are judging an automated code review for critical issue detection.

## Pull Request Diff
```
{diff}
```

## Code Review
{review}

## Expected Issue
{focus}

Does the review clearly identify the expected issue (or the same underlying problem in different words)?
Answer "Yes" only if the issue is explicitly called out.

{response_format}"#,
                response_format = RESPONSE_FORMAT,
            )
        }
        JudgeKind::Hallucination => format!(
            r#"You are judging an automated code review for hallucinations.

## Pull Request Diff
```
{diff}
```

## Code Review
{review}

Does the review claim any issue, code, or behavior that is NOT actually present in the diff?
Answer "Yes" if at least one claim is unsupported by the diff, "No" otherwise.

{response_format}"#,
            response_format = RESPONSE_FORMAT,
        ),
        JudgeKind::Helpfulness => format!(
            r#"You are judging an automated code review for helpfulness.

## Code Review
{review}

Does the review contain at least one concrete, actionable suggestion a developer could apply?
Vague praise or generic advice does not count.

{response_format}"#,
            response_format = RESPONSE_FORMAT,
        ),
    }
}

/// LLM judge rendering boolean verdicts. Never returns an error: transport
/// and parse failures resolve to a fail-closed verdict.
pub struct Judge {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl Judge {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn render_verdict(&self, kind: JudgeKind, fields: JudgeFields<'_>) -> JudgeVerdict {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: None,
            user: build_judge_prompt(kind, &fields),
            max_tokens: JUDGE_MAX_TOKENS,
            temperature: JUDGE_TEMPERATURE,
        };

        match self.llm.complete(request).await {
            Ok(raw) => parse_verdict(kind, &raw),
            Err(e) => {
                warn!("{} judge call failed: {}", kind.label(), e);
                JudgeVerdict::fail_closed(format!("Judge error: {}", e))
            }
        }
    }
}

/// Interpret a judge reply: structured JSON first, then a yes/no keyword at
/// the start of the text, otherwise fail closed.
pub fn parse_verdict(kind: JudgeKind, raw: &str) -> JudgeVerdict {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return JudgeVerdict::fail_closed("Empty judge response");
    }

    if let Some(obj) = extract_json_object(trimmed) {
        if let Some(judgment) = obj.get("judgment").or_else(|| obj.get("detected")) {
            if let Some(detected) = coerce_bool(judgment) {
                let explanation = obj
                    .get("explanation")
                    .or_else(|| obj.get("reason"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                return kind.verdict(detected, explanation);
            }
        }
        debug!("Judge JSON has no usable judgment field, trying keyword fallback");
    }

    if let Some(detected) = keyword_judgment(trimmed) {
        return kind.verdict(detected, Some(truncate_chars(trimmed, 300).to_string()));
    }

    warn!(
        "Failed to parse {} judge response: {}",
        kind.label(),
        truncate_chars(trimmed, 200)
    );
    JudgeVerdict::fail_closed(format!(
        "Unparseable judge response: {}",
        truncate_chars(trimmed, 100)
    ))
}

/// First JSON object in a model reply. Fenced code blocks are tried in
/// order before the reply as a whole.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let fenced = raw
        .split("```")
        .skip(1)
        .step_by(2)
        .map(|block| block.trim_start().trim_start_matches("json"));

    fenced
        .chain(std::iter::once(raw))
        .find_map(first_object)
}

fn first_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    for (start, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        if let Some(Ok(serde_json::Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}

fn coerce_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => {
            let s = s.trim().to_lowercase();
            Some(matches!(s.as_str(), "yes" | "true" | "1"))
        }
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// Yes/no keyword among the first words of the reply.
fn keyword_judgment(text: &str) -> Option<bool> {
    let prefix = truncate_chars(text, KEYWORD_PREFIX_CHARS).to_lowercase();
    prefix
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .find_map(|word| match word {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let raw = r#"{"judgment": "No", "explanation": "Review never mentions the injection"}"#;
        let v = parse_verdict(JudgeKind::CriticalDetection, raw);
        assert!(!v.detected);
        assert_eq!(
            v.reason.as_deref(),
            Some("Review never mentions the injection")
        );
    }

    #[test]
    fn test_parse_json_in_fences() {
        let raw = "Here is my assessment:\n```json\n{\"judgment\": \"Yes\", \"explanation\": \"found it\"}\n```";
        let v = parse_verdict(JudgeKind::CriticalDetection, raw);
        assert!(v.detected);
        // Critical detection only explains misses
        assert!(v.reason.is_none());
    }

    #[test]
    fn test_fenced_json_after_prose_with_braces() {
        let raw = "Looking at fn main() { ... } in the diff:\n```json\n{\"judgment\": \"Yes\", \"explanation\": \"found\"}\n```";
        let v = parse_verdict(JudgeKind::CriticalDetection, raw);
        assert!(v.detected);
        assert!(v.reason.is_none());

        let obj = extract_json_object("see {x}\n```\nnot json\n```\n```json\n{\"judgment\": false}\n```").unwrap();
        assert_eq!(obj.get("judgment"), Some(&serde_json::Value::Bool(false)));
    }

    #[test]
    fn test_parse_bool_and_numeric_judgment() {
        let v = parse_verdict(JudgeKind::Helpfulness, r#"{"judgment": true}"#);
        assert!(v.detected);
        let v = parse_verdict(JudgeKind::Helpfulness, r#"{"judgment": 0, "explanation": "vague"}"#);
        assert!(!v.detected);
        assert_eq!(v.reason.as_deref(), Some("vague"));
    }

    #[test]
    fn test_string_judgment_coercion() {
        for yes in ["yes", "YES", "true", "1", " Yes "] {
            let raw = format!(r#"{{"judgment": "{}"}}"#, yes);
            assert!(parse_verdict(JudgeKind::Helpfulness, &raw).detected, "{}", yes);
        }
        let v = parse_verdict(JudgeKind::Helpfulness, r#"{"judgment": "maybe"}"#);
        assert!(!v.detected);
    }

    #[test]
    fn test_hallucination_reason_on_detected_side() {
        let raw = r#"{"judgment": "Yes", "explanation": "mentions a missing file"}"#;
        let v = parse_verdict(JudgeKind::Hallucination, raw);
        assert!(v.detected);
        assert_eq!(v.reason.as_deref(), Some("mentions a missing file"));

        let raw = r#"{"judgment": "No", "explanation": "all grounded"}"#;
        let v = parse_verdict(JudgeKind::Hallucination, raw);
        assert!(!v.detected);
        assert!(v.reason.is_none());
    }

    #[test]
    fn test_keyword_fallback_yes() {
        let v = parse_verdict(JudgeKind::CriticalDetection, "YES, this is clearly a problem");
        assert!(v.detected);
    }

    #[test]
    fn test_keyword_fallback_no_keeps_reason() {
        let v = parse_verdict(JudgeKind::CriticalDetection, "No. The review talks about naming.");
        assert!(!v.detected);
        assert!(v.reason.unwrap().contains("naming"));
    }

    #[test]
    fn test_keyword_outside_prefix_ignored() {
        let raw = "The reviewer discussed several aspects and finally yes";
        let v = parse_verdict(JudgeKind::Helpfulness, raw);
        assert!(!v.detected);
        assert!(v.reason.unwrap().starts_with("Unparseable"));
    }

    #[test]
    fn test_garbage_fails_closed_with_reason() {
        let v = parse_verdict(JudgeKind::Helpfulness, "%%%% ~~~ ???");
        assert!(!v.detected);
        assert!(!v.reason.unwrap().is_empty());

        let v = parse_verdict(JudgeKind::Hallucination, "   ");
        assert!(!v.detected);
        assert_eq!(v.reason.as_deref(), Some("Empty judge response"));
    }

    #[test]
    fn test_json_without_judgment_fails_closed() {
        let v = parse_verdict(JudgeKind::Hallucination, r#"{"explanation": "hmm"}"#);
        assert!(!v.detected);
        assert!(v.reason.is_some());
    }

    #[test]
    fn test_extract_first_object_with_trailing_text() {
        let obj = extract_json_object(r#"Sure! {"judgment": "Yes"} and {"other": 1}"#).unwrap();
        assert_eq!(obj["judgment"], "Yes");
    }

    #[test]
    fn test_prompt_truncates_fields() {
        let long_diff = "d".repeat(5000);
        let fields = JudgeFields {
            diff: &long_diff,
            review: "short",
            expected_focus: Some("race condition"),
        };
        let prompt = build_judge_prompt(JudgeKind::CriticalDetection, &fields);
        assert!(prompt.contains(&"d".repeat(JUDGE_FIELD_MAX_CHARS)));
        assert!(!prompt.contains(&"d".repeat(JUDGE_FIELD_MAX_CHARS + 1)));
        assert!(prompt.contains("race condition"));
    }

    #[test]
    fn test_helpfulness_prompt_omits_diff() {
        let fields = JudgeFields {
            diff: "UNIQUE_DIFF_MARKER",
            review: "Add a timeout",
            expected_focus: None,
        };
        let prompt = build_judge_prompt(JudgeKind::Helpfulness, &fields);
        assert!(!prompt.contains("UNIQUE_DIFF_MARKER"));
        assert!(prompt.contains("Add a timeout"));
    }
}
