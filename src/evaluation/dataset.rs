use anyhow::Context;
use std::path::Path;
use tracing::info;

use super::{EvaluationItem, SystemPrompt};

/// Candidate system prompts, evaluated in this order: (id, content).
pub const SYSTEM_PROMPTS: &[(&str, &str)] = &[
    (
        "prompt-1",
        "You are an AI code reviewer. Review the following pull request and identify any issues, bugs, or improvements. Be concise and actionable in your feedback.",
    ),
    (
        "prompt-2",
        "You are an AI assistant that reviews code changes. Analyze the diff provided and point out:
- Potential bugs or errors
- Security concerns
- Performance issues
- Code quality improvements

Provide specific line references where applicable.",
    ),
];

/// Expected-focus labels of the static dataset and what the critical
/// detection judge is told to look for.
pub const FOCUS_DESCRIPTIONS: &[(&str, &str)] = &[
    ("silent_failure", "silent failure or missing error handling when operation fails"),
    ("null_reference", "null or undefined reference that could cause runtime errors"),
    ("sql_injection", "SQL injection vulnerability from unsanitized input"),
    ("duplicate_charge", "risk of duplicate charges or transactions without idempotency"),
    ("signature_bypass", "webhook or request signature verification being bypassed"),
    ("weak_crypto", "weak cryptographic practices like MD5 or SHA1 for passwords"),
    ("auth_bypass", "authentication or authorization check being removed or bypassed"),
    ("open_redirect", "open redirect vulnerability allowing redirect to external domains"),
    ("missing_backoff", "missing exponential backoff in retry logic"),
    ("rate_limit_removed", "rate limiting being removed or disabled"),
    ("path_traversal", "path traversal vulnerability allowing access to arbitrary files"),
    ("hardcoded_secret", "hardcoded secrets or credentials in source code"),
    ("error_disclosure", "sensitive error information being exposed to clients"),
    ("race_condition", "race condition in concurrent operations"),
    ("missing_timeout", "missing timeout on external calls that could hang"),
    ("missing_audit", "missing audit logging for sensitive operations"),
];

pub fn system_prompts() -> Vec<SystemPrompt> {
    SYSTEM_PROMPTS
        .iter()
        .map(|(id, content)| SystemPrompt {
            id: id.to_string(),
            content: content.to_string(),
        })
        .collect()
}

/// Human description of a focus label; unknown labels (e.g. ones produced by
/// the focus classifier for repo runs) are passed through unchanged.
pub fn focus_description(label: &str) -> &str {
    FOCUS_DESCRIPTIONS
        .iter()
        .find(|(key, _)| *key == label)
        .map(|(_, desc)| *desc)
        .unwrap_or(label)
}

/// Load the static dataset. Called once at start-up; the returned list is
/// shared read-only for the life of the process.
pub fn load(path: &Path) -> anyhow::Result<Vec<EvaluationItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {:?}", path))?;
    let items = parse(&content).with_context(|| format!("Invalid dataset {:?}", path))?;
    info!("Loaded {} evaluation items from {:?}", items.len(), path);
    Ok(items)
}

pub fn parse(content: &str) -> anyhow::Result<Vec<EvaluationItem>> {
    let items: Vec<EvaluationItem> = serde_json::from_str(content)?;
    if let Some(item) = items.iter().find(|i| i.id.trim().is_empty()) {
        anyhow::bail!("dataset item with empty id (focus: {})", item.expected_focus);
    }
    Ok(items)
}
