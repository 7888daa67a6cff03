use std::sync::Arc;
use tracing::warn;

use crate::config::{REVIEW_MAX_TOKENS, REVIEW_TEMPERATURE};
use crate::llm::{CompletionRequest, LlmClient};

/// Prefix every failed review starts with. Downstream code treats failed and
/// successful reviews alike as displayable text.
pub const REVIEW_ERROR_PREFIX: &str = "Error";
pub const EMPTY_REVIEW_TEXT: &str = "No response generated";

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Generated(String),
    Failed(String),
}

impl ReviewOutcome {
    /// Review text as the judges and result records see it.
    pub fn into_text(self) -> String {
        match self {
            ReviewOutcome::Generated(text) => text,
            ReviewOutcome::Failed(reason) => {
                format!("{} generating review: {}", REVIEW_ERROR_PREFIX, reason)
            }
        }
    }
}

pub fn build_review_request(model_id: &str, system_prompt: &str, diff: &str) -> CompletionRequest {
    CompletionRequest {
        model: model_id.to_string(),
        system: Some(system_prompt.to_string()),
        user: format!(
            "PR Diff:\n```\n{}\n```\n\nProvide your code review:",
            diff
        ),
        max_tokens: REVIEW_MAX_TOKENS,
        temperature: REVIEW_TEMPERATURE,
    }
}

/// Produces reviews from the candidate model under test.
pub struct CandidateRunner {
    llm: Arc<dyn LlmClient>,
}

impl CandidateRunner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate_review(
        &self,
        model_id: &str,
        system_prompt: &str,
        diff: &str,
    ) -> ReviewOutcome {
        let request = build_review_request(model_id, system_prompt, diff);
        match self.llm.complete(request).await {
            Ok(text) if text.trim().is_empty() => {
                ReviewOutcome::Generated(EMPTY_REVIEW_TEXT.to_string())
            }
            Ok(text) => ReviewOutcome::Generated(text),
            Err(e) => {
                warn!("Review generation failed for {}: {}", model_id, e);
                ReviewOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_text_has_error_prefix() {
        let text = ReviewOutcome::Failed("timeout".to_string()).into_text();
        assert!(text.starts_with(REVIEW_ERROR_PREFIX));
        assert!(text.contains("timeout"));
    }

    #[test]
    fn test_generated_outcome_text_unchanged() {
        let outcome = ReviewOutcome::Generated("Looks fine".to_string());
        assert_eq!(outcome.into_text(), "Looks fine");
    }

    #[test]
    fn test_review_request_shape() {
        let req = build_review_request("sonar", "You review code", "+let x = 1;");
        assert_eq!(req.model, "sonar");
        assert_eq!(req.system.as_deref(), Some("You review code"));
        assert!(req.user.contains("+let x = 1;"));
        assert_eq!(req.max_tokens, REVIEW_MAX_TOKENS);
    }
}
