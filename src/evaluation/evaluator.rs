use super::candidate::{CandidateRunner, REVIEW_ERROR_PREFIX};
use super::dataset::focus_description;
use super::judge::{Judge, JudgeFields, JudgeKind};
use super::tracker::RunTracker;
use super::{truncate_chars, truncate_with_suffix, EvaluationItem, ItemResult, SystemPrompt};
use crate::config::REVIEW_PREVIEW_CHARS;
use crate::log_capture::LogLevel;

/// Evaluates one (model, prompt, PR) triple: one review, three judge calls.
pub struct ItemEvaluator {
    candidate: CandidateRunner,
    judge: Judge,
}

impl ItemEvaluator {
    pub fn new(candidate: CandidateRunner, judge: Judge) -> Self {
        Self { candidate, judge }
    }

    pub fn judge(&self) -> &Judge {
        &self.judge
    }

    /// Never fails: a broken review or judge call degrades to its fallback
    /// value and is recorded as such. The judges run one after another so
    /// the tracker's step/log narrative stays in order.
    pub async fn evaluate(
        &self,
        model_id: &str,
        prompt: &SystemPrompt,
        item: &EvaluationItem,
        tracker: &RunTracker,
    ) -> ItemResult {
        tracker
            .set_step(format!("Generating review for {}...", item.id))
            .await;
        tracker.append_log("    Generating code review...").await;

        let review = self
            .candidate
            .generate_review(model_id, &prompt.content, &item.diff)
            .await
            .into_text();

        if review.starts_with(REVIEW_ERROR_PREFIX) {
            tracker
                .append_log_at(
                    LogLevel::Warn,
                    format!("    Review failed: {}", truncate_chars(&review, 100)),
                )
                .await;
        } else {
            tracker
                .append_log(format!(
                    "    Review generated ({} chars)",
                    review.chars().count()
                ))
                .await;
        }

        tracker.set_step("Judging critical detection...").await;
        let critical = self
            .judge
            .render_verdict(
                JudgeKind::CriticalDetection,
                JudgeFields {
                    diff: &item.diff,
                    review: &review,
                    expected_focus: Some(focus_description(&item.expected_focus)),
                },
            )
            .await;
        tracker
            .append_log(format!("    Critical: {}", critical.detected))
            .await;

        tracker.set_step("Checking for hallucinations...").await;
        let hallucination = self
            .judge
            .render_verdict(
                JudgeKind::Hallucination,
                JudgeFields {
                    diff: &item.diff,
                    review: &review,
                    expected_focus: None,
                },
            )
            .await;
        tracker
            .append_log_at(
                if hallucination.detected {
                    LogLevel::Warn
                } else {
                    LogLevel::Info
                },
                format!("    Hallucination: {}", hallucination.detected),
            )
            .await;

        tracker.set_step("Evaluating helpfulness...").await;
        let helpfulness = self
            .judge
            .render_verdict(
                JudgeKind::Helpfulness,
                JudgeFields {
                    diff: &item.diff,
                    review: &review,
                    expected_focus: None,
                },
            )
            .await;
        tracker
            .append_log(format!("    Helpful: {}", helpfulness.detected))
            .await;

        ItemResult {
            pr_id: item.id.clone(),
            expected_focus: item.expected_focus.clone(),
            review: truncate_with_suffix(&review, REVIEW_PREVIEW_CHARS, "..."),
            critical_detected: critical.detected,
            hallucinated: hallucination.detected,
            helpful: helpfulness.detected,
            critical_reason: critical.reason,
            hallucination_reason: hallucination.reason,
        }
    }
}
