pub mod candidate;
pub mod dataset;
pub mod engine;
pub mod evaluator;
pub mod focus;
pub mod judge;
pub mod tracker;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{
    PASS_MAX_HALLUCINATION_RATE, PASS_MIN_CRITICAL_RATE, RECOMMEND_MAX_HALLUCINATION_RATE,
    RECOMMEND_MIN_CRITICAL_RATE,
};

// ============================================================================
// Shared data model structs
// ============================================================================

/// Which run family a tracker belongs to. Each mode has its own single-flight
/// guard and results cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Built-in dataset, fixed models and prompts.
    Global,
    /// Caller-supplied PRs; results are ranked and given a verdict.
    Repo,
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMode::Global => write!(f, "global"),
            EvalMode::Repo => write!(f, "repo"),
        }
    }
}

/// One PR under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationItem {
    pub id: String,
    pub diff: String,
    pub expected_focus: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub id: String,
    pub content: String,
}

/// Outcome of one judge call. `reason` explains the undesirable side of the
/// verdict, or a diagnostic when the judge could not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub detected: bool,
    pub reason: Option<String>,
}

impl JudgeVerdict {
    /// Fail-closed verdict used for transport and parse failures.
    pub fn fail_closed(reason: impl Into<String>) -> Self {
        Self {
            detected: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub pr_id: String,
    pub expected_focus: String,
    pub review: String,
    pub critical_detected: bool,
    pub hallucinated: bool,
    pub helpful: bool,
    pub critical_reason: Option<String>,
    pub hallucination_reason: Option<String>,
}

/// One entry in a combination's detail list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemDetail {
    Evaluated(ItemResult),
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Recommended,
    Acceptable,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationResult {
    pub model: String,
    pub prompt_id: String,
    pub prompt_content: String,
    pub critical_detection_rate: f64,
    pub hallucination_rate: f64,
    pub helpfulness_rate: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank: Option<usize>,
    pub details: Vec<ItemDetail>,
}

impl CombinationResult {
    /// Evaluated items only (sentinel error entries skipped).
    pub fn item_results(&self) -> impl Iterator<Item = &ItemResult> {
        self.details.iter().filter_map(|d| match d {
            ItemDetail::Evaluated(r) => Some(r),
            ItemDetail::Failed { .. } => None,
        })
    }
}

/// Rates for one combination, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub critical: f64,
    pub hallucination: f64,
    pub helpfulness: f64,
}

impl Rates {
    /// Fraction of items with each flag set. An empty slice yields all zeros.
    pub fn from_items(items: &[ItemResult]) -> Self {
        if items.is_empty() {
            return Rates {
                critical: 0.0,
                hallucination: 0.0,
                helpfulness: 0.0,
            };
        }
        let n = items.len() as f64;
        let count = |f: fn(&ItemResult) -> bool| items.iter().filter(|r| f(r)).count() as f64;
        Rates {
            critical: count(|r| r.critical_detected) / n,
            hallucination: count(|r| r.hallucinated) / n,
            helpfulness: count(|r| r.helpful) / n,
        }
    }

    /// Rates recorded for a combination that failed as a whole.
    pub fn penalized() -> Self {
        Rates {
            critical: 0.0,
            hallucination: 1.0,
            helpfulness: 0.0,
        }
    }
}

/// Thresholds deciding `passed` and the repo-mode `verdict`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassPolicy {
    pub min_critical_rate: f64,
    pub max_hallucination_rate: f64,
    pub recommend_min_critical_rate: f64,
    pub recommend_max_hallucination_rate: f64,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            min_critical_rate: PASS_MIN_CRITICAL_RATE,
            max_hallucination_rate: PASS_MAX_HALLUCINATION_RATE,
            recommend_min_critical_rate: RECOMMEND_MIN_CRITICAL_RATE,
            recommend_max_hallucination_rate: RECOMMEND_MAX_HALLUCINATION_RATE,
        }
    }
}

impl PassPolicy {
    pub fn passed(&self, critical_rate: f64, hallucination_rate: f64) -> bool {
        critical_rate >= self.min_critical_rate && hallucination_rate <= self.max_hallucination_rate
    }

    pub fn verdict(&self, critical_rate: f64, hallucination_rate: f64) -> Verdict {
        if critical_rate >= self.recommend_min_critical_rate
            && hallucination_rate <= self.recommend_max_hallucination_rate
        {
            Verdict::Recommended
        } else if self.passed(critical_rate, hallucination_rate) {
            Verdict::Acceptable
        } else {
            Verdict::Rejected
        }
    }
}

// ============================================================================
// Text helpers
// ============================================================================

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Like `truncate_chars`, appending `suffix` when anything was cut.
pub fn truncate_with_suffix(s: &str, max_chars: usize, suffix: &str) -> String {
    let head = truncate_chars(s, max_chars);
    if head.len() < s.len() {
        format!("{}{}", head, suffix)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(critical: bool, hallucinated: bool, helpful: bool) -> ItemResult {
        ItemResult {
            pr_id: "pr".to_string(),
            expected_focus: "sql_injection".to_string(),
            review: String::new(),
            critical_detected: critical,
            hallucinated,
            helpful,
            critical_reason: None,
            hallucination_reason: None,
        }
    }

    #[test]
    fn test_rates_empty_are_zero() {
        let rates = Rates::from_items(&[]);
        assert_eq!(rates.critical, 0.0);
        assert_eq!(rates.hallucination, 0.0);
        assert_eq!(rates.helpfulness, 0.0);
    }

    #[test]
    fn test_rates_fractions() {
        let items = vec![
            item(true, false, true),
            item(true, true, false),
            item(false, false, true),
            item(true, false, true),
        ];
        let rates = Rates::from_items(&items);
        assert_eq!(rates.critical, 0.75);
        assert_eq!(rates.hallucination, 0.25);
        assert_eq!(rates.helpfulness, 0.75);
    }

    #[test]
    fn test_passed_boundaries() {
        let policy = PassPolicy::default();
        assert!(policy.passed(0.5, 0.35));
        assert!(!policy.passed(0.49, 0.35));
        assert!(!policy.passed(0.5, 0.36));
        assert!(policy.passed(1.0, 0.0));
    }

    #[test]
    fn test_verdict_tiers() {
        let policy = PassPolicy::default();
        assert_eq!(policy.verdict(0.8, 0.15), Verdict::Recommended);
        assert_eq!(policy.verdict(0.6, 0.2), Verdict::Acceptable);
        assert_eq!(policy.verdict(0.3, 0.5), Verdict::Rejected);
        // High detection but too many hallucinations for a recommendation
        assert_eq!(policy.verdict(0.9, 0.3), Verdict::Acceptable);
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_truncate_with_suffix() {
        assert_eq!(truncate_with_suffix("abcdef", 3, "..."), "abc...");
        assert_eq!(truncate_with_suffix("abc", 3, "..."), "abc");
    }

    #[test]
    fn test_eval_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&EvalMode::Repo).unwrap(), "\"repo\"");
        let mode: EvalMode = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(mode, EvalMode::Global);
    }

    #[test]
    fn test_item_detail_serializes_flat() {
        let detail = ItemDetail::Failed {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));

        let detail = ItemDetail::Evaluated(item(true, false, true));
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["pr_id"], "pr");
        assert_eq!(json["critical_detected"], true);
    }
}
