use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info};

use super::evaluator::ItemEvaluator;
use super::tracker::RunTracker;
use super::{
    CombinationResult, EvalMode, EvaluationItem, ItemDetail, ItemResult, PassPolicy, Rates,
    SystemPrompt,
};
use crate::error::EvalError;
use crate::log_capture::LogLevel;

const BANNER: &str = "==================================================";

/// Everything a matrix walk needs besides the items and the tracker.
pub struct EvalContext {
    pub models: Vec<String>,
    pub prompts: Vec<SystemPrompt>,
    pub evaluator: Arc<ItemEvaluator>,
    pub policy: PassPolicy,
}

impl EvalContext {
    pub fn total_combinations(&self) -> usize {
        self.models.len() * self.prompts.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAck {
    pub status: String,
    pub message: String,
    pub run_id: String,
    pub total_combinations: usize,
}

/// Accept a run (single-flight check + state reset) and hand the matrix walk
/// to a background task. Returns as soon as the run is accepted.
pub async fn start_run(
    ctx: Arc<EvalContext>,
    tracker: Arc<RunTracker>,
    items: Arc<Vec<EvaluationItem>>,
) -> Result<StartAck, EvalError> {
    let total = ctx.total_combinations();
    let run_id = tracker.try_begin(total).await?;
    let mode = tracker.mode();

    tracker
        .append_log(format!(
            "Starting {} evaluation with {} models and {} prompts",
            mode,
            ctx.models.len(),
            ctx.prompts.len()
        ))
        .await;
    tracker
        .append_log(format!("Total combinations to test: {}", total))
        .await;
    tracker
        .append_log(format!("Dataset size: {} PRs per combination", items.len()))
        .await;

    info!(%mode, run_id = %run_id, total, "Evaluation run accepted");

    let walk_tracker = tracker.clone();
    tokio::spawn(async move {
        run_matrix(ctx, walk_tracker, items).await;
    });

    Ok(StartAck {
        status: "started".to_string(),
        message: format!("{} evaluation started", capitalize(&mode.to_string())),
        run_id,
        total_combinations: total,
    })
}

/// Walk models (outer) × prompts (inner) × items, publish the results on the
/// tracker and return them. Expects the tracker to be in the running state.
pub async fn run_matrix(
    ctx: Arc<EvalContext>,
    tracker: Arc<RunTracker>,
    items: Arc<Vec<EvaluationItem>>,
) -> Vec<CombinationResult> {
    let mode = tracker.mode();
    let mut results = Vec::with_capacity(ctx.total_combinations());

    for (model_idx, model) in ctx.models.iter().enumerate() {
        tracker.append_log("").await;
        tracker.append_log(BANNER).await;
        tracker
            .append_log(format!(
                "Model {}/{}: {}",
                model_idx + 1,
                ctx.models.len(),
                model
            ))
            .await;
        tracker.append_log(BANNER).await;

        for prompt in &ctx.prompts {
            tracker
                .begin_combination(model, &prompt.id, items.len())
                .await;
            tracker.append_log("").await;
            tracker
                .append_log(format!("Testing: {} + {}", model, prompt.id))
                .await;

            // Own task per combination: a panic anywhere inside it is caught
            // here and recorded instead of taking the whole walk down.
            let task = tokio::spawn(evaluate_combination(
                ctx.evaluator.clone(),
                tracker.clone(),
                model.clone(),
                prompt.clone(),
                items.clone(),
            ));

            let combination = match task.await {
                Ok(item_results) => {
                    let combination =
                        build_combination(model, prompt, item_results, &ctx.policy, mode);
                    log_combination_summary(&tracker, &combination).await;
                    combination
                }
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        panic_message(join_err.into_panic())
                    } else {
                        join_err.to_string()
                    };
                    error!("Combination {} + {} failed: {}", model, prompt.id, reason);
                    tracker
                        .append_log_at(LogLevel::Error, format!("  Error: {}", reason))
                        .await;
                    failed_combination(model, prompt, reason, &ctx.policy, mode)
                }
            };

            results.push(combination);
            tracker.advance().await;
        }
    }

    if mode == EvalMode::Repo {
        rank_results(&mut results);
    }

    log_run_summary(&tracker, &results).await;
    tracker.finish(results.clone()).await;
    results
}

async fn evaluate_combination(
    evaluator: Arc<ItemEvaluator>,
    tracker: Arc<RunTracker>,
    model: String,
    prompt: SystemPrompt,
    items: Arc<Vec<EvaluationItem>>,
) -> Vec<ItemResult> {
    let mut item_results = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        tracker.begin_item(&item.id, idx).await;
        tracker
            .append_log(format!(
                "  -> PR {}/{}: {} (focus: {})",
                idx + 1,
                items.len(),
                item.id,
                item.expected_focus
            ))
            .await;

        let result = evaluator.evaluate(&model, &prompt, item, &tracker).await;
        item_results.push(result);
        tracker.finish_item().await;
    }
    item_results
}

/// Aggregate item results into the combination record.
pub fn build_combination(
    model: &str,
    prompt: &SystemPrompt,
    item_results: Vec<ItemResult>,
    policy: &PassPolicy,
    mode: EvalMode,
) -> CombinationResult {
    let rates = Rates::from_items(&item_results);
    combination_record(
        model,
        prompt,
        rates,
        item_results.into_iter().map(ItemDetail::Evaluated).collect(),
        policy,
        mode,
    )
}

/// Sentinel record for a combination that failed as a whole: rates
/// (0, 1, 0), never passing.
pub fn failed_combination(
    model: &str,
    prompt: &SystemPrompt,
    error: String,
    policy: &PassPolicy,
    mode: EvalMode,
) -> CombinationResult {
    let mut record = combination_record(
        model,
        prompt,
        Rates::penalized(),
        vec![ItemDetail::Failed { error }],
        policy,
        mode,
    );
    record.passed = false;
    record
}

fn combination_record(
    model: &str,
    prompt: &SystemPrompt,
    rates: Rates,
    details: Vec<ItemDetail>,
    policy: &PassPolicy,
    mode: EvalMode,
) -> CombinationResult {
    CombinationResult {
        model: model.to_string(),
        prompt_id: prompt.id.clone(),
        prompt_content: prompt.content.clone(),
        critical_detection_rate: rates.critical,
        hallucination_rate: rates.hallucination,
        helpfulness_rate: rates.helpfulness,
        passed: policy.passed(rates.critical, rates.hallucination),
        verdict: match mode {
            EvalMode::Repo => Some(policy.verdict(rates.critical, rates.hallucination)),
            EvalMode::Global => None,
        },
        rank: None,
        details,
    }
}

/// Order by detection rate (desc), then hallucination rate (asc), and assign
/// ranks 1..=N in that order. Ties keep matrix order.
pub fn rank_results(results: &mut [CombinationResult]) {
    results.sort_by(|a, b| {
        b.critical_detection_rate
            .total_cmp(&a.critical_detection_rate)
            .then(a.hallucination_rate.total_cmp(&b.hallucination_rate))
    });
    for (idx, result) in results.iter_mut().enumerate() {
        result.rank = Some(idx + 1);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "combination task panicked".to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

async fn log_combination_summary(tracker: &RunTracker, c: &CombinationResult) {
    tracker.append_log("").await;
    tracker
        .append_log(format!("  Results for {} + {}:", c.model, c.prompt_id))
        .await;
    tracker
        .append_log(format!(
            "     Critical Detection: {:.1}%",
            c.critical_detection_rate * 100.0
        ))
        .await;
    tracker
        .append_log(format!(
            "     Hallucination Rate: {:.1}%",
            c.hallucination_rate * 100.0
        ))
        .await;
    tracker
        .append_log(format!(
            "     Helpfulness Rate: {:.1}%",
            c.helpfulness_rate * 100.0
        ))
        .await;
    tracker
        .append_log(format!(
            "     Status: {}",
            if c.passed { "PASSED" } else { "FILTERED" }
        ))
        .await;
}

async fn log_run_summary(tracker: &RunTracker, results: &[CombinationResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    tracker.append_log("").await;
    tracker.append_log(BANNER).await;
    tracker.append_log("EVALUATION COMPLETE").await;
    tracker.append_log(BANNER).await;
    tracker
        .append_log(format!("Passed: {}/{}", passed, results.len()))
        .await;
    tracker
        .append_log(format!(
            "Filtered: {}/{}",
            results.len() - passed,
            results.len()
        ))
        .await;

    for r in results.iter().filter(|r| r.rank.is_some()) {
        tracker
            .append_log(format!(
                "#{} {} + {} ({:?})",
                r.rank.unwrap_or_default(),
                r.model,
                r.prompt_id,
                r.verdict
            ))
            .await;
    }
}
