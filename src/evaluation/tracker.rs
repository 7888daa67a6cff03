use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{CombinationResult, EvalMode};
use crate::config::STATUS_LOG_TAIL;
use crate::error::EvalError;
use crate::log_capture::{LogEntry, LogLevel, LogState};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Complete,
}

/// Live state of the current (or last) run of one mode.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub running: bool,
    pub run_id: Option<String>,
    pub progress: usize,
    pub total: usize,
    pub current_model: String,
    pub current_prompt: String,
    pub current_pr: String,
    pub current_step: String,
    pub sub_progress: usize,
    pub sub_total: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    fn fresh(total: usize) -> Self {
        Self {
            running: true,
            run_id: Some(uuid::Uuid::new_v4().to_string()),
            total,
            current_step: "Initializing...".to_string(),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Seconds since the run started, measured now while running and frozen
    /// at the finish time afterwards.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        match self.started_at {
            Some(start) => {
                let end = if self.running {
                    now
                } else {
                    self.finished_at.unwrap_or(now)
                };
                (end - start).num_milliseconds().max(0) as f64 / 1000.0
            }
            None => 0.0,
        }
    }
}

/// Read view returned to status pollers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub mode: EvalMode,
    pub status: RunStatus,
    pub run_id: Option<String>,
    pub progress: usize,
    pub total: usize,
    pub current_model: String,
    pub current_prompt: String,
    pub current_pr: String,
    pub current_step: String,
    pub sub_progress: usize,
    pub sub_total: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_time: f64,
    pub logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<CombinationResult>>,
}

/// Single-flight guard, progress counters, rolling log and results cache for
/// one evaluation mode.
///
/// Lock order is `state` before `results` before the log buffer; the log
/// buffer is never held while taking another lock.
pub struct RunTracker {
    mode: EvalMode,
    state: RwLock<RunState>,
    results: RwLock<Option<Arc<Vec<CombinationResult>>>>,
    logs: LogState,
}

impl RunTracker {
    pub fn new(mode: EvalMode) -> Self {
        Self {
            mode,
            state: RwLock::new(RunState::default()),
            results: RwLock::new(None),
            logs: LogState::new(),
        }
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn logs(&self) -> &LogState {
        &self.logs
    }

    /// `idle -> running`. The check and the reset happen under one write
    /// lock, so two concurrent callers can never both start a run. On
    /// conflict nothing is touched.
    pub async fn try_begin(&self, total: usize) -> Result<String, EvalError> {
        let mut state = self.state.write().await;
        if state.running {
            return Err(EvalError::RunAlreadyActive(self.mode));
        }

        *state = RunState::fresh(total);
        *self.results.write().await = None;
        self.logs.clear().await;

        Ok(state.run_id.clone().unwrap_or_default())
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    pub async fn append_log(&self, message: impl Into<String>) {
        self.append_log_at(LogLevel::Info, message).await;
    }

    pub async fn append_log_at(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        info!(mode = %self.mode, "{}", message);
        self.logs.emit(level, message).await;
    }

    /// Enter a new combination: coordinates set, item counters reset.
    pub async fn begin_combination(&self, model: &str, prompt_id: &str, sub_total: usize) {
        let mut state = self.state.write().await;
        state.current_model = model.to_string();
        state.current_prompt = prompt_id.to_string();
        state.current_pr.clear();
        state.current_step = "Starting combination...".to_string();
        state.sub_progress = 0;
        state.sub_total = sub_total;
    }

    /// Mark item `index` (0-based) as the one being evaluated.
    pub async fn begin_item(&self, pr_id: &str, index: usize) {
        let mut state = self.state.write().await;
        state.current_pr = pr_id.to_string();
        state.current_step = format!("Evaluating PR {}/{}", index + 1, state.sub_total);
    }

    pub async fn finish_item(&self) {
        let mut state = self.state.write().await;
        state.sub_progress = (state.sub_progress + 1).min(state.sub_total);
    }

    pub async fn set_step(&self, step: impl Into<String>) {
        self.state.write().await.current_step = step.into();
    }

    /// One more combination done. Never moves past `total`.
    pub async fn advance(&self) {
        let mut state = self.state.write().await;
        state.progress = (state.progress + 1).min(state.total);
    }

    /// `running -> complete`: publish results, pin progress to `total`.
    pub async fn finish(&self, results: Vec<CombinationResult>) {
        let mut state = self.state.write().await;
        *self.results.write().await = Some(Arc::new(results));
        state.running = false;
        state.progress = state.total;
        state.current_step = "Complete".to_string();
        state.finished_at = Some(Utc::now());
    }

    pub async fn results(&self) -> Option<Arc<Vec<CombinationResult>>> {
        self.results.read().await.clone()
    }

    pub async fn state(&self) -> RunState {
        self.state.read().await.clone()
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let (state, results) = {
            let state = self.state.read().await;
            let results = self.results.read().await.clone();
            (state.clone(), results)
        };

        let status = if state.running {
            RunStatus::Running
        } else if results.is_some() {
            RunStatus::Complete
        } else {
            RunStatus::Idle
        };

        let logs = if status == RunStatus::Idle {
            Vec::new()
        } else {
            self.logs.tail(STATUS_LOG_TAIL).await
        };

        RunSnapshot {
            mode: self.mode,
            status,
            run_id: state.run_id.clone(),
            progress: state.progress,
            total: state.total,
            elapsed_time: state.elapsed_secs(Utc::now()),
            current_model: state.current_model,
            current_prompt: state.current_prompt,
            current_pr: state.current_pr,
            current_step: state.current_step,
            sub_progress: state.sub_progress,
            sub_total: state.sub_total,
            started_at: state.started_at,
            logs,
            results: results
                .filter(|_| status == RunStatus::Complete)
                .map(|r| r.as_ref().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_tracker_is_idle() {
        let tracker = RunTracker::new(EvalMode::Global);
        let snap = tracker.snapshot().await;
        assert_eq!(snap.status, RunStatus::Idle);
        assert_eq!(snap.progress, 0);
        assert_eq!(snap.elapsed_time, 0.0);
        assert!(snap.logs.is_empty());
        assert!(snap.results.is_none());
    }

    #[tokio::test]
    async fn test_try_begin_is_single_flight() {
        let tracker = RunTracker::new(EvalMode::Repo);
        let run_id = tracker.try_begin(4).await.unwrap();
        tracker.begin_combination("sonar", "prompt-1", 3).await;
        tracker.advance().await;

        let err = tracker.try_begin(10).await.unwrap_err();
        assert!(matches!(err, EvalError::RunAlreadyActive(EvalMode::Repo)));

        // Rejected start leaves the in-flight run untouched
        let state = tracker.state().await;
        assert_eq!(state.run_id.as_deref(), Some(run_id.as_str()));
        assert_eq!(state.total, 4);
        assert_eq!(state.progress, 1);
        assert_eq!(state.current_model, "sonar");
    }

    #[tokio::test]
    async fn test_advance_never_exceeds_total() {
        let tracker = RunTracker::new(EvalMode::Global);
        tracker.try_begin(2).await.unwrap();
        for _ in 0..5 {
            tracker.advance().await;
        }
        assert_eq!(tracker.state().await.progress, 2);
    }

    #[tokio::test]
    async fn test_finish_publishes_results_and_completes() {
        let tracker = RunTracker::new(EvalMode::Global);
        tracker.try_begin(3).await.unwrap();
        tracker.append_log("hello").await;
        tracker.finish(Vec::new()).await;

        let snap = tracker.snapshot().await;
        assert_eq!(snap.status, RunStatus::Complete);
        assert_eq!(snap.progress, 3);
        assert_eq!(snap.results, Some(Vec::new()));
        assert_eq!(snap.logs.len(), 1);
        assert!(tracker.results().await.is_some());
    }

    #[tokio::test]
    async fn test_new_run_clears_previous_results_and_logs() {
        let tracker = RunTracker::new(EvalMode::Global);
        tracker.try_begin(1).await.unwrap();
        tracker.append_log("first run").await;
        tracker.finish(Vec::new()).await;

        tracker.try_begin(1).await.unwrap();
        assert!(tracker.results().await.is_none());
        assert!(tracker.logs().history().await.is_empty());
        assert_eq!(tracker.snapshot().await.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_item_counters() {
        let tracker = RunTracker::new(EvalMode::Global);
        tracker.try_begin(1).await.unwrap();
        tracker.begin_combination("m", "p", 2).await;
        tracker.begin_item("pr-1", 0).await;
        tracker.finish_item().await;
        tracker.begin_item("pr-2", 1).await;

        let state = tracker.state().await;
        assert_eq!(state.current_pr, "pr-2");
        assert_eq!(state.current_step, "Evaluating PR 2/2");
        assert_eq!(state.sub_progress, 1);

        tracker.finish_item().await;
        tracker.finish_item().await;
        assert_eq!(tracker.state().await.sub_progress, 2);
    }

    #[tokio::test]
    async fn test_snapshot_log_tail_bounded() {
        let tracker = RunTracker::new(EvalMode::Global);
        tracker.try_begin(1).await.unwrap();
        for i in 0..(STATUS_LOG_TAIL + 7) {
            tracker.append_log(format!("line {}", i)).await;
        }
        let snap = tracker.snapshot().await;
        assert_eq!(snap.logs.len(), STATUS_LOG_TAIL);
        assert_eq!(
            snap.logs.last().unwrap().message,
            format!("line {}", STATUS_LOG_TAIL + 6)
        );
    }

    #[test]
    fn test_elapsed_frozen_after_finish() {
        let start = Utc::now() - chrono::Duration::seconds(30);
        let state = RunState {
            running: false,
            started_at: Some(start),
            finished_at: Some(start + chrono::Duration::seconds(10)),
            ..RunState::default()
        };
        assert_eq!(state.elapsed_secs(Utc::now()), 10.0);
    }

    #[test]
    fn test_elapsed_live_while_running() {
        let now = Utc::now();
        let state = RunState {
            running: true,
            started_at: Some(now - chrono::Duration::seconds(5)),
            ..RunState::default()
        };
        assert_eq!(state.elapsed_secs(now), 5.0);
    }
}
