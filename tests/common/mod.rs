#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use pr_review_eval::config::EvalConfig;
use pr_review_eval::evaluation::tracker::RunTracker;
use pr_review_eval::evaluation::{EvaluationItem, PassPolicy};
use pr_review_eval::github::GithubClient;
use pr_review_eval::llm::{CompletionRequest, LlmClient};
use pr_review_eval::state::AppState;

/// Which collaborator a recorded request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Review,
    Critical,
    Hallucination,
    Helpfulness,
    Focus,
}

pub fn call_kind(request: &CompletionRequest) -> CallKind {
    if request.system.is_some() {
        CallKind::Review
    } else if request.user.contains("critical issue detection") {
        CallKind::Critical
    } else if request.user.contains("for hallucinations") {
        CallKind::Hallucination
    } else if request.user.contains("for helpfulness") {
        CallKind::Helpfulness
    } else {
        CallKind::Focus
    }
}

type Script = dyn Fn(&CompletionRequest) -> anyhow::Result<String> + Send + Sync;

/// `LlmClient` double answering from a closure and recording every request.
/// With a gate, review calls block until `open_gate` is called.
pub struct ScriptedLlm {
    script: Box<Script>,
    calls: Mutex<Vec<CompletionRequest>>,
    gate: Option<Semaphore>,
}

impl ScriptedLlm {
    pub fn new(
        script: impl Fn(&CompletionRequest) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(
        script: impl Fn(&CompletionRequest) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(script)
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter(|c| call_kind(c) == kind)
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        if call_kind(&request) == CallKind::Review {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await?;
            }
        }
        self.calls.lock().unwrap().push(request.clone());
        (self.script)(&request)
    }
}

/// Review "looks fine", critical found, no hallucination, helpful.
pub fn happy_script(request: &CompletionRequest) -> anyhow::Result<String> {
    Ok(match call_kind(request) {
        CallKind::Review => "The query concatenates user input; use bind parameters.".to_string(),
        CallKind::Critical => r#"{"judgment": "Yes", "explanation": "SQL injection called out"}"#.to_string(),
        CallKind::Hallucination => r#"{"judgment": "No", "explanation": "All claims grounded"}"#.to_string(),
        CallKind::Helpfulness => r#"{"judgment": "Yes", "explanation": "Concrete fix"}"#.to_string(),
        CallKind::Focus => r#"{"focus": "input_validation", "explanation": "unchecked input"}"#.to_string(),
    })
}

pub fn item(id: &str, focus: &str) -> EvaluationItem {
    EvaluationItem {
        id: id.to_string(),
        diff: format!("+ // change for {}\n+ let q = format!(\"SELECT {{}}\", input);", id),
        expected_focus: focus.to_string(),
        description: String::new(),
    }
}

pub fn test_config(models: &[&str]) -> EvalConfig {
    EvalConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        dataset_path: PathBuf::from("data/global_eval_dataset.json"),
        api_base: "http://127.0.0.1:9".to_string(),
        api_key: None,
        github_token: None,
        credentials_path: PathBuf::from("/nonexistent/credentials.json"),
        models: models.iter().map(|m| m.to_string()).collect(),
        judge_model: "judge".to_string(),
        focus_model: "focus".to_string(),
        policy: PassPolicy::default(),
    }
}

pub fn test_state(
    models: &[&str],
    dataset: Vec<EvaluationItem>,
    llm: Arc<ScriptedLlm>,
) -> Arc<AppState> {
    Arc::new(AppState::with_clients(
        test_config(models),
        dataset,
        llm,
        GithubClient::with_base_url("http://127.0.0.1:9", None),
    ))
}

/// Poll until the tracker leaves the running state.
pub async fn wait_until_idle(tracker: &RunTracker) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while tracker.is_running().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run did not finish in time");
}
