use std::sync::Arc;

use crate::config::EvalConfig;
use crate::evaluation::candidate::CandidateRunner;
use crate::evaluation::dataset;
use crate::evaluation::engine::EvalContext;
use crate::evaluation::evaluator::ItemEvaluator;
use crate::evaluation::focus::FocusClassifier;
use crate::evaluation::judge::Judge;
use crate::evaluation::tracker::RunTracker;
use crate::evaluation::{EvalMode, EvaluationItem};
use crate::github::GithubClient;
use crate::llm::{ChatCompletionsClient, LlmClient};

pub struct AppState {
    pub config: EvalConfig,
    pub dataset: Arc<Vec<EvaluationItem>>,
    pub eval: Arc<EvalContext>,
    pub global: Arc<RunTracker>,
    pub repo: Arc<RunTracker>,
    pub focus: FocusClassifier,
    pub github: GithubClient,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: EvalConfig, dataset: Vec<EvaluationItem>) -> Self {
        let llm: Arc<dyn LlmClient> = Arc::new(ChatCompletionsClient::new(
            config.api_base.clone(),
            config.api_key.clone(),
        ));
        let github = GithubClient::new(config.github_token.clone());
        Self::with_clients(config, dataset, llm, github)
    }

    /// Wire the state around an explicit model client (tests pass a scripted one).
    pub fn with_clients(
        config: EvalConfig,
        dataset: Vec<EvaluationItem>,
        llm: Arc<dyn LlmClient>,
        github: GithubClient,
    ) -> Self {
        let evaluator = ItemEvaluator::new(
            CandidateRunner::new(llm.clone()),
            Judge::new(llm.clone(), config.judge_model.clone()),
        );

        let eval = EvalContext {
            models: config.models.clone(),
            prompts: dataset::system_prompts(),
            evaluator: Arc::new(evaluator),
            policy: config.policy,
        };

        Self {
            dataset: Arc::new(dataset),
            eval: Arc::new(eval),
            global: Arc::new(RunTracker::new(EvalMode::Global)),
            repo: Arc::new(RunTracker::new(EvalMode::Repo)),
            focus: FocusClassifier::new(llm, config.focus_model.clone()),
            github,
            config,
        }
    }

    pub fn tracker(&self, mode: EvalMode) -> &Arc<RunTracker> {
        match mode {
            EvalMode::Global => &self.global,
            EvalMode::Repo => &self.repo,
        }
    }
}
