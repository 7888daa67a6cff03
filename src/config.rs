use clap::Parser;
use std::path::PathBuf;

use crate::evaluation::PassPolicy;
use crate::settings::Credentials;

/// PR Review Eval: ranks (model × system prompt) combinations on code review quality.
#[derive(Parser, Debug, Clone)]
#[command(name = "pr-review-eval")]
pub struct CliArgs {
    /// HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Bind address
    #[arg(long = "host", default_value = "0.0.0.0")]
    pub host: String,

    /// Static evaluation dataset (JSON array of items)
    #[arg(short = 'D', long = "dataset", default_value = DEFAULT_DATASET_PATH)]
    pub dataset: PathBuf,

    /// Base URL of the OpenAI-compatible chat completions API
    #[arg(long = "api-base", env = "PR_EVAL_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// API key for candidate, judge and focus calls
    #[arg(long = "api-key", env = "PERPLEXITY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// GitHub token for fetching pull requests
    #[arg(long = "github-token", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Credential file (defaults to <config dir>/pr-review-eval/credentials.json)
    #[arg(long = "credentials")]
    pub credentials: Option<PathBuf>,

    /// Candidate models, evaluated in this order
    #[arg(short = 'm', long = "models", value_delimiter = ',', default_values_t = default_models())]
    pub models: Vec<String>,

    /// Model used by the judge
    #[arg(long = "judge-model", default_value = DEFAULT_JUDGE_MODEL)]
    pub judge_model: String,

    /// Model used to classify the expected focus of a PR
    #[arg(long = "focus-model", default_value = DEFAULT_FOCUS_MODEL)]
    pub focus_model: String,

    /// Minimum critical detection rate for a combination to pass
    #[arg(long = "min-critical-rate", default_value_t = PASS_MIN_CRITICAL_RATE)]
    pub min_critical_rate: f64,

    /// Maximum hallucination rate for a combination to pass
    #[arg(long = "max-hallucination-rate", default_value_t = PASS_MAX_HALLUCINATION_RATE)]
    pub max_hallucination_rate: f64,

    /// Write logs to this file instead of stdout
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Write the resolved API key and GitHub token to the credential file
    #[arg(long = "save-credentials")]
    pub save_credentials: bool,
}

pub struct EvalConfig {
    pub host: String,
    pub port: u16,
    pub dataset_path: PathBuf,
    pub api_base: String,
    pub api_key: Option<String>,
    pub github_token: Option<String>,
    pub credentials_path: PathBuf,
    pub models: Vec<String>,
    pub judge_model: String,
    pub focus_model: String,
    pub policy: PassPolicy,
}

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATASET_PATH: &str = "data/global_eval_dataset.json";
pub const DEFAULT_API_BASE: &str = "https://api.perplexity.ai";
pub const DEFAULT_JUDGE_MODEL: &str = "sonar";
pub const DEFAULT_FOCUS_MODEL: &str = "sonar";
pub const DEFAULT_MODELS: &[&str] = &["sonar", "sonar-pro"];
pub const GITHUB_API_BASE: &str = "https://api.github.com";

// Pass / verdict policy
pub const PASS_MIN_CRITICAL_RATE: f64 = 0.5;
pub const PASS_MAX_HALLUCINATION_RATE: f64 = 0.35;
pub const RECOMMEND_MIN_CRITICAL_RATE: f64 = 0.8;
pub const RECOMMEND_MAX_HALLUCINATION_RATE: f64 = 0.15;

// Run log constants
pub const LOG_BUFFER_SIZE: usize = 50;
pub const STATUS_LOG_TAIL: usize = 20;
pub const LOG_BROADCAST_CAPACITY: usize = 256;

// Truncation limits (in characters)
pub const JUDGE_FIELD_MAX_CHARS: usize = 2000;
pub const REVIEW_PREVIEW_CHARS: usize = 500;
pub const FOCUS_DIFF_MAX_CHARS: usize = 3000;
pub const GITHUB_DIFF_MAX_CHARS: usize = 10_000;
pub const KEYWORD_PREFIX_CHARS: usize = 30;

// Model call budgets
pub const REVIEW_MAX_TOKENS: u32 = 1024;
pub const REVIEW_TEMPERATURE: f32 = 0.3;
pub const JUDGE_MAX_TOKENS: u32 = 512;
pub const JUDGE_TEMPERATURE: f32 = 0.0;
pub const FOCUS_MAX_TOKENS: u32 = 256;
pub const FOCUS_TEMPERATURE: f32 = 0.1;

// HTTP constants
pub const LLM_TIMEOUT_SECS: u64 = 120;
pub const GITHUB_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PR_LIMIT: u32 = 20;

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

pub fn default_credentials_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pr-review-eval")
        .join("credentials.json")
}

impl EvalConfig {
    /// Resolve the final config. Values from the CLI or environment take
    /// precedence over the credential file.
    pub fn from_args(args: CliArgs, stored: Credentials) -> Self {
        let credentials_path = args
            .credentials
            .clone()
            .unwrap_or_else(default_credentials_path);

        let policy = PassPolicy {
            min_critical_rate: args.min_critical_rate,
            max_hallucination_rate: args.max_hallucination_rate,
            ..PassPolicy::default()
        };

        EvalConfig {
            host: args.host,
            port: args.port,
            dataset_path: args.dataset,
            api_base: args.api_base.trim_end_matches('/').to_string(),
            api_key: args.api_key.or(stored.perplexity_api_key),
            github_token: args.github_token.or(stored.github_token),
            credentials_path,
            models: args
                .models
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            judge_model: args.judge_model,
            focus_model: args.focus_model,
            policy,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
