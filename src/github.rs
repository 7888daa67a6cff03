use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{GITHUB_API_BASE, GITHUB_DIFF_MAX_CHARS, GITHUB_TIMEOUT_SECS};
use crate::error::EvalError;
use crate::evaluation::truncate_with_suffix;

const TRUNCATION_MARKER: &str = "\n... (truncated)";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("pr-review-eval/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequest {
    pub id: u64,
    pub title: String,
    pub diff: String,
    pub url: String,
    pub merged: bool,
    pub author: String,
    pub created_at: String,
    pub closed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPrs {
    pub repo: String,
    pub owner: String,
    pub repo_name: String,
    pub prs: Vec<PullRequest>,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    html_url: String,
    merged_at: Option<String>,
    user: Option<ApiUser>,
    created_at: String,
    closed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

const REPO_PATTERNS: [&str; 2] = [
    r"github\.com[/:]([^/]+)/([^/\s]+)",
    r"^([^/\s]+)/([^/\s]+)$",
];

fn repo_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        REPO_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Split a GitHub URL or `owner/repo` shorthand into (owner, repo).
pub fn parse_repo_url(url: &str) -> Result<(String, String), EvalError> {
    let url = url.trim();
    for pattern in repo_patterns() {
        if let Some(caps) = pattern.captures(url) {
            let owner = caps[1].to_string();
            let repo = caps[2]
                .trim_end_matches('/')
                .trim_end_matches(".git")
                .to_string();
            if !owner.is_empty() && !repo.is_empty() {
                return Ok((owner, repo));
            }
        }
    }
    Err(EvalError::InvalidRepo(url.to_string()))
}

pub struct GithubClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(GITHUB_API_BASE, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GITHUB_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            token,
            client,
        }
    }

    fn get(&self, path: &str, accept: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Most recently updated closed PRs, each with its (bounded) diff.
    pub async fn fetch_closed_prs(&self, repo_url: &str, limit: u32) -> Result<ClosedPrs, EvalError> {
        let (owner, repo) = parse_repo_url(repo_url)?;

        let pulls: Vec<ApiPull> = self
            .get(
                &format!(
                    "/repos/{}/{}/pulls?state=closed&sort=updated&direction=desc&per_page={}",
                    owner, repo, limit
                ),
                "application/vnd.github.v3+json",
            )
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EvalError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(e.to_string()))?;

        info!("Fetched {} closed PRs for {}/{}", pulls.len(), owner, repo);

        let mut prs = Vec::with_capacity(pulls.len());
        for pull in pulls {
            let diff = self.fetch_diff(&owner, &repo, pull.number).await;
            prs.push(PullRequest {
                id: pull.number,
                title: pull.title,
                diff,
                url: pull.html_url,
                merged: pull.merged_at.is_some(),
                author: pull.user.map(|u| u.login).unwrap_or_default(),
                created_at: pull.created_at,
                closed_at: pull.closed_at.unwrap_or_default(),
            });
        }

        Ok(ClosedPrs {
            repo: format!("{}/{}", owner, repo),
            owner,
            repo_name: repo,
            prs,
        })
    }

    /// Empty string when the diff cannot be fetched.
    async fn fetch_diff(&self, owner: &str, repo: &str, number: u64) -> String {
        let resp = self
            .get(
                &format!("/repos/{}/{}/pulls/{}", owner, repo, number),
                "application/vnd.github.v3.diff",
            )
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => match r.text().await {
                Ok(diff) => truncate_diff(&diff),
                Err(e) => {
                    warn!("Failed to read diff for #{}: {}", number, e);
                    String::new()
                }
            },
            Ok(r) => {
                warn!("Diff request for #{} returned {}", number, r.status());
                String::new()
            }
            Err(e) => {
                warn!("Diff request for #{} failed: {}", number, e);
                String::new()
            }
        }
    }
}

pub fn truncate_diff(diff: &str) -> String {
    truncate_with_suffix(diff, GITHUB_DIFF_MAX_CHARS, TRUNCATION_MARKER)
}
