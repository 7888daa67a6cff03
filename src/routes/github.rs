use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::config::DEFAULT_PR_LIMIT;
use crate::error::EvalError;
use crate::github::ClosedPrs;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct FetchPrsRequest {
    pub repo_url: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PR_LIMIT
}

/// POST /api/prs: closed PRs (with diffs) of a GitHub repository.
pub async fn fetch_prs(
    State(state): State<SharedState>,
    Json(body): Json<FetchPrsRequest>,
) -> Result<Json<ClosedPrs>, EvalError> {
    let prs = state
        .github
        .fetch_closed_prs(&body.repo_url, body.limit)
        .await?;
    Ok(Json(prs))
}
