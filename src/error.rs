use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::evaluation::EvalMode;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Evaluation already running ({0})")]
    RunAlreadyActive(EvalMode),

    #[error("No evaluation results available for {0}. Start a run first.")]
    NoResults(EvalMode),

    #[error("Invalid GitHub repository: {0}")]
    InvalidRepo(String),

    #[error("Failed to fetch PRs: {0}")]
    Upstream(String),
}

impl IntoResponse for EvalError {
    fn into_response(self) -> Response {
        let status = match &self {
            EvalError::RunAlreadyActive(_) => StatusCode::CONFLICT,
            EvalError::NoResults(_) => StatusCode::NOT_FOUND,
            EvalError::InvalidRepo(_) => StatusCode::BAD_REQUEST,
            EvalError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            EvalError::RunAlreadyActive(_) => serde_json::json!({
                "status": "conflict",
                "error": self.to_string(),
            }),
            _ => serde_json::json!({
                "error": self.to_string(),
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
