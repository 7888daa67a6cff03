use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::EvalError;
use crate::evaluation::engine::{self, StartAck};
use crate::evaluation::tracker::RunSnapshot;
use crate::evaluation::{CombinationResult, EvalMode, EvaluationItem, SystemPrompt};
use crate::state::SharedState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RepoStartRequest {
    #[serde(default)]
    pub items: Vec<EvaluationItem>,
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    pub prompts: Vec<SystemPrompt>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub judge_model: String,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub status: String,
    pub results: Vec<CombinationResult>,
}

#[derive(Debug, Deserialize)]
pub struct FocusItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub diff: String,
}

#[derive(Debug, Deserialize)]
pub struct FocusRequest {
    pub items: Vec<FocusItem>,
}

#[derive(Debug, Serialize)]
pub struct FocusResult {
    pub id: String,
    pub focus: String,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct FocusResponse {
    pub results: Vec<FocusResult>,
}

// ============================================================================
// Routes
// ============================================================================

pub fn eval_routes() -> Router<SharedState> {
    Router::new()
        .route("/eval/prompts", get(prompts_handler))
        .route("/eval/models", get(models_handler))
        .route("/eval/{mode}/start", post(start_handler))
        .route("/eval/focus", post(focus_handler))
        .route("/eval/{mode}/status", get(status_handler))
        .route("/eval/{mode}/results", get(results_handler))
        .route("/eval/{mode}/logs/stream", get(log_stream_handler))
}

// ============================================================================
// Handlers
// ============================================================================

async fn prompts_handler(State(state): State<SharedState>) -> Json<PromptsResponse> {
    Json(PromptsResponse {
        prompts: state.eval.prompts.clone(),
    })
}

async fn models_handler(State(state): State<SharedState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.eval.models.clone(),
        judge_model: state.eval.evaluator.judge().model().to_string(),
    })
}

/// POST /api/eval/{mode}/start: global runs use the bundled dataset, repo
/// runs the items in the request body.
async fn start_handler(
    State(state): State<SharedState>,
    Path(mode): Path<EvalMode>,
    body: Option<Json<RepoStartRequest>>,
) -> Result<Json<StartAck>, EvalError> {
    let items = match mode {
        EvalMode::Global => state.dataset.clone(),
        EvalMode::Repo => Arc::new(body.map(|Json(b)| b.items).unwrap_or_default()),
    };

    let ack = engine::start_run(state.eval.clone(), state.tracker(mode).clone(), items).await?;
    Ok(Json(ack))
}

async fn status_handler(
    State(state): State<SharedState>,
    Path(mode): Path<EvalMode>,
) -> Json<RunSnapshot> {
    Json(state.tracker(mode).snapshot().await)
}

async fn results_handler(
    State(state): State<SharedState>,
    Path(mode): Path<EvalMode>,
) -> Result<Json<ResultsResponse>, EvalError> {
    let results = state
        .tracker(mode)
        .results()
        .await
        .ok_or(EvalError::NoResults(mode))?;

    Ok(Json(ResultsResponse {
        status: "complete".to_string(),
        results: results.as_ref().clone(),
    }))
}

/// GET /api/eval/{mode}/logs/stream: SSE of run log lines as they happen.
async fn log_stream_handler(
    State(state): State<SharedState>,
    Path(mode): Path<EvalMode>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.tracker(mode).logs().subscribe();

    let event_stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let data = serde_json::to_string(&entry).unwrap_or_default();
            Some(Ok(Event::default().event("log").data(data)))
        }
        // Lagged receivers skip ahead
        Err(_) => None,
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

/// POST /api/eval/focus: expected-focus label for each PR, in input order.
async fn focus_handler(
    State(state): State<SharedState>,
    Json(body): Json<FocusRequest>,
) -> Json<FocusResponse> {
    let mut results = Vec::with_capacity(body.items.len());
    for item in body.items {
        let classification = state.focus.classify(&item.diff, &item.title).await;
        results.push(FocusResult {
            id: item.id,
            focus: classification.focus,
            explanation: classification.explanation,
        });
    }
    Json(FocusResponse { results })
}
