// HTTP route handlers for the Arbiter API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use arbiter_common::problems::{ProblemStore, ProblemSummary};
use arbiter_common::types::{EvaluationRequest, EvaluationResponse, Submission};
use std::sync::Arc;
use tracing::{error, info};

use crate::metrics;
use crate::AppState;

/// POST /run - Judge a submission synchronously
///
/// Always 200 once the body parses: failing and erroring submissions are
/// verdicts, not HTTP errors.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluationRequest>,
) -> Response {
    let _permit = match &state.limiter {
        Some(limiter) => match limiter.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                error!(error = %e, "Evaluation limiter closed");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({ "error": "Evaluator is shutting down" })),
                )
                    .into_response();
            }
        },
        None => None,
    };

    let submission = Submission::from(payload);
    let verdict = state.judge.evaluate(&submission).await;
    metrics::record(&verdict);

    info!(
        evaluation_id = %verdict.evaluation_id,
        problem_id = %verdict.problem_id,
        passed = verdict.passed,
        cases_run = verdict.results.len(),
        elapsed_ms = verdict.elapsed_ms,
        "Evaluation complete"
    );

    (StatusCode::OK, Json(EvaluationResponse::from(&verdict))).into_response()
}

/// GET /problems - Problem index
pub async fn list_problems(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summaries: Vec<ProblemSummary> = state
        .judge
        .store()
        .list()
        .iter()
        .map(|problem| ProblemSummary::from(problem.as_ref()))
        .collect();

    (StatusCode::OK, Json(summaries))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn get_metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)).into_response()
        }
    }
}
