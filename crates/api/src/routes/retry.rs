//! Retry trigger — the parameterless periodic invocation.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use remesa_common::error::AppError;
use remesa_engine::retry::RetryStats;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/retry/run", post(run_retry_queue))
}

/// POST /api/retry/run — Process the due retry batch. Intended to be hit by
/// an external scheduler (cron or equivalent); safe to trigger concurrently
/// because each record claim is atomic.
async fn run_retry_queue(State(state): State<AppState>) -> Result<Json<RetryStats>, AppError> {
    let stats = state.scheduler.process_retry_queue().await?;
    Ok(Json(stats))
}
