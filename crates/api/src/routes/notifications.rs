//! Administrative read surface over delivery records.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use remesa_common::error::AppError;
use remesa_common::types::{Channel, DeliveryState, NotificationRecord};
use remesa_engine::store::DeliveryStats;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/stats", get(notification_stats))
        .route("/api/notifications/{id}/retry", post(retry_notification))
}

#[derive(Debug, serde::Deserialize)]
struct ListParams {
    state: Option<DeliveryState>,
    channel: Option<Channel>,
    limit: Option<i64>,
}

/// GET /api/notifications — List delivery records, newest first.
async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<NotificationRecord>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let records = state
        .store
        .list(params.state, params.channel, limit)
        .await?;
    Ok(Json(records))
}

/// GET /api/notifications/stats — Counts per state and channel.
async fn notification_stats(
    State(state): State<AppState>,
) -> Result<Json<DeliveryStats>, AppError> {
    let stats = state.store.stats().await?;
    Ok(Json(stats))
}

/// POST /api/notifications/:id/retry — Manually re-dispatch one record.
async fn retry_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationRecord>, AppError> {
    let record = state.scheduler.retry_record(id).await?;
    Ok(Json(record))
}
