//! Push subscription CRUD routes.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use uuid::Uuid;

use remesa_common::error::AppError;
use remesa_common::types::PushSubscription;
use remesa_engine::subscriptions::{PushSubscriptionService, RegisterSubscriptionParams};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/push/subscriptions", post(register_subscription))
        .route("/api/push/subscriptions", delete(unsubscribe))
        .route("/api/push/subscriptions/{user_id}", get(list_subscriptions))
}

/// POST /api/push/subscriptions — Register or refresh a subscription
/// (upsert by endpoint).
async fn register_subscription(
    State(state): State<AppState>,
    Json(params): Json<RegisterSubscriptionParams>,
) -> Result<Json<PushSubscription>, AppError> {
    let subscription = PushSubscriptionService::upsert(&state.pool, &params).await?;
    Ok(Json(subscription))
}

#[derive(Debug, serde::Deserialize)]
struct UnsubscribeParams {
    endpoint: String,
}

/// DELETE /api/push/subscriptions — Mark a subscription inactive by endpoint.
async fn unsubscribe(
    State(state): State<AppState>,
    Json(params): Json<UnsubscribeParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deactivated = PushSubscriptionService::deactivate(&state.pool, &params.endpoint).await?;
    Ok(Json(serde_json::json!({ "deactivated": deactivated })))
}

/// GET /api/push/subscriptions/:user_id — List a user's active subscriptions.
async fn list_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<PushSubscription>>, AppError> {
    let subscriptions =
        PushSubscriptionService::list_active_for_user(&state.pool, user_id).await?;
    Ok(Json(subscriptions))
}
