//! Dispatch routes — the orchestrator's entry points over HTTP, for
//! domain collaborators that emit notification requests into this core.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use remesa_common::error::AppError;
use remesa_common::types::{ChannelDelivery, ContactRole, NotificationKind, RemesaOrder};
use remesa_engine::orchestrator::SendOptions;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/send", post(send_notification))
        .route("/api/notifications/order", post(send_order_notification))
        .route("/api/notifications/admins", post(send_to_admins))
        .route("/api/templates/reload", post(reload_templates))
}

#[derive(Debug, serde::Deserialize)]
struct SendParams {
    kind: NotificationKind,
    recipient: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    options: SendOptions,
}

/// POST /api/notifications/send — Render, persist, and dispatch one
/// notification across its resolved channels.
async fn send_notification(
    State(state): State<AppState>,
    Json(params): Json<SendParams>,
) -> Result<Json<Vec<ChannelDelivery>>, AppError> {
    let results = state
        .orchestrator
        .send(params.kind, &params.recipient, params.data, params.options)
        .await?;
    Ok(Json(results))
}

#[derive(Debug, serde::Deserialize)]
struct OrderParams {
    kind: NotificationKind,
    order: RemesaOrder,
    role: ContactRole,
    extra: Option<serde_json::Value>,
}

/// POST /api/notifications/order — Notify one party of a remittance order.
async fn send_order_notification(
    State(state): State<AppState>,
    Json(params): Json<OrderParams>,
) -> Result<Json<Vec<ChannelDelivery>>, AppError> {
    let results = state
        .orchestrator
        .send_order_notification(params.kind, &params.order, params.role, params.extra)
        .await?;
    Ok(Json(results))
}

#[derive(Debug, serde::Deserialize)]
struct AdminParams {
    kind: NotificationKind,
    #[serde(default)]
    data: serde_json::Value,
}

/// POST /api/notifications/admins — Fan a notification out to every
/// active administrator.
async fn send_to_admins(
    State(state): State<AppState>,
    Json(params): Json<AdminParams>,
) -> Result<Json<Vec<ChannelDelivery>>, AppError> {
    let results = state.orchestrator.send_to_admins(params.kind, params.data).await?;
    Ok(Json(results))
}

/// POST /api/templates/reload — Drop the template cache so edited
/// templates take effect without a restart.
async fn reload_templates(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.orchestrator.templates().reload().await;
    Json(serde_json::json!({ "reloaded": true }))
}
