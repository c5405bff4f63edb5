pub mod dispatch;
pub mod health;
pub mod notifications;
pub mod push_subscriptions;
pub mod retry;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(dispatch::router())
        .merge(notifications::router())
        .merge(push_subscriptions::router())
        .merge(retry::router())
        .with_state(state)
}
