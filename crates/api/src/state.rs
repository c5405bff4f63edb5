//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use remesa_common::config::AppConfig;
use remesa_engine::orchestrator::Orchestrator;
use remesa_engine::retry::RetryScheduler;
use remesa_engine::store::DeliveryStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<RetryScheduler>,
    pub store: DeliveryStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: &AppConfig) -> Self {
        let transports =
            remesa_transports::TransportRegistry::from_config(config, pool.clone());
        let orchestrator = Arc::new(Orchestrator::new(
            pool.clone(),
            transports.clone(),
            config.email_configured(),
        ));
        let scheduler = Arc::new(RetryScheduler::new(pool.clone(), transports));
        let store = DeliveryStore::new(pool.clone());

        Self {
            pool,
            orchestrator,
            scheduler,
            store,
        }
    }
}
