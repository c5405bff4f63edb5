//! RemesaRelay API server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use remesa_common::config::AppConfig;
use remesa_common::db::create_pool;

use remesa_api::routes::create_router;
use remesa_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("remesa_api=debug,remesa_engine=debug,remesa_transports=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting RemesaRelay API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Apply pending migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Build application state (transports, orchestrator, retry scheduler)
    let state = AppState::new(pool, &config);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
