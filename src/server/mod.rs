//! HTTP server module for the analytics API.

pub mod routes;
pub mod state;

use crate::error::AnalyticsResult;
use crate::server::routes::{catalog, config, health, pool, sessions};
use crate::server::state::AppState;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // CORS layer for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Catalog and ingestion
        .route("/api/events", post(catalog::post_events))
        .route("/api/event-types", get(catalog::get_event_types))
        .route("/api/users", get(catalog::get_users))
        .route("/api/users/interactions", get(catalog::get_user_interactions))
        // Pooled views
        .route("/api/pool", get(pool::get_event_pool))
        .route("/api/pool/time", get(pool::get_time_per_event_type))
        .route("/api/clicks", get(pool::get_clicks))
        .route("/api/selections", get(pool::get_selections))
        .route("/api/selections/values", get(pool::get_selection_values))
        .route(
            "/api/payloads/event-types",
            get(pool::get_payloads_by_event_type),
        )
        .route("/api/payloads/users", get(pool::get_actions_by_user))
        // Sessions
        .route("/api/sessions", get(sessions::get_sessions))
        .route(
            "/api/sessions/:session_id/timeline",
            get(sessions::get_session_timeline),
        )
        // Config API
        .route(
            "/api/config/:kind",
            get(config::get_config).post(config::post_config),
        )
        .route(
            "/api/config/:kind/:key",
            put(config::put_config).delete(config::delete_config),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Serves the API on `addr` until Ctrl-C.
pub async fn run_server(addr: SocketAddr, state: AppState) -> AnalyticsResult<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
