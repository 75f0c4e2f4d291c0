mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agents::AgentRegistry;
use crate::clock::Clock;
use crate::engine::RunAdvancer;
use crate::storage::RunStore;

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub store: Arc<dyn RunStore>,
    pub advancer: Arc<RunAdvancer>,
    pub clock: Arc<dyn Clock>,
}

/// Build the API router. Factored out of `serve` so tests can drive it
/// without a listener.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/runs", post(handlers::launch_run))
        .route("/runs", get(handlers::list_runs))
        .route("/runs/{id}", get(handlers::get_run))
        .route("/runs/{id}", delete(handlers::delete_run))
        .route("/runs/{id}/advance", post(handlers::advance_run))
        .route("/runs/{id}/retry", post(handlers::retry_run))
        .route("/runs/{id}/cancel", post(handlers::cancel_run))
        .route("/agents", get(handlers::list_agents))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the REST API server.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("stepline API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
