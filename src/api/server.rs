use anyhow::Result;
use axum::{
    routing::{get, head},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::engine::RuntimeContext;
use crate::storage::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub runtime: Arc<RuntimeContext>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/state/:id",
            get(handlers::get_state)
                .post(handlers::create_state)
                .put(handlers::update_state)
                .delete(handlers::delete_state),
        )
        .route("/api/heartbeat", get(handlers::heartbeat))
        .route(
            "/api/events",
            head(handlers::online_status).post(handlers::send_instructions),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the coordination API until `shutdown` is cancelled.
pub async fn serve(state: AppState, port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    log::info!("Coordination API listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
