//! Route definitions for the gateway API.

use super::handlers;
use super::state::RpcState;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the full router with all endpoints.
pub fn create_router(state: RpcState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_v1_routes() -> Router<RpcState> {
    Router::new()
        .route("/tx", post(handlers::submit_tx_handler))
        .route(
            "/mempool/snapshot",
            post(handlers::acquire_snapshot_handler),
        )
        .route(
            "/mempool/snapshot/{token}",
            delete(handlers::release_snapshot_handler),
        )
        .route(
            "/mempool/snapshot/{token}/sizes",
            get(handlers::snapshot_sizes_handler),
        )
        .route(
            "/mempool/snapshot/{token}/next",
            post(handlers::snapshot_next_tx_handler),
        )
        .route(
            "/mempool/snapshot/{token}/tx/{id}",
            get(handlers::snapshot_has_tx_handler),
        )
}
