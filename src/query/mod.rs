pub mod handler;
pub mod lookup;

use axum::routing::get;
use axum::Router;
use handler::QueryState;
use std::sync::Arc;

/// Read-only ranking and lookup routes.
pub fn router(state: Arc<QueryState>) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/v1/problems/hot", get(handler::hot_problems))
        .route("/v1/problems/longterm", get(handler::longterm_problems))
        .route("/v1/problems/{id}", get(handler::get_problem))
        .route("/v1/releases", get(handler::release_ids))
        .route("/v1/components/stats", get(handler::component_stats))
        .with_state(state)
}
