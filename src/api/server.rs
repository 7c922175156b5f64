use axum::{Router, routing::get};
use tower_http::decompression::RequestDecompressionLayer;

use super::{
    services::{create_task, get_task, get_task_status, health, list_tasks},
    state::AppState,
};

/// Build the task API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/status", get(get_task_status))
        .route("/health", get(health))
        .with_state(state)
        // Inflate gzip request bodies before handlers see them
        .layer(RequestDecompressionLayer::new())
}
