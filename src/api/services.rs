use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use http_body_util::BodyExt;
use tracing::info;

use super::{
    error::ApiError,
    models::{CreateTaskRequest, HealthResponse, TaskStatusResponse, WorkerStats},
    state::AppState,
    utils::{parse_task_id, require_json, validate_body_size},
    validation::validate_create_request,
};
use crate::task::Task;

/// Create a download task (POST /tasks)
///
/// Stores a `New` task with one `Pending` file per URL, wakes the dispatch
/// loop and returns the task with 201. Dispatch happens asynchronously.
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;

    let limits = &state.config.server.api;
    let body_bytes = read_body(body, limits.max_payload_bytes.as_usize()).await?;

    let request: CreateTaskRequest = serde_json::from_slice(&body_bytes)?;
    validate_create_request(&request, limits.max_urls_per_task)
        .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let task = Task::new(request.urls);
    state.ledger.create(&task).await?;
    state.metrics.task_created();
    state.wake.notify_one();

    info!(task_id = %task.id, urls = task.urls().len(), "Task created");

    Ok((StatusCode::CREATED, Json(task)))
}

/// Reads the request body and enforces the size limit
///
/// Compressed bodies arrive here already inflated by the decompression layer.
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    validate_body_size(&data, max_size)?;

    Ok(data)
}

/// All tasks, oldest first (GET /tasks)
pub async fn list_tasks(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.ledger.get_all().await?;
    Ok(Json(tasks))
}

/// One task (GET /tasks/{id})
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.ledger.get(parse_task_id(&task_id)?).await?;
    Ok(Json(task))
}

/// Status and progress of one task (GET /tasks/{id}/status)
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.ledger.get(parse_task_id(&task_id)?).await?;
    Ok(Json(TaskStatusResponse::from(&task)))
}

/// Health check (GET /health)
///
/// 503 when the worker pool is not running or the ledger cannot be read.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    components.insert("api".to_string(), "healthy".to_string());

    let ledger_status = match state.ledger.get_pending().await {
        Ok(_) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {e}"),
    };
    components.insert("ledger".to_string(), ledger_status);

    let pool_status = if state.pool.is_running() {
        "healthy"
    } else {
        "stopped"
    };
    components.insert("worker_pool".to_string(), pool_status.to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status_code, overall) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        components,
        workers: WorkerStats {
            total: state.pool.worker_count(),
            busy: state.pool.busy_workers(),
        },
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
