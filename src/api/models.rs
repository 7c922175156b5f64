//! Request and response bodies for the task API.
//!
//! Creating a task:
//!
//! ```json
//! { "urls": ["https://example.com/a.jpg", "https://example.com/b.pdf"] }
//! ```
//!
//! Tasks themselves are returned as [`crate::task::Task`] JSON. The status
//! endpoint returns a [`TaskStatusResponse`], which adds a progress
//! percentage and drops the URL list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::MetricsSnapshot;
use crate::task::{File, Task, TaskStatus};

#[derive(Debug, Deserialize, Clone)]
pub struct CreateTaskRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskStatusResponse {
    pub id: Uuid,
    pub status: TaskStatus,
    /// Percentage of files downloaded successfully
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub files: Vec<File>,
}

impl From<&Task> for TaskStatusResponse {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            progress: task.progress(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            files: task.files().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub total: usize,
    pub busy: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub components: BTreeMap<String, String>,
    pub workers: WorkerStats,
    pub metrics: MetricsSnapshot,
}
