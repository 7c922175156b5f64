//! Task runner - drives one task through the download of all its files

use std::path::PathBuf;
use std::sync::Arc;

use bon::Builder;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::http::{FetchError, FetchedFile, Fetcher};
use crate::ledger::{LedgerError, TaskStore};
use crate::observability::Metrics;
use crate::task::{FileStatus, TaskStatus};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to create download directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file index {index} out of range for task with {len} file(s)")]
    FileIndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// How a call to [`TaskProcessor::process`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Every file was attempted and a terminal status was stored
    Finished(TaskStatus),
    /// Cancellation was observed between files; the task stays in Processing
    Interrupted { remaining: usize },
}

/// Downloads a task's files one after another, in URL order
///
/// Holds only task ids. Every step re-reads the task from the ledger and
/// writes it back, so concurrent readers see progress file by file.
#[derive(Builder)]
pub struct TaskProcessor {
    ledger: Arc<dyn TaskStore>,
    fetcher: Arc<dyn Fetcher>,
    #[builder(into)]
    download_dir: PathBuf,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl TaskProcessor {
    pub fn ledger(&self) -> &Arc<dyn TaskStore> {
        &self.ledger
    }

    /// Directory holding the files of one task
    pub fn task_dir(&self, task_id: Uuid) -> PathBuf {
        self.download_dir.join(task_id.to_string())
    }

    /// Process a task end to end.
    ///
    /// Per-file failures are recorded on the file and do not stop the loop.
    /// Ledger failures abort and propagate. `cancel` is only checked between
    /// files; an in-flight download always runs to completion or timeout.
    pub async fn process(&self, task_id: Uuid, cancel: &CancellationToken) -> Result<ProcessOutcome> {
        let mut task = self.ledger.get(task_id).await?;
        task.advance(TaskStatus::Processing);
        self.ledger.update(&task).await?;

        info!(task_id = %task_id, files = task.files().len(), "Processing task");

        let task_dir = self.task_dir(task_id);
        if let Err(source) = tokio::fs::create_dir_all(&task_dir).await {
            let err = ProcessError::CreateDir {
                path: task_dir,
                source,
            };
            warn!(task_id = %task_id, error = %err, "Task failed before any download");
            task.set_error(err.to_string());
            self.ledger.update(&task).await?;
            self.metrics.task_failed();
            return Err(err);
        }

        let file_count = task.files().len();
        for index in 0..file_count {
            if cancel.is_cancelled() {
                let remaining = file_count - index;
                info!(task_id = %task_id, remaining, "Processing interrupted by shutdown");
                return Ok(ProcessOutcome::Interrupted { remaining });
            }

            // Kept from a run interrupted by a restart
            if task.files()[index].status == FileStatus::Completed {
                debug!(task_id = %task_id, file_index = index, "File already downloaded, skipping");
                continue;
            }

            let url = task.files()[index].url.clone();
            let result = self.fetch(&url, task_id, index).await;

            // Make sure the attempt is visible even if `fetch` could not persist it
            let mut current = self.ledger.get(task_id).await?;
            match &result {
                Ok(fetched) => {
                    self.metrics.file_downloaded();
                    debug!(task_id = %task_id, file_index = index, size = fetched.size, "File downloaded");
                }
                Err(e) => {
                    self.metrics.file_failed();
                    warn!(task_id = %task_id, file_index = index, url = %url, error = %e, "File download failed");
                    if current.file(index).map(|f| f.status) != Some(FileStatus::Failed) {
                        current.fail_file(index, e.to_string());
                    }
                }
            }
            self.ledger.update(&current).await?;
        }

        let mut task = self.ledger.get(task_id).await?;
        let status = task.finish();
        self.ledger.update(&task).await?;

        match status {
            TaskStatus::Completed => self.metrics.task_completed(),
            _ => self.metrics.task_failed(),
        }
        info!(
            task_id = %task_id,
            status = ?status,
            completed = task.completed_count(),
            failed = task.failed_count(),
            "Task finished"
        );

        Ok(ProcessOutcome::Finished(status))
    }

    /// Download file `index` of a task and record the outcome on that file.
    ///
    /// Any failure after the index check marks the file Failed with the error
    /// text before it is returned.
    pub async fn fetch(&self, url: &str, task_id: Uuid, index: usize) -> Result<FetchedFile> {
        let mut task = self.ledger.get(task_id).await?;
        let len = task.files().len();
        if index >= len {
            return Err(ProcessError::FileIndexOutOfRange { index, len });
        }

        task.start_file(index);
        self.ledger.update(&task).await?;

        let dest_dir = self.task_dir(task_id);
        let (started, destination) = oneshot::channel::<PathBuf>();
        let record_path = async {
            if let Ok(path) = destination.await {
                debug!(task_id = %task_id, file_index = index, path = %path.display(), "Writing file");
                task.set_file_path(index, path);
                self.ledger.update(&task).await?;
            }
            Ok::<_, LedgerError>(())
        };
        let (result, recorded) =
            tokio::join!(self.fetcher.download(url, &dest_dir, started), record_path);
        recorded?;

        match result {
            Ok(fetched) => {
                task.complete_file(index, fetched.path.clone(), fetched.size);
                self.ledger.update(&task).await?;
                Ok(fetched)
            }
            Err(e) => {
                task.fail_file(index, e.to_string());
                self.ledger.update(&task).await?;
                Err(e.into())
            }
        }
    }
}
