//! Task and file records plus the status state machine.
//!
//! A [`Task`] owns one [`File`] per source URL, index for index. The URL list
//! and the file list are fixed at creation; only statuses, paths, sizes and
//! error messages change afterwards. All transitions here are pure: nothing in
//! this module touches the network, the filesystem or a store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// New and Processing tasks are eligible for dispatch (or already owned by a worker).
    pub fn is_pending(self) -> bool {
        matches!(self, TaskStatus::New | TaskStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

/// One URL-to-disk download record, embedded in its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl File {
    fn pending(url: String) -> Self {
        Self {
            url,
            path: None,
            size: None,
            status: FileStatus::Pending,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord")]
pub struct Task {
    pub id: Uuid,
    urls: Vec<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    files: Vec<File>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A stored task whose files do not line up with its URLs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedTask {
    #[error("task {id} has {files} file(s) for {urls} url(s)")]
    FileCount { id: Uuid, urls: usize, files: usize },

    #[error("task {id} file {index} does not belong to url {index}")]
    UrlMismatch { id: Uuid, index: usize },
}

/// Wire shape of [`Task`], checked before it becomes one
#[derive(Deserialize)]
struct TaskRecord {
    id: Uuid,
    urls: Vec<String>,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    files: Vec<File>,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = MalformedTask;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        if record.files.len() != record.urls.len() {
            return Err(MalformedTask::FileCount {
                id: record.id,
                urls: record.urls.len(),
                files: record.files.len(),
            });
        }
        if let Some(index) = record
            .files
            .iter()
            .zip(&record.urls)
            .position(|(file, url)| &file.url != url)
        {
            return Err(MalformedTask::UrlMismatch { id: record.id, index });
        }

        Ok(Self {
            id: record.id,
            urls: record.urls,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            files: record.files,
            error: record.error,
        })
    }
}

impl Task {
    /// Create a task in `New` with one `Pending` file per URL.
    pub fn new(urls: Vec<String>) -> Self {
        let now = Utc::now();
        let files = urls.iter().cloned().map(File::pending).collect();

        Self {
            id: Uuid::now_v7(),
            urls,
            status: TaskStatus::New,
            created_at: now,
            updated_at: now,
            files,
            error: None,
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Option<&File> {
        self.files.get(index)
    }

    /// Set the status and stamp the update time. The caller is trusted to
    /// only move New -> Processing -> Completed | Failed.
    pub fn advance(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    /// Record a task-level error. Forces `Failed` from any state.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.advance(TaskStatus::Failed);
    }

    /// True iff there is at least one file and every file is Completed.
    pub fn is_completed(&self) -> bool {
        !self.files.is_empty()
            && self
                .files
                .iter()
                .all(|file| file.status == FileStatus::Completed)
    }

    /// True iff any file is Failed, whatever the others are doing.
    pub fn is_failed(&self) -> bool {
        self.files
            .iter()
            .any(|file| file.status == FileStatus::Failed)
    }

    pub fn completed_count(&self) -> usize {
        self.count(FileStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(FileStatus::Failed)
    }

    /// Percentage of completed files, rounded down. Zero for an empty task.
    pub fn progress(&self) -> u8 {
        if self.files.is_empty() {
            return 0;
        }
        (self.completed_count() * 100 / self.files.len()) as u8
    }

    /// Mark file `index` as Downloading. Returns false if out of range.
    pub fn start_file(&mut self, index: usize) -> bool {
        let Some(file) = self.files.get_mut(index) else {
            return false;
        };
        file.status = FileStatus::Downloading;
        file.error = None;
        self.touch();
        true
    }

    pub fn complete_file(&mut self, index: usize, path: PathBuf, size: u64) -> bool {
        let Some(file) = self.files.get_mut(index) else {
            return false;
        };
        file.path = Some(path);
        file.size = Some(size);
        file.status = FileStatus::Completed;
        file.error = None;
        self.touch();
        true
    }

    pub fn fail_file(&mut self, index: usize, message: impl Into<String>) -> bool {
        let Some(file) = self.files.get_mut(index) else {
            return false;
        };
        file.status = FileStatus::Failed;
        file.error = Some(message.into());
        self.touch();
        true
    }

    /// Record where a file is being written before the body arrives.
    pub fn set_file_path(&mut self, index: usize, path: PathBuf) -> bool {
        let Some(file) = self.files.get_mut(index) else {
            return false;
        };
        file.path = Some(path);
        self.touch();
        true
    }

    /// Compute and apply the terminal status once every file has been attempted.
    ///
    /// Completed when all files completed, Failed otherwise. A task with files
    /// that never reached a terminal state is failed with an explanation rather
    /// than left in Processing.
    pub fn finish(&mut self) -> TaskStatus {
        if self.is_completed() {
            self.advance(TaskStatus::Completed);
        } else if self.is_failed() {
            self.advance(TaskStatus::Failed);
        } else {
            let unfinished = self.files.len() - self.completed_count();
            self.set_error(format!("{unfinished} file(s) were not downloaded"));
        }
        self.status
    }

    /// Put an interrupted task back to `New` so it can be dispatched again.
    /// Completed files are kept; everything else returns to Pending.
    pub fn reset_interrupted(&mut self) {
        for file in &mut self.files {
            if file.status != FileStatus::Completed {
                file.status = FileStatus::Pending;
                file.error = None;
            }
        }
        self.advance(TaskStatus::New);
    }

    fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|file| file.status == status).count()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> Task {
        Task::new(vec![
            "https://x/a.jpg".to_string(),
            "https://x/b.pdf".to_string(),
        ])
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = sample_task();

        assert_eq!(task.status, TaskStatus::New);
        assert_eq!(task.files().len(), task.urls().len());
        assert!(task.files().iter().all(|f| f.status == FileStatus::Pending));
        for (file, url) in task.files().iter().zip(task.urls()) {
            assert_eq!(&file.url, url);
        }
        assert_eq!(task.progress(), 0);
        assert!(task.status.is_pending());
    }

    #[test]
    fn test_progress_and_failure_scenario() {
        let mut task = sample_task();

        task.complete_file(0, PathBuf::from("downloads/a.jpg"), 10);
        assert_eq!(task.progress(), 50);
        assert!(!task.is_completed());

        task.fail_file(1, "HTTP 404: Not Found");
        assert!(task.is_failed());
        assert!(!task.is_completed());
        assert_eq!(task.progress(), 50);
    }

    #[test]
    fn test_progress_rounds_down() {
        let mut task = Task::new(vec!["a".into(), "b".into(), "c".into()]);
        task.complete_file(0, PathBuf::from("a"), 1);
        assert_eq!(task.progress(), 33);
        task.complete_file(1, PathBuf::from("b"), 1);
        assert_eq!(task.progress(), 66);
        task.complete_file(2, PathBuf::from("c"), 1);
        assert_eq!(task.progress(), 100);
        assert!(task.is_completed());
    }

    #[test]
    fn test_empty_task_is_never_completed() {
        let task = Task::new(Vec::new());
        assert!(!task.is_completed());
        assert!(!task.is_failed());
        assert_eq!(task.progress(), 0);
    }

    #[test]
    fn test_failed_detected_while_others_in_flight() {
        let mut task = sample_task();
        task.start_file(0);
        task.fail_file(1, "boom");
        assert!(task.is_failed());
    }

    #[test]
    fn test_set_error_forces_failed() {
        let mut task = sample_task();
        task.advance(TaskStatus::Completed);
        task.set_error("disk gone");

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("disk gone"));
    }

    #[test]
    fn test_file_transitions_out_of_range() {
        let mut task = sample_task();
        assert!(!task.start_file(2));
        assert!(!task.fail_file(5, "nope"));
        assert!(!task.complete_file(9, PathBuf::from("x"), 1));
        assert_eq!(task.files().len(), 2);
    }

    #[test]
    fn test_finish() {
        let mut task = sample_task();
        task.complete_file(0, PathBuf::from("a"), 1);
        task.complete_file(1, PathBuf::from("b"), 2);
        assert_eq!(task.finish(), TaskStatus::Completed);

        let mut task = sample_task();
        task.complete_file(0, PathBuf::from("a"), 1);
        task.fail_file(1, "timeout");
        assert_eq!(task.finish(), TaskStatus::Failed);
        assert!(task.error.is_none());

        let mut task = sample_task();
        task.complete_file(0, PathBuf::from("a"), 1);
        assert_eq!(task.finish(), TaskStatus::Failed);
        assert!(task.error.is_some());
    }

    #[test]
    fn test_reset_interrupted_keeps_completed_files() {
        let mut task = sample_task();
        task.advance(TaskStatus::Processing);
        task.complete_file(0, PathBuf::from("a"), 1);
        task.start_file(1);

        task.reset_interrupted();

        assert_eq!(task.status, TaskStatus::New);
        assert_eq!(task.files()[0].status, FileStatus::Completed);
        assert_eq!(task.files()[1].status, FileStatus::Pending);
    }

    #[test]
    fn test_json_shape() {
        let mut task = sample_task();
        task.fail_file(1, "HTTP 500");
        let value = serde_json::to_value(&task).unwrap();

        assert_eq!(value["status"], "new");
        assert_eq!(value["urls"][0], "https://x/a.jpg");
        assert_eq!(value["files"][0]["status"], "pending");
        assert!(value["files"][0].get("path").is_none());
        assert!(value["files"][0].get("error").is_none());
        assert_eq!(value["files"][1]["error"], "HTTP 500");
        assert!(value.get("error").is_none());

        let parsed: Task = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn test_deserialize_checks_files_against_urls() {
        let task = sample_task();
        let mut value = serde_json::to_value(&task).unwrap();
        assert_eq!(serde_json::from_value::<Task>(value.clone()).unwrap(), task);

        value["files"].as_array_mut().unwrap().pop();
        let err = serde_json::from_value::<Task>(value.clone()).unwrap_err();
        assert!(err.to_string().contains("has 1 file(s) for 2 url(s)"));

        value["files"] = json!([
            { "url": "https://x/b.pdf", "status": "pending" },
            { "url": "https://x/a.jpg", "status": "pending" }
        ]);
        let err = serde_json::from_value::<Task>(value).unwrap_err();
        assert!(err.to_string().contains("file 0 does not belong"));
    }
}
