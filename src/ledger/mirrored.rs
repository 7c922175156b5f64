use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::Result;
use super::memory::MemoryStore;
use super::{PersistentStore, TaskStore};
use crate::task::{Task, TaskStatus};

/// In-memory working set in front of a durable store
///
/// Reads are served from memory. Writes land in memory first and then in the
/// durable store; the first error aborts the write and is returned. There is
/// no transaction across the two, so a failed durable write leaves memory ahead
/// of disk until the next successful write of that task or the next restart.
pub struct MirroredStore {
    memory: MemoryStore,
    durable: Arc<dyn PersistentStore>,
}

/// Outcome of start-up synchronisation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub loaded: usize,
    pub recovered: usize,
}

impl MirroredStore {
    pub fn new(durable: Arc<dyn PersistentStore>) -> Self {
        Self {
            memory: MemoryStore::new(),
            durable,
        }
    }

    /// Load the durable store and copy every task into memory.
    ///
    /// Tasks left in `Processing` by a previous process are reset to `New`
    /// (completed files kept) and written back, so the dispatch loop picks
    /// them up again.
    pub async fn sync_from_durable(&self) -> Result<SyncStats> {
        self.durable.load().await?;
        let tasks = self.durable.get_all().await?;

        let mut stats = SyncStats {
            loaded: tasks.len(),
            ..SyncStats::default()
        };

        for mut task in tasks {
            if task.status == TaskStatus::Processing {
                warn!(task_id = %task.id, "Task was interrupted, resetting to new");
                task.reset_interrupted();
                self.durable.update(&task).await?;
                stats.recovered += 1;
            }
            self.memory.put(task).await;
        }

        info!(
            loaded = stats.loaded,
            recovered = stats.recovered,
            "Synchronised tasks from durable store"
        );
        Ok(stats)
    }

    /// Flush the durable store.
    pub async fn save(&self) -> Result<()> {
        self.durable.save().await
    }
}

#[async_trait]
impl TaskStore for MirroredStore {
    async fn create(&self, task: &Task) -> Result<()> {
        self.memory.create(task).await?;
        self.durable.create(task).await
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        self.memory.get(id).await
    }

    async fn get_all(&self) -> Result<Vec<Task>> {
        self.memory.get_all().await
    }

    async fn update(&self, task: &Task) -> Result<()> {
        self.memory.update(task).await?;
        self.durable.update(task).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.memory.delete(id).await?;
        self.durable.delete(id).await
    }

    async fn get_pending(&self) -> Result<Vec<Task>> {
        self.memory.get_pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{JsonFileStore, LedgerError};
    use crate::task::FileStatus;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_reach_both_stores() {
        let temp_dir = TempDir::new().unwrap();
        let durable = Arc::new(JsonFileStore::new(temp_dir.path().join("tasks.json")));
        let ledger = MirroredStore::new(durable.clone());

        let mut task = Task::new(vec!["https://example.com/a".to_string()]);
        ledger.create(&task).await.unwrap();
        task.advance(TaskStatus::Processing);
        ledger.update(&task).await.unwrap();

        assert_eq!(ledger.get(task.id).await.unwrap().status, TaskStatus::Processing);
        assert_eq!(durable.get(task.id).await.unwrap().status, TaskStatus::Processing);

        ledger.delete(task.id).await.unwrap();
        assert!(matches!(
            durable.get(task.id).await,
            Err(LedgerError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_recovers_interrupted_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");

        let mut interrupted = Task::new(vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
        ]);
        interrupted.advance(TaskStatus::Processing);
        interrupted.complete_file(0, PathBuf::from("downloads/a"), 3);
        interrupted.start_file(1);

        let mut finished = Task::new(vec!["https://example.com/c".to_string()]);
        finished.complete_file(0, PathBuf::from("downloads/c"), 1);
        finished.finish();

        {
            let store = JsonFileStore::new(&path);
            store.create(&interrupted).await.unwrap();
            store.create(&finished).await.unwrap();
        }

        let durable = Arc::new(JsonFileStore::new(&path));
        let ledger = MirroredStore::new(durable.clone());
        let stats = ledger.sync_from_durable().await.unwrap();

        assert_eq!(stats, SyncStats { loaded: 2, recovered: 1 });

        let recovered = ledger.get(interrupted.id).await.unwrap();
        assert_eq!(recovered.status, TaskStatus::New);
        assert_eq!(recovered.files()[0].status, FileStatus::Completed);
        assert_eq!(recovered.files()[1].status, FileStatus::Pending);
        assert_eq!(durable.get(interrupted.id).await.unwrap().status, TaskStatus::New);

        let pending = ledger.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, interrupted.id);
    }
}
