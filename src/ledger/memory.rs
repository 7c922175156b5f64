use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{LedgerError, Result};
use super::{TaskStore, sort_by_creation};
use crate::task::Task;

/// Process-local task store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite without the existence checks of `create`/`update`.
    pub async fn put(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(LedgerError::DuplicateTask(task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(LedgerError::TaskNotFound(id))
    }

    async fn get_all(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        sort_by_creation(&mut tasks);
        Ok(tasks)
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(LedgerError::TaskNotFound(task.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.tasks
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(LedgerError::TaskNotFound(id))
    }

    async fn get_pending(&self) -> Result<Vec<Task>> {
        let mut pending: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| task.status.is_pending())
            .cloned()
            .collect();
        sort_by_creation(&mut pending);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn task(url: &str) -> Task {
        Task::new(vec![url.to_string()])
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let task = task("https://example.com/a");

        store.create(&task).await.unwrap();
        let fetched = store.get(task.id).await.unwrap();

        assert_eq!(fetched, task);
        assert!(matches!(
            store.create(&task).await,
            Err(LedgerError::DuplicateTask(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let store = MemoryStore::new();
        let task = task("https://example.com/a");

        assert!(matches!(store.get(task.id).await, Err(LedgerError::TaskNotFound(_))));
        assert!(matches!(store.update(&task).await, Err(LedgerError::TaskNotFound(_))));
        assert!(matches!(store.delete(task.id).await, Err(LedgerError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let mut task = task("https://example.com/a");
        store.create(&task).await.unwrap();

        task.advance(TaskStatus::Processing);
        store.update(&task).await.unwrap();
        assert_eq!(store.get(task.id).await.unwrap().status, TaskStatus::Processing);

        store.delete(task.id).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_filters_terminal_tasks() {
        let store = MemoryStore::new();

        let fresh = task("https://example.com/new");
        let mut running = task("https://example.com/running");
        running.advance(TaskStatus::Processing);
        let mut done = task("https://example.com/done");
        done.advance(TaskStatus::Completed);
        let mut broken = task("https://example.com/broken");
        broken.set_error("nope");

        for t in [&fresh, &running, &done, &broken] {
            store.create(t).await.unwrap();
        }

        let pending = store.get_pending().await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![fresh.id, running.id]);
        assert_eq!(store.get_all().await.unwrap().len(), 4);
    }
}
