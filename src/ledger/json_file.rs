use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{LedgerError, Result};
use super::{PersistentStore, TaskStore, sort_by_creation};
use crate::task::Task;

/// Task store backed by a single JSON document
///
/// The document is an object keyed by task id. Every mutation rewrites the
/// whole file (temp file + rename) while holding the write lock, so readers of
/// the file never see a torn write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, tasks: &HashMap<Uuid, Task>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let document: BTreeMap<String, &Task> =
            tasks.iter().map(|(id, task)| (id.to_string(), task)).collect();
        let data = serde_json::to_vec_pretty(&document)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), tasks = tasks.len(), "Task file written");
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(LedgerError::DuplicateTask(task.id));
        }
        tasks.insert(task.id, task.clone());
        self.write_file(&tasks).await
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
        let Some(slot) = tasks.get_mut(&task.id) else {
            return Err(LedgerError::TaskNotFound(task.id));
        };
        *slot = task.clone();
        self.write_file(&tasks).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.remove(&id).is_none() {
            return Err(LedgerError::TaskNotFound(id));
        }
        self.write_file(&tasks).await
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

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn load(&self) -> Result<()> {
        let mut tasks = self.tasks.write().await;

        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Task file not found, starting empty");
                tasks.clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let document: BTreeMap<String, Task> = if data.iter().all(u8::is_ascii_whitespace) {
            BTreeMap::new()
        } else {
            serde_json::from_slice(&data)?
        };

        let mut loaded = HashMap::with_capacity(document.len());
        for (key, task) in document {
            let id: Uuid = key.parse().map_err(|_| LedgerError::InvalidKey(key.clone()))?;
            loaded.insert(id, task);
        }

        info!(path = %self.path.display(), tasks = loaded.len(), "Task file loaded");
        *tasks = loaded;
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let tasks = self.tasks.read().await;
        self.write_file(&tasks).await
    }
}
