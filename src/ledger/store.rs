use std::path::Path;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::Task;

use super::error::{LedgerError, Result};
use super::partitions::{decode_task_key, encode_task_key};
use super::{PersistentStore, TaskStore, sort_by_creation};

/// Fjall-backed persistent storage for tasks
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    tasks: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let tasks = keyspace.open_partition("tasks", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self { keyspace, tasks })
    }

    fn put(&self, task: &Task) -> Result<()> {
        let value = serde_json::to_vec(task)?;
        self.tasks.insert(encode_task_key(task.id), value)?;
        debug!(task_id = %task.id, "Upserted task");
        Ok(())
    }

    fn contains(&self, id: Uuid) -> Result<bool> {
        Ok(self.tasks.contains_key(encode_task_key(id))?)
    }

    fn scan(&self, filter: impl Fn(&Task) -> bool) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for item in self.tasks.iter() {
            let (key, value) = item?;
            if decode_task_key(&key).is_none() {
                return Err(LedgerError::InvalidKey(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            }
            let task: Task = serde_json::from_slice(&value)?;
            if filter(&task) {
                tasks.push(task);
            }
        }
        sort_by_creation(&mut tasks);
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for FjallStore {
    async fn create(&self, task: &Task) -> Result<()> {
        if self.contains(task.id)? {
            return Err(LedgerError::DuplicateTask(task.id));
        }
        self.put(task)
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        match self.tasks.get(encode_task_key(id))? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(LedgerError::TaskNotFound(id)),
        }
    }

    async fn get_all(&self) -> Result<Vec<Task>> {
        self.scan(|_| true)
    }

    async fn update(&self, task: &Task) -> Result<()> {
        if !self.contains(task.id)? {
            return Err(LedgerError::TaskNotFound(task.id));
        }
        self.put(task)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.contains(id)? {
            return Err(LedgerError::TaskNotFound(id));
        }
        self.tasks.remove(encode_task_key(id))?;
        debug!(task_id = %id, "Deleted task");
        Ok(())
    }

    async fn get_pending(&self) -> Result<Vec<Task>> {
        self.scan(|task| task.status.is_pending())
    }
}

#[async_trait]
impl PersistentStore for FjallStore {
    /// Data lives in the keyspace already; nothing to read ahead.
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}
