//! Task persistence
//!
//! The ledger is the single source of truth for task state. Workers and the
//! HTTP layer never share task values; they pass ids around and re-read.
//!
//! ## Stores
//!
//! - [`MemoryStore`]: hash map behind an async `RwLock`
//! - [`JsonFileStore`]: in-memory map mirrored to one JSON document on disk
//! - [`FjallStore`]: embedded LSM keyspace, one `tasks` partition
//! - [`MirroredStore`]: memory for reads, memory + durable store for writes;
//!   this is what the processor and the API are wired to
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fetchpool::ledger::{JsonFileStore, MirroredStore};
//!
//! let durable = Arc::new(JsonFileStore::new("data/tasks.json"));
//! let ledger = MirroredStore::new(durable);
//! ledger.sync_from_durable().await?;
//! ```

pub mod error;
pub mod json_file;
pub mod memory;
pub mod mirrored;
pub mod partitions;
pub mod store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::task::Task;

pub use error::{LedgerError, Result};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use mirrored::MirroredStore;
pub use store::FjallStore;

/// CRUD plus the "pending" query the dispatcher relies on.
///
/// `get`, `update` and `delete` fail with [`LedgerError::TaskNotFound`] for an
/// unknown id. Listings are ordered by creation time.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: &Task) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Task>;
    async fn get_all(&self) -> Result<Vec<Task>>;
    async fn update(&self, task: &Task) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Tasks in `New` or `Processing`.
    async fn get_pending(&self) -> Result<Vec<Task>>;
}

/// A store whose contents survive the process.
#[async_trait]
pub trait PersistentStore: TaskStore {
    /// Read durable state into the store.
    async fn load(&self) -> Result<()>;
    /// Flush everything to durable storage.
    async fn save(&self) -> Result<()>;
}

pub(crate) fn sort_by_creation(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
