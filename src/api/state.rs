use std::sync::Arc;

use tokio::sync::Notify;

use crate::config::Config;
use crate::ledger::TaskStore;
use crate::observability::Metrics;
use crate::queue::WorkerPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<dyn TaskStore>,
    pub pool: Arc<WorkerPool>,
    pub metrics: Arc<Metrics>,
    /// Notified after a task is created so the dispatch loop scans right away
    pub wake: Arc<Notify>,
}

impl AppState {
    pub fn new(
        config: Config,
        ledger: Arc<dyn TaskStore>,
        pool: Arc<WorkerPool>,
        metrics: Arc<Metrics>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ledger,
            pool,
            metrics,
            wake,
        }
    }
}
