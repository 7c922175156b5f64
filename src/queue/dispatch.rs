use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pool::{PoolError, WorkerPool};
use crate::ledger::{Result, TaskStore};
use crate::observability::Metrics;
use crate::task::TaskStatus;

/// What one scan of the ledger did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Tasks in `New` found by the scan
    pub new: usize,
    pub submitted: usize,
    /// Already queued or in flight
    pub already_queued: usize,
    /// Refused by the pool (full, not running); retried on the next scan
    pub rejected: usize,
}

/// Polls the ledger and feeds `New` tasks to the worker pool
///
/// Scans every `scan_interval`, or immediately when `wake` is notified.
/// After a ledger error it waits `error_backoff` instead.
#[derive(Builder)]
pub struct DispatchLoop {
    ledger: Arc<dyn TaskStore>,
    pool: Arc<WorkerPool>,
    #[builder(default = Duration::from_secs(2))]
    scan_interval: Duration,
    #[builder(default = Duration::from_secs(5))]
    error_backoff: Duration,
    #[builder(default)]
    wake: Arc<Notify>,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl DispatchLoop {
    /// Handle that triggers an immediate scan
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Submit every `New` task once. `Processing` tasks already belong to a
    /// worker and are skipped.
    pub async fn scan_once(&self) -> Result<ScanReport> {
        let pending = self.ledger.get_pending().await?;
        let mut report = ScanReport::default();

        for task in pending.iter().filter(|t| t.status == TaskStatus::New) {
            report.new += 1;
            match self.pool.submit(task.id) {
                Ok(()) => report.submitted += 1,
                Err(PoolError::AlreadyQueued(_)) => {
                    report.already_queued += 1;
                    debug!(task_id = %task.id, "Task already queued");
                }
                Err(e) => {
                    report.rejected += 1;
                    self.metrics.submission_rejected();
                    warn!(task_id = %task.id, error = %e, "Failed to submit task");
                }
            }
        }

        Ok(report)
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            scan_interval_ms = self.scan_interval.as_millis() as u64,
            "Dispatch loop started"
        );

        while !cancel.is_cancelled() {
            let delay = match self.scan_once().await {
                Ok(report) => {
                    if report.submitted > 0 || report.rejected > 0 {
                        debug!(?report, "Scan complete");
                    }
                    self.scan_interval
                }
                Err(e) => {
                    error!(error = %e, backoff_ms = self.error_backoff.as_millis() as u64, "Failed to query pending tasks");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                _ = self.wake.notified() => debug!("Dispatch loop woken"),
            }
        }

        info!("Dispatch loop stopped");
    }
}
