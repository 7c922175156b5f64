use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::worker::{ProcessOutcome, TaskProcessor};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is not running")]
    NotRunning,

    #[error("job queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("task {0} is already queued or being processed")]
    AlreadyQueued(Uuid),

    #[error("worker pool is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, PoolError>;

/// Sizing for a [`WorkerPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 100,
        }
    }
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Lifecycle of a pool instance. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    NotStarted,
    Running,
    Stopped,
}

/// A job carries only the task id; workers re-read the task themselves
#[derive(Debug, Clone, Copy)]
struct TaskJob {
    task_id: Uuid,
}

/// An idle worker waiting for exactly one job
struct ReadyWorker {
    id: usize,
    inbox: oneshot::Sender<TaskJob>,
}

struct RunningPool {
    jobs: mpsc::Sender<TaskJob>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    dispatcher: JoinHandle<()>,
}

enum Lifecycle {
    NotStarted,
    Running(RunningPool),
    Stopped,
}

/// State shared between the pool handle and its spawned loops
struct Shared {
    processor: Arc<TaskProcessor>,
    busy: Vec<AtomicBool>,
    /// Ids that are queued, waiting in the dispatcher, or being processed
    tracked: Mutex<HashSet<Uuid>>,
}

impl Shared {
    fn release(&self, task_id: Uuid) {
        lock(&self.tracked).remove(&task_id);
    }
}

/// Fixed-size pool of download workers fed through a bounded job queue
///
/// ```text
/// submit ──► [ job queue ] ──► dispatcher ──► ready worker inbox ──► TaskProcessor
///                                  ▲                                     │
///                                  └──────── worker re-registers ◄───────┘
/// ```
///
/// Idle workers register a single-use inbox on the ready channel. The
/// dispatcher pairs each job with the next registered worker, so a handoff
/// only fails when that worker has already exited. Jobs wait in the queue
/// while every worker is busy; once the queue is full `submit` fails fast.
pub struct WorkerPool {
    settings: PoolSettings,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl WorkerPool {
    pub fn new(processor: Arc<TaskProcessor>, settings: PoolSettings) -> Self {
        let settings = PoolSettings {
            workers: settings.workers.max(1),
            queue_capacity: settings.queue_capacity.max(1),
        };
        let busy = (0..settings.workers).map(|_| AtomicBool::new(false)).collect();

        Self {
            settings,
            shared: Arc::new(Shared {
                processor,
                busy,
                tracked: Mutex::new(HashSet::new()),
            }),
            lifecycle: Mutex::new(Lifecycle::NotStarted),
        }
    }

    /// Spawn the workers and the dispatcher. No-op while running; a stopped
    /// pool cannot be restarted.
    pub fn start(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        match *lifecycle {
            Lifecycle::Running(_) => {
                debug!("Worker pool already running");
                return;
            }
            Lifecycle::Stopped => {
                warn!("Ignoring start of a stopped worker pool");
                return;
            }
            Lifecycle::NotStarted => {}
        }

        let PoolSettings {
            workers,
            queue_capacity,
        } = self.settings;
        info!(workers, queue_capacity, "Starting worker pool");

        let cancel = CancellationToken::new();
        let (jobs_tx, jobs_rx) = mpsc::channel(queue_capacity);
        let (ready_tx, ready_rx) = mpsc::channel(workers);

        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    self.shared.clone(),
                    ready_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        let dispatcher = tokio::spawn(run_dispatcher(jobs_rx, ready_rx, cancel.clone()));

        *lifecycle = Lifecycle::Running(RunningPool {
            jobs: jobs_tx,
            cancel,
            workers: handles,
            dispatcher,
        });
    }

    /// Queue a task for processing without blocking.
    pub fn submit(&self, task_id: Uuid) -> Result<()> {
        let lifecycle = lock(&self.lifecycle);
        let Lifecycle::Running(running) = &*lifecycle else {
            return Err(PoolError::NotRunning);
        };

        let mut tracked = lock(&self.shared.tracked);
        if tracked.contains(&task_id) {
            return Err(PoolError::AlreadyQueued(task_id));
        }

        match running.jobs.try_send(TaskJob { task_id }) {
            Ok(()) => {
                tracked.insert(task_id);
                debug!(task_id = %task_id, "Task submitted to worker pool");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(PoolError::QueueFull {
                capacity: self.settings.queue_capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::ShuttingDown),
        }
    }

    /// Cancel, then wait for the dispatcher and every worker to exit.
    ///
    /// A worker in the middle of a download finishes that file first.
    /// Calling `stop` again, or on a pool that never started, does nothing
    /// beyond marking it stopped.
    pub async fn stop(&self) {
        let running = {
            let mut lifecycle = lock(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(running) => running,
                Lifecycle::NotStarted | Lifecycle::Stopped => return,
            }
        };

        info!("Stopping worker pool");
        let RunningPool {
            jobs,
            cancel,
            workers,
            dispatcher,
        } = running;
        drop(jobs);
        cancel.cancel();

        for (id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id = id, error = %e, "Worker task panicked");
            }
        }
        if let Err(e) = dispatcher.await {
            error!(error = %e, "Dispatcher task panicked");
        }

        lock(&self.shared.tracked).clear();
        info!("Worker pool stopped");
    }

    pub fn state(&self) -> PoolState {
        match *lock(&self.lifecycle) {
            Lifecycle::NotStarted => PoolState::NotStarted,
            Lifecycle::Running(_) => PoolState::Running,
            Lifecycle::Stopped => PoolState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    pub fn worker_count(&self) -> usize {
        self.settings.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.settings.queue_capacity
    }

    /// Workers currently holding a job
    pub fn busy_workers(&self) -> usize {
        self.shared
            .busy
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// Whether `task_id` is queued or in flight
    pub fn is_tracked(&self, task_id: Uuid) -> bool {
        lock(&self.shared.tracked).contains(&task_id)
    }
}

async fn run_dispatcher(
    mut jobs: mpsc::Receiver<TaskJob>,
    mut ready: mpsc::Receiver<ReadyWorker>,
    cancel: CancellationToken,
) {
    info!("Dispatcher started");

    'dispatch: loop {
        let mut job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        loop {
            let worker = tokio::select! {
                _ = cancel.cancelled() => break 'dispatch,
                worker = ready.recv() => match worker {
                    Some(worker) => worker,
                    None => break 'dispatch,
                },
            };

            match worker.inbox.send(job) {
                Ok(()) => {
                    debug!(task_id = %job.task_id, worker_id = worker.id, "Job handed to worker");
                    break;
                }
                Err(returned) => {
                    debug!(worker_id = worker.id, "Worker left before handoff, trying next");
                    job = returned;
                }
            }
        }
    }

    info!("Dispatcher stopped");
}

async fn run_worker(
    id: usize,
    shared: Arc<Shared>,
    ready: mpsc::Sender<ReadyWorker>,
    cancel: CancellationToken,
) {
    debug!(worker_id = id, "Worker started");

    loop {
        let (inbox, job_rx) = oneshot::channel();
        let registered = tokio::select! {
            _ = cancel.cancelled() => false,
            sent = ready.send(ReadyWorker { id, inbox }) => sent.is_ok(),
        };
        if !registered {
            break;
        }

        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        shared.busy[id].store(true, Ordering::Release);
        handle_job(id, &shared, job, &cancel).await;
        shared.busy[id].store(false, Ordering::Release);
        shared.release(job.task_id);
    }

    debug!(worker_id = id, "Worker stopped");
}

async fn handle_job(id: usize, shared: &Shared, job: TaskJob, cancel: &CancellationToken) {
    let task_id = job.task_id;
    let processor = &shared.processor;

    let pending = match processor.ledger().get_pending().await {
        Ok(pending) => pending,
        Err(e) => {
            error!(worker_id = id, task_id = %task_id, error = %e, "Failed to load pending tasks");
            return;
        }
    };
    if !pending.iter().any(|task| task.id == task_id) {
        warn!(worker_id = id, task_id = %task_id, "Task not found among pending tasks, dropping job");
        return;
    }

    match processor.process(task_id, cancel).await {
        Ok(ProcessOutcome::Finished(status)) => {
            debug!(worker_id = id, task_id = %task_id, status = ?status, "Job finished");
        }
        Ok(ProcessOutcome::Interrupted { remaining }) => {
            info!(worker_id = id, task_id = %task_id, remaining, "Job interrupted");
        }
        Err(e) => {
            warn!(worker_id = id, task_id = %task_id, error = %e, "Task processing failed");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
