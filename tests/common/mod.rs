//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use fetchpool::ledger::TaskStore;
use fetchpool::task::Task;
use fetchpool::worker::{FetchedFile, Fetcher, http};
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

pub const REPORT_BODY: &str = "hello world";
pub const ATTACHMENT_BODY: &[u8] = &[0u8, 1, 2, 3, 4, 5, 6, 7];

/// Start a local file server on a random port and return its base URL
///
/// - `/files/report.txt`: plain body
/// - `/attachment`: body with `Content-Disposition: attachment; filename="named.bin"`
/// - `/missing`: 404
pub async fn start_mock_server() -> String {
    let app = Router::new()
        .route("/files/report.txt", get(|| async { REPORT_BODY }))
        .route("/attachment", get(serve_attachment))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }));

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{bound_addr}")
}

async fn serve_attachment() -> impl IntoResponse {
    (
        [(header::CONTENT_DISPOSITION, r#"attachment; filename="named.bin""#)],
        ATTACHMENT_BODY,
    )
}

/// A URL nothing listens on; connecting is refused immediately
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1/unreachable.bin";

/// Fetcher that sleeps instead of downloading and records peak concurrency
#[derive(Default)]
pub struct SlowFetcher {
    pub delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for SlowFetcher {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        started: oneshot::Sender<PathBuf>,
    ) -> http::Result<FetchedFile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let path = dest_dir.join(url.rsplit('/').next().unwrap_or("file"));
        let _ = started.send(path.clone());
        sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(FetchedFile {
            path,
            size: url.len() as u64,
        })
    }
}

/// Poll the store until `done` holds for the task or the timeout expires
pub async fn wait_for_task<F>(store: &dyn TaskStore, id: Uuid, timeout: Duration, done: F) -> Task
where
    F: Fn(&Task) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let task = store.get(id).await.unwrap();
        if done(&task) {
            return task;
        }
        assert!(
            Instant::now() < deadline,
            "task {id} did not reach the expected state: {task:?}"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

pub fn shared<T: TaskStore + 'static>(store: T) -> Arc<dyn TaskStore> {
    Arc::new(store)
}
