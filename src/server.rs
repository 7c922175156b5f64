use std::sync::Arc;

use fetchpool::api::{AppState, router};
use fetchpool::config::{Config, StorageBackend};
use fetchpool::ledger::{FjallStore, JsonFileStore, MirroredStore, PersistentStore};
use fetchpool::observability::Metrics;
use fetchpool::queue::{DispatchLoop, PoolSettings, WorkerPool};
use fetchpool::worker::{HttpConfig, HttpFetcher, TaskProcessor};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::ServerArgs;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(args: ServerArgs) -> Result<(), AnyError> {
    info!("Loading configuration");
    let mut config = match args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(address) = args.address {
        config.server.bind_addr = address;
    }
    if let Some(workers) = args.workers {
        config.pool.workers = workers;
    }
    config.validate()?;

    let durable: Arc<dyn PersistentStore> = match config.storage.backend {
        StorageBackend::Json => {
            info!(path = %config.storage.tasks_file.display(), "Using JSON task file");
            Arc::new(JsonFileStore::new(&config.storage.tasks_file))
        }
        StorageBackend::Fjall => {
            info!(path = %config.storage.fjall_path.display(), "Opening Fjall store");
            Arc::new(
                FjallStore::open(&config.storage.fjall_path)
                    .map_err(|e| format!("Failed to open Fjall store: {e}"))?,
            )
        }
    };

    let ledger = Arc::new(MirroredStore::new(durable));
    let stats = ledger
        .sync_from_durable()
        .await
        .map_err(|e| format!("Failed to load tasks: {e}"))?;
    info!(loaded = stats.loaded, recovered = stats.recovered, "Ledger synced");

    let metrics = Arc::new(Metrics::new());
    let fetcher = HttpFetcher::new(HttpConfig::from(&config.download))?;
    let processor = TaskProcessor::builder()
        .ledger(ledger.clone())
        .fetcher(Arc::new(fetcher))
        .download_dir(config.download.dir.clone())
        .metrics(metrics.clone())
        .build();

    let pool = Arc::new(WorkerPool::new(
        Arc::new(processor),
        PoolSettings::from(&config.pool),
    ));
    pool.start();

    let dispatch = DispatchLoop::builder()
        .ledger(ledger.clone())
        .pool(pool.clone())
        .scan_interval(config.pool.scan_interval())
        .error_backoff(config.pool.error_backoff())
        .metrics(metrics.clone())
        .build();
    let wake = dispatch.waker();

    let cancel = CancellationToken::new();
    let dispatch_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatch.run(cancel).await }
    });

    let address = config.server.bind_addr;
    let grace = config.server.shutdown_grace();
    let app = router(AppState::new(config, ledger.clone(), pool.clone(), metrics, wake));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "fetchpool API listening");

    let server = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
        }
    });

    shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = dispatch_handle.await {
        error!(error = %e, "Dispatch loop panicked");
    }

    pool.stop().await;

    match ledger.save().await {
        Ok(()) => info!("Tasks saved"),
        Err(e) => error!(error = %e, "Failed to save tasks"),
    }

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "HTTP server did not stop in time"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
