use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// How long in-flight HTTP requests get after the worker pool has stopped
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub api: ApiLimits,
}

/// API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
    #[serde(default = "default_max_urls_per_task")]
    pub max_urls_per_task: usize,
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            api: ApiLimits::default(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_urls_per_task: default_max_urls_per_task(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

fn default_max_urls_per_task() -> usize {
    1000
}

/// Durable task store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Fjall,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_tasks_file")]
    pub tasks_file: PathBuf,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            tasks_file: default_tasks_file(),
            fjall_path: default_fjall_path(),
        }
    }
}

fn default_tasks_file() -> PathBuf {
    PathBuf::from("data/tasks.json")
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Worker pool and dispatch loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl PoolConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            scan_interval_ms: default_scan_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    100
}

fn default_scan_interval_ms() -> u64 {
    2000
}

fn default_error_backoff_ms() -> u64 {
    5000
}

/// Download configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Each task gets `<dir>/<task id>/`
    #[serde(default = "default_download_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl DownloadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: default_download_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("fetchpool/", env!("CARGO_PKG_VERSION")).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.api.max_payload_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.server.api.max_urls_per_task, 1000);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.pool.workers, 3);
        assert_eq!(config.pool.queue_capacity, 100);
        assert_eq!(config.pool.scan_interval(), Duration::from_secs(2));
        assert_eq!(config.pool.error_backoff(), Duration::from_secs(5));
        assert_eq!(config.download.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[pool]
workers = 8

[storage]
backend = "fjall"
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.pool.queue_capacity, 100);
        assert_eq!(config.storage.backend, StorageBackend::Fjall);
        assert_eq!(config.storage.fjall_path, PathBuf::from("data/ledger"));
    }
}
