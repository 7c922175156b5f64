//! HTTP client for downloading files to disk

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, header};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::DownloadConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build request: {0}")]
    InvalidRequest(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("download failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {code}: {reason}")]
    HttpStatus { code: u16, reason: String },

    #[error("failed to create file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file {path}: {message}")]
    Write { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// A file written by a fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Downloads one URL into a directory
///
/// The fetcher picks the file name; the caller picks the directory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest_dir`.
    ///
    /// The destination is sent on `started` once it is known and before the
    /// file is created. A fetcher that fails earlier drops the sender unsent.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        started: oneshot::Sender<PathBuf>,
    ) -> Result<FetchedFile>;

    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchedFile> {
        let (started, _) = oneshot::channel();
        self.download(url, dest_dir, started).await
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("fetchpool/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl From<&DownloadConfig> for HttpConfig {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Streaming HTTP downloader
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        started: oneshot::Sender<PathBuf>,
    ) -> Result<FetchedFile> {
        debug!(url, "Starting download");

        let mut response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::InvalidRequest(e.to_string())
            } else if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                FetchError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let content_disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok());
        let file_name = resolve_file_name(url, content_disposition);
        let path = dest_dir.join(file_name);
        // Nobody listening is fine
        let _ = started.send(path.clone());

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| FetchError::CreateFile {
                path: path.clone(),
                source,
            })?;

        let write_error = |message: String| FetchError::Write {
            path: path.clone(),
            message,
        };

        let mut size = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                write_error(e.to_string())
            }
        })? {
            file.write_all(&chunk)
                .await
                .map_err(|e| write_error(e.to_string()))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| write_error(e.to_string()))?;

        debug!(url, size, path = %path.display(), "Download completed");

        Ok(FetchedFile { path, size })
    }
}

/// Pick a file name for a download.
///
/// `Content-Disposition` wins when it carries a `filename=`; then the last URL
/// path segment if it is non-empty and has no query; then `file_<unix secs>`.
/// Only the final path component of whatever is chosen is kept.
pub fn resolve_file_name(url: &str, content_disposition: Option<&str>) -> String {
    let from_header = content_disposition
        .and_then(|value| value.split_once("filename="))
        .map(|(_, rest)| rest.split(';').next().unwrap_or(rest).trim().trim_matches('"'))
        .and_then(sanitize);

    if let Some(name) = from_header {
        return name;
    }

    let from_url = url
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains('?'))
        .and_then(sanitize);

    from_url.unwrap_or_else(|| format!("file_{}", Utc::now().timestamp()))
}

fn sanitize(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?;
    match last {
        "" | "." | ".." => None,
        other => Some(other.to_string()),
    }
}
