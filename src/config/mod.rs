//! Configuration management for fetchpool
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use fetchpool::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Running {} workers", config.pool.workers);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `FETCHPOOL__<section>__<key>`:
//! - `FETCHPOOL__SERVER__BIND_ADDR=127.0.0.1:9000`
//! - `FETCHPOOL__POOL__WORKERS=8`
//! - `FETCHPOOL__STORAGE__BACKEND=fjall`
//!
//! # Configuration File
//!
//! Read from `config/fetchpool.toml` unless `FETCHPOOL_CONFIG` points elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    ApiLimits, Config, DownloadConfig, PoolConfig, ServerConfig, StorageBackend, StorageConfig,
};
pub use validation::{MAX_PAYLOAD_LIMIT, ValidationError};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment) and validate it
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring the environment
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation, e.g. after CLI overrides
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[pool]\nworkers = 2\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.queue_capacity, 100);
    }

    #[test]
    fn test_validation_runs_after_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[pool]\nworkers = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(ValidationError::NoWorkers))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[pool\nworkers = ").unwrap();

        assert!(matches!(
            Config::load_from_path(config_path),
            Err(ConfigError::LoadError(_))
        ));
    }
}
