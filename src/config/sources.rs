use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "FETCHPOOL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/fetchpool.toml";
const ENV_PREFIX: &str = "FETCHPOOL";
const ENV_SEPARATOR: &str = "__";

/// Path of the configuration file: `FETCHPOOL_CONFIG` or the default location.
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    load_from_sources(default_path())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // FETCHPOOL__POOL__WORKERS -> pool.workers
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.pool.workers, 3);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
shutdown_grace_secs = 10

[server.api]
max_payload_bytes = "512KB"
max_urls_per_task = 50

[storage]
backend = "fjall"
fjall_path = "var/ledger"

[pool]
workers = 5
queue_capacity = 20
scan_interval_ms = 500

[download]
dir = "/tmp/downloads"
request_timeout_secs = 60
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.shutdown_grace_secs, 10);
        assert_eq!(config.server.api.max_payload_bytes.as_u64(), 512 * 1024);
        assert_eq!(config.server.api.max_urls_per_task, 50);
        assert_eq!(config.storage.fjall_path, PathBuf::from("var/ledger"));
        assert_eq!(config.pool.workers, 5);
        assert_eq!(config.pool.queue_capacity, 20);
        assert_eq!(config.pool.scan_interval_ms, 500);
        assert_eq!(config.pool.error_backoff_ms, 5000);
        assert_eq!(config.download.dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.download.request_timeout_secs, 60);
        assert_eq!(config.download.connect_timeout_secs, 10);
    }

    // Environment overrides are not exercised here: env::set_var is unsafe
    // and would leak into parallel tests.
}
