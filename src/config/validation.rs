use super::models::Config;
use thiserror::Error;

/// Upper bound for a task creation request body
pub const MAX_PAYLOAD_LIMIT: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("pool.workers must be at least 1")]
    NoWorkers,

    #[error("pool.queue_capacity must be at least 1")]
    NoQueueCapacity,

    #[error("{field} must be positive")]
    ZeroDuration { field: &'static str },

    #[error("server.api.max_urls_per_task must be at least 1")]
    NoUrlsAllowed,

    #[error("max_payload_bytes ({actual}) must be between 1 and {limit}")]
    PayloadLimitOutOfRange { actual: u64, limit: u64 },

    #[error("download.user_agent must not be empty")]
    EmptyUserAgent,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_pool(config)?;
    validate_api(config)?;
    validate_download(config)?;
    Ok(())
}

fn validate_pool(config: &Config) -> Result<(), ValidationError> {
    if config.pool.workers == 0 {
        return Err(ValidationError::NoWorkers);
    }

    if config.pool.queue_capacity == 0 {
        return Err(ValidationError::NoQueueCapacity);
    }

    if config.pool.scan_interval_ms == 0 {
        return Err(ValidationError::ZeroDuration {
            field: "pool.scan_interval_ms",
        });
    }

    if config.pool.error_backoff_ms == 0 {
        return Err(ValidationError::ZeroDuration {
            field: "pool.error_backoff_ms",
        });
    }

    Ok(())
}

fn validate_api(config: &Config) -> Result<(), ValidationError> {
    let actual = config.server.api.max_payload_bytes.as_u64();
    if actual == 0 || actual > MAX_PAYLOAD_LIMIT {
        return Err(ValidationError::PayloadLimitOutOfRange {
            actual,
            limit: MAX_PAYLOAD_LIMIT,
        });
    }

    if config.server.api.max_urls_per_task == 0 {
        return Err(ValidationError::NoUrlsAllowed);
    }

    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    if config.download.request_timeout_secs == 0 {
        return Err(ValidationError::ZeroDuration {
            field: "download.request_timeout_secs",
        });
    }

    if config.download.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroDuration {
            field: "download.connect_timeout_secs",
        });
    }

    if config.download.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_valid_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = Config::default();
        config.pool.workers = 0;

        assert!(matches!(validate(&config), Err(ValidationError::NoWorkers)));
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = Config::default();
        config.pool.queue_capacity = 0;

        assert!(matches!(validate(&config), Err(ValidationError::NoQueueCapacity)));
    }

    #[test]
    fn test_zero_scan_interval() {
        let mut config = Config::default();
        config.pool.scan_interval_ms = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration { field: "pool.scan_interval_ms" })
        ));
    }

    #[test]
    fn test_payload_limit() {
        let mut config = Config::default();
        config.server.api.max_payload_bytes = ByteSize(32 * 1024 * 1024);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::PayloadLimitOutOfRange { .. })
        ));

        config.server.api.max_payload_bytes = ByteSize(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_request_timeout() {
        let mut config = Config::default();
        config.download.request_timeout_secs = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration { .. })
        ));
    }
}
