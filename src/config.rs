//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default upstream API base URL.
pub const DEFAULT_API_URL: &str = "https://cloud.leonardo.ai/api/rest/v1";

/// Job queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Optional supervisory timeout per job. A handler that runs past this
    /// is failed and its worker slot freed. `None` leaves the handler
    /// responsible for bounding its own work.
    pub job_timeout: Option<Duration>,
    /// Optional cap on retained terminal (completed/failed) jobs. When set,
    /// the oldest terminal jobs are pruned from the registry as new work is
    /// submitted. Queued and processing jobs are never evicted. `None`
    /// keeps every job for the process lifetime.
    pub max_finished_jobs: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            job_timeout: None,
            max_finished_jobs: None,
        }
    }
}

/// Upstream generation API configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Base URL of the generation API.
    pub base_url: String,
    /// Default API key, used when a job payload carries none.
    pub api_key: Option<SecretString>,
    /// Delay between completion polls.
    pub poll_interval: Duration,
    /// Maximum number of completion polls before giving up on a generation.
    pub poll_max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            poll_interval: Duration::from_secs(2),
            poll_max_attempts: 60,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Allowed CORS origins for the HTTP surface.
    pub cors_origins: Vec<String>,
    /// Directory where downloaded images are written.
    pub output_dir: PathBuf,
    /// Path of the local generations database.
    pub db_path: PathBuf,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
    pub queue: QueueConfig,
    pub generation: GenerationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            output_dir: PathBuf::from("./outputs"),
            db_path: PathBuf::from("./outputs/history.db"),
            log_dir: PathBuf::from("./logs"),
            queue: QueueConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("BULK_STUDIO_PORT") {
            config.port = parse_var("BULK_STUDIO_PORT", &port)?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(dir) = std::env::var("BULK_STUDIO_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(&dir);
            config.db_path = config.output_dir.join("history.db");
        }
        if let Ok(path) = std::env::var("BULK_STUDIO_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("BULK_STUDIO_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Ok(n) = std::env::var("BULK_STUDIO_CONCURRENCY") {
            config.queue.concurrency = parse_var("BULK_STUDIO_CONCURRENCY", &n)?;
        }
        if let Ok(secs) = std::env::var("BULK_STUDIO_JOB_TIMEOUT_SECS") {
            let secs: u64 = parse_var("BULK_STUDIO_JOB_TIMEOUT_SECS", &secs)?;
            config.queue.job_timeout = Some(Duration::from_secs(secs));
        }
        if let Ok(n) = std::env::var("BULK_STUDIO_MAX_FINISHED_JOBS") {
            config.queue.max_finished_jobs =
                Some(parse_var("BULK_STUDIO_MAX_FINISHED_JOBS", &n)?);
        }

        if let Ok(url) = std::env::var("LEONARDO_API_URL") {
            config.generation.base_url = url;
        }
        if let Ok(key) = std::env::var("LEONARDO_API_KEY") {
            config.generation.api_key = Some(SecretString::from(key));
        }
        if let Ok(secs) = std::env::var("BULK_STUDIO_POLL_INTERVAL_SECS") {
            let secs: u64 = parse_var("BULK_STUDIO_POLL_INTERVAL_SECS", &secs)?;
            config.generation.poll_interval = Duration::from_secs(secs);
        }
        if let Ok(n) = std::env::var("BULK_STUDIO_POLL_MAX_ATTEMPTS") {
            config.generation.poll_max_attempts =
                parse_var("BULK_STUDIO_POLL_MAX_ATTEMPTS", &n)?;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.queue.concurrency, 10);
        assert!(config.queue.job_timeout.is_none());
        assert!(config.queue.max_finished_jobs.is_none());
        assert_eq!(config.generation.poll_max_attempts, 60);
        assert_eq!(config.generation.base_url, DEFAULT_API_URL);
    }

    #[test]
    fn parse_var_reports_key() {
        let err = parse_var::<u16>("BULK_STUDIO_PORT", "not-a-port").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "BULK_STUDIO_PORT"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
