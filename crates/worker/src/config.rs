use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clipflow_core::error::CoreError;

/// Worker process settings. Pipeline and blob settings are loaded
/// separately by `PipelineConfig` and `S3BlobConfig`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Recorded on claimed jobs.
    pub worker_name: String,
    /// Jobs executed concurrently by this process.
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// A job claimed longer ago than this is assumed lost and requeued.
    pub visibility_timeout: Duration,
    pub max_attempts: i32,
    /// Hard limit on a single job run.
    pub job_timeout: Duration,
    pub housekeeping_interval: Duration,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl WorkerConfig {
    /// Load worker configuration from environment variables.
    ///
    /// | Env Var                       | Default              |
    /// |-------------------------------|----------------------|
    /// | `DATABASE_URL`                | required             |
    /// | `WORKER_NAME`                 | `worker-{pid}`       |
    /// | `WORKER_CONCURRENCY`          | `2`                  |
    /// | `JOB_POLL_INTERVAL_MS`        | `1000`               |
    /// | `JOB_VISIBILITY_TIMEOUT_SECS` | `7200`               |
    /// | `JOB_MAX_ATTEMPTS`            | `3`                  |
    /// | `JOB_TIMEOUT_SECS`            | `3600`               |
    /// | `HOUSEKEEPING_INTERVAL_SECS`  | `60`                 |
    /// | `FFMPEG_BIN`                  | `ffmpeg`             |
    /// | `FFPROBE_BIN`                 | `ffprobe`            |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str, default: u64| parse(key, var(key), default);

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| CoreError::Validation("DATABASE_URL must be set".into()))?;

        let config = Self {
            database_url,
            worker_name: var("WORKER_NAME")
                .unwrap_or_else(|| format!("worker-{}", std::process::id())),
            concurrency: parse("WORKER_CONCURRENCY", var("WORKER_CONCURRENCY"), 2)?,
            poll_interval: Duration::from_millis(number("JOB_POLL_INTERVAL_MS", 1000)?),
            visibility_timeout: Duration::from_secs(number("JOB_VISIBILITY_TIMEOUT_SECS", 7200)?),
            max_attempts: parse("JOB_MAX_ATTEMPTS", var("JOB_MAX_ATTEMPTS"), 3)?,
            job_timeout: Duration::from_secs(number("JOB_TIMEOUT_SECS", 3600)?),
            housekeeping_interval: Duration::from_secs(number("HOUSEKEEPING_INTERVAL_SECS", 60)?),
            ffmpeg_bin: var("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".into()).into(),
            ffprobe_bin: var("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".into()).into(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.concurrency == 0 {
            return Err(CoreError::Validation("WORKER_CONCURRENCY must be at least 1".into()));
        }
        if self.max_attempts < 1 {
            return Err(CoreError::Validation("JOB_MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.poll_interval.is_zero() || self.housekeeping_interval.is_zero() {
            return Err(CoreError::Validation("Worker intervals must be positive".into()));
        }
        if self.visibility_timeout <= self.job_timeout {
            return Err(CoreError::Validation(
                "JOB_VISIBILITY_TIMEOUT_SECS must exceed JOB_TIMEOUT_SECS".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, CoreError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}
