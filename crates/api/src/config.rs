use std::str::FromStr;

use clipflow_core::error::CoreError;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// Pipeline settings (`STORAGE_ACCOUNT`, lock TTL, ...) are loaded separately
/// by `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub database_url: String,
    /// Attempts granted to jobs enqueued by this server.
    pub job_max_attempts: i32,
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`         | required                   |
    /// | `JOB_MAX_ATTEMPTS`     | `3`                        |
    /// | `JWT_SECRET`           | required                   |
    /// | `JWT_ACCESS_EXPIRY_MINS` | `60`                     |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse("PORT", var("PORT"), 3000)?,
            cors_origins,
            request_timeout_secs: parse("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"), 30)?,
            database_url: var("DATABASE_URL")
                .ok_or_else(|| CoreError::Validation("DATABASE_URL must be set".into()))?,
            job_max_attempts: parse("JOB_MAX_ATTEMPTS", var("JOB_MAX_ATTEMPTS"), 3)?,
            jwt: JwtConfig::from_lookup(&var)?,
        })
    }
}

pub(crate) fn parse<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, CoreError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}
