//! Application configuration loaded from environment variables.

use std::time::Duration;

use engine::{ConflictPolicy, RetryPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `REDIS_URL`: Redis connection string; unset runs on the in-memory store
/// - `ADMISSION_RETRY_ATTEMPTS`: attempts per admission on conflict
///   (default: `0`, meaning a conflict is reported without retrying)
/// - `ADMISSION_RETRY_DELAY_MS`: initial backoff between attempts (default: `0`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub redis_url: Option<String>,
    pub admission_retry_attempts: u32,
    pub admission_retry_delay_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            redis_url: std::env::var("REDIS_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            admission_retry_attempts: env_parse("ADMISSION_RETRY_ATTEMPTS")
                .unwrap_or(defaults.admission_retry_attempts),
            admission_retry_delay_ms: env_parse("ADMISSION_RETRY_DELAY_MS")
                .unwrap_or(defaults.admission_retry_delay_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the conflict policy for admissions.
    pub fn admission_policy(&self) -> ConflictPolicy {
        if self.admission_retry_attempts == 0 {
            return ConflictPolicy::ReturnConflict;
        }
        ConflictPolicy::AutoRetry(
            RetryPolicy::new(self.admission_retry_attempts)
                .initial_delay(Duration::from_millis(self.admission_retry_delay_ms)),
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            redis_url: None,
            admission_retry_attempts: 0,
            admission_retry_delay_ms: 0,
        }
    }
}
