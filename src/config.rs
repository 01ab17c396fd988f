use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScribeError;

/// Runtime settings. Every flag falls back to a `SCRIBE_*` environment
/// variable, then to its default.
#[derive(Debug, Clone, Parser)]
#[command(name = "scribe", version, about = "Log ingestion and live tail service")]
pub struct Settings {
    #[arg(long, env = "SCRIBE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "SCRIBE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database file, created on first start.
    #[arg(long, env = "SCRIBE_DB_PATH", default_value = "scribe.db")]
    pub db_path: PathBuf,

    #[arg(long, env = "SCRIBE_READ_POOL_SIZE", default_value_t = 4)]
    pub read_pool_size: u32,

    /// Default retention period for cleanup requests.
    #[arg(long, env = "SCRIBE_RETENTION_DAYS", default_value_t = 90)]
    pub retention_days: u32,

    /// Seconds between automatic cleanups; 0 disables them.
    #[arg(long, env = "SCRIBE_RETENTION_INTERVAL_SECS", default_value_t = 0)]
    pub retention_interval_secs: u64,

    /// Requests admitted per window, shared by all clients.
    #[arg(long, env = "SCRIBE_RATE_LIMIT", default_value_t = 100)]
    pub rate_limit: u32,

    #[arg(long, env = "SCRIBE_RATE_WINDOW_MS", default_value_t = 1000)]
    pub rate_window_ms: u64,

    /// Events buffered per live viewer before new ones are dropped.
    #[arg(long, env = "SCRIBE_SUBSCRIBER_CAPACITY", default_value_t = 10)]
    pub subscriber_capacity: usize,

    #[arg(long, env = "SCRIBE_HEARTBEAT_SECS", default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// How long in-flight requests may run after a shutdown signal.
    #[arg(long, env = "SCRIBE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("scribe.db"),
            read_pool_size: 4,
            retention_days: 90,
            retention_interval_secs: 0,
            rate_limit: 100,
            rate_window_ms: 1000,
            subscriber_capacity: 10,
            heartbeat_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<(), ScribeError> {
        validate_host(&self.host)?;
        validate_port(self.port)?;
        positive("read pool size", u64::from(self.read_pool_size))?;
        positive("retention days", u64::from(self.retention_days))?;
        positive("rate limit", u64::from(self.rate_limit))?;
        positive("rate window", self.rate_window_ms)?;
        positive("subscriber capacity", self.subscriber_capacity as u64)?;
        positive("heartbeat interval", self.heartbeat_secs)?;
        Ok(())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// `None` when periodic cleanup is disabled.
    #[must_use]
    pub fn retention_interval(&self) -> Option<Duration> {
        (self.retention_interval_secs > 0).then(|| Duration::from_secs(self.retention_interval_secs))
    }
}

/// Validates that the host is not empty or whitespace-only.
fn validate_host(host: &str) -> Result<(), ScribeError> {
    if host.trim().is_empty() {
        return Err(ScribeError::Config("Host cannot be empty".into()));
    }
    Ok(())
}

/// Validates that the port is in valid range (1-65535).
fn validate_port(port: u16) -> Result<(), ScribeError> {
    if port == 0 {
        return Err(ScribeError::Config("Port cannot be 0".into()));
    }
    Ok(())
}

fn positive(name: &str, value: u64) -> Result<(), ScribeError> {
    if value == 0 {
        return Err(ScribeError::Config(format!("{name} must be greater than 0")));
    }
    Ok(())
}

/// Parses flags and environment, then validates.
pub fn get_configuration() -> Result<Settings, ScribeError> {
    let settings = Settings::try_parse().map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => ScribeError::Config(e.to_string()),
    })?;
    settings.validate()?;
    Ok(settings)
}
