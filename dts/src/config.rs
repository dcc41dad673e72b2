//! Environment-sourced configuration, validated eagerly at startup.
//!
//! Every field here corresponds to one `DTS_*` environment variable; there
//! is no config file layer (unlike the teacher's `Cli::merge_from_file`) —
//! this service's env var table is small enough that it isn't needed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// How often the scheduler re-runs the lease-expiry sweep even while the
/// process stays up, in milliseconds. Not exposed as an env var — spec's
/// environment table is exhaustive.
pub const RECOVERY_INTERVAL_MS: i64 = 5_000;

/// Upper bound on tasks claimed in a single scheduler tick.
pub const CLAIM_BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub max_concurrent_tasks: i64,
    pub sched_tick_ms: i64,
    pub lease_ms: i64,
    pub max_attempts: i64,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let db_path = PathBuf::from(env_str("DTS_DB_PATH", "./var/tasks.db"));

        let max_concurrent_tasks = env_positive_i64("DTS_MAX_CONCURRENT", 3)?;
        let sched_tick_ms = env_positive_i64("DTS_SCHED_TICK_MS", 200)?;
        let lease_ms = env_positive_i64("DTS_LEASE_MS", 60_000)?;
        let max_attempts = env_positive_i64("DTS_MAX_ATTEMPTS", 3)?;

        let host = env_str("DTS_HOST", "127.0.0.1");
        let port_raw = env_str("DTS_PORT", "8000");
        let port: u16 = port_raw
            .parse()
            .with_context(|| format!("DTS_PORT must be an integer, got: {port_raw:?}"))?;
        if port == 0 {
            bail!("DTS_PORT must be between 1 and 65535");
        }

        let log_level = env_str("DTS_LOG_LEVEL", "info").to_lowercase();

        Ok(Self {
            db_path,
            max_concurrent_tasks,
            sched_tick_ms,
            lease_ms,
            max_attempts,
            host,
            port,
            log_level,
        })
    }

    pub fn sched_tick(&self) -> Duration {
        Duration::from_millis(self.sched_tick_ms as u64)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_positive_i64(name: &str, default: i64) -> Result<i64> {
    let raw = env_str(name, &default.to_string());
    let value: i64 = raw
        .parse()
        .with_context(|| format!("{name} must be an integer, got: {raw:?}"))?;
    if value <= 0 {
        bail!("{name} must be > 0");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_positive_i64_rejects_zero_and_negative() {
        std::env::set_var("DTS_TEST_ZERO", "0");
        let err = env_positive_i64("DTS_TEST_ZERO", 1).unwrap_err();
        assert!(err.to_string().contains("must be > 0"));
        std::env::remove_var("DTS_TEST_ZERO");
    }

    #[test]
    fn env_str_falls_back_on_blank_value() {
        std::env::set_var("DTS_TEST_BLANK", "   ");
        assert_eq!(env_str("DTS_TEST_BLANK", "fallback"), "fallback");
        std::env::remove_var("DTS_TEST_BLANK");
    }
}
