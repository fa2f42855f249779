//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed concurrently
    pub pool_size: usize,
    /// Parent directory of the per-job temp directories
    pub work_dir: PathBuf,
    /// How often the worker scans for expired leases
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    pub download_max_attempts: u32,
    pub download_retry_delay: Duration,
    pub oracle_max_attempts: u32,
    pub oracle_retry_delay: Duration,
    /// Lifetime of the signed clip URLs
    pub presign_ttl: Duration,
    /// RGBA image composited onto clips of jobs that ask for it
    pub watermark_path: Option<PathBuf>,
    /// Base URL of the status callback endpoint
    pub status_sink_url: Option<String>,
    /// Raw JSON proxy pool
    pub proxy_list: Option<String>,
    /// Port of the Prometheus exporter, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            work_dir: std::env::temp_dir().join("reel"),
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            download_max_attempts: 3,
            download_retry_delay: Duration::from_secs(3),
            oracle_max_attempts: 3,
            oracle_retry_delay: Duration::from_secs(2),
            presign_ttl: Duration::from_secs(30 * 24 * 3600),
            watermark_path: None,
            status_sink_url: None,
            proxy_list: None,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pool_size: env_or("WORKER_POOL_SIZE", defaults.pool_size).max(1),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            claim_interval: Duration::from_secs(env_or("WORKER_CLAIM_INTERVAL_SECS", 30)),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 60)),
            download_max_attempts: env_or("DOWNLOAD_MAX_ATTEMPTS", 3),
            download_retry_delay: Duration::from_secs(env_or("DOWNLOAD_RETRY_DELAY_SECS", 3)),
            oracle_max_attempts: env_or("ORACLE_MAX_ATTEMPTS", 3),
            oracle_retry_delay: Duration::from_secs(env_or("ORACLE_RETRY_DELAY_SECS", 2)),
            presign_ttl: Duration::from_secs(env_or::<u64>("PRESIGN_TTL_DAYS", 30) * 24 * 3600),
            watermark_path: std::env::var("WATERMARK_PATH").ok().map(PathBuf::from),
            status_sink_url: std::env::var("STATUS_SINK_URL")
                .or_else(|_| std::env::var("FRONTEND_URL"))
                .ok()
                .filter(|s| !s.trim().is_empty()),
            proxy_list: std::env::var("PROXY_LIST").ok().filter(|s| !s.trim().is_empty()),
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        }
    }
}

/// Read a secret that the worker cannot run without.
pub fn required_env(name: &str) -> WorkerResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| WorkerError::config_error(format!("{} not set", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.download_max_attempts, 3);
        assert_eq!(config.download_retry_delay, Duration::from_secs(3));
        assert_eq!(config.presign_ttl, Duration::from_secs(2_592_000));
    }

    #[test]
    fn test_required_env_missing() {
        let err = required_env("REEL_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }
}
