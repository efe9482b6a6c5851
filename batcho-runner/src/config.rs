//! Worker configuration
//!
//! Defines all configurable parameters for a batcho worker including the
//! store connection, polling intervals and run-phase launch settings.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Worker configuration
///
/// Intervals are configurable so the same binary can poll aggressively in
/// tests and gently against a shared production store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier for this worker process (only used in logs)
    pub worker_id: String,

    /// Store base URL (e.g., "http://localhost:8080")
    pub store_url: String,

    /// Compute resource whose pending batches this worker handles
    pub compute_resource: Option<String>,

    /// Delay between iterations of the compute-resource loop
    pub poll_interval: Duration,

    /// Delay between attempts to update a compute resource's pending set
    pub pending_set_retry_delay: Duration,

    /// Attempts before giving up on a pending-set update
    pub pending_set_max_attempts: u32,

    /// Command prefix for the run-phase subprocess (e.g. "srun -n 1")
    pub run_prefix: Option<String>,

    /// Where files realized from the store are cached
    pub cache_dir: PathBuf,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_id: String, store_url: String) -> Self {
        Self {
            worker_id,
            store_url,
            compute_resource: None,
            poll_interval: Duration::from_secs(4),
            pending_set_retry_delay: Duration::from_millis(200),
            pending_set_max_attempts: 50,
            run_prefix: None,
            cache_dir: batcho_client::default_cache_dir(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables (all optional):
    /// - BATCHO_WORKER_ID (default: random UUID)
    /// - BATCHO_STORE_URL (default: http://localhost:8080)
    /// - BATCHO_COMPUTE_RESOURCE
    /// - BATCHO_POLL_INTERVAL_SECS (default: 4)
    /// - BATCHO_PENDING_SET_RETRY_MS (default: 200)
    /// - BATCHO_PENDING_SET_MAX_ATTEMPTS (default: 50)
    /// - BATCHO_RUN_PREFIX
    /// - BATCHO_CACHE_DIR (default: <tmp>/batcho-cache)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let worker_id = std::env::var("BATCHO_WORKER_ID").unwrap_or(defaults.worker_id);
        let store_url = std::env::var("BATCHO_STORE_URL").unwrap_or(defaults.store_url);

        let poll_interval = env_parse("BATCHO_POLL_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let pending_set_retry_delay = env_parse("BATCHO_PENDING_SET_RETRY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.pending_set_retry_delay);

        let pending_set_max_attempts = env_parse("BATCHO_PENDING_SET_MAX_ATTEMPTS")?
            .unwrap_or(defaults.pending_set_max_attempts);

        let cache_dir = std::env::var("BATCHO_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        Ok(Self {
            worker_id,
            store_url,
            compute_resource: non_empty_var("BATCHO_COMPUTE_RESOURCE"),
            poll_interval,
            pending_set_retry_delay,
            pending_set_max_attempts,
            run_prefix: non_empty_var("BATCHO_RUN_PREFIX"),
            cache_dir,
        })
    }

    /// Sets the compute resource to listen as
    pub fn with_compute_resource(mut self, compute_resource: impl Into<String>) -> Self {
        self.compute_resource = Some(compute_resource.into());
        self
    }

    /// Splits the run prefix into program and arguments
    pub fn run_prefix_args(&self) -> Vec<String> {
        self.run_prefix
            .as_deref()
            .map(|prefix| prefix.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Retry schedule for pending-set read-modify-write updates
    pub fn pending_set_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.pending_set_retry_delay, self.pending_set_max_attempts)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.store_url.is_empty() {
            anyhow::bail!("store_url cannot be empty");
        }

        if !self.store_url.starts_with("http://") && !self.store_url.starts_with("https://") {
            anyhow::bail!("store_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.pending_set_max_attempts == 0 {
            anyhow::bail!("pending_set_max_attempts must be greater than 0");
        }

        if matches!(&self.compute_resource, Some(resource) if resource.trim().is_empty()) {
            anyhow::bail!("compute_resource cannot be blank");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {:?} ({})", name, raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(4));
        assert_eq!(config.pending_set_retry_delay, Duration::from_millis(200));
        assert_eq!(config.compute_resource, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let rejects = |mutate: fn(&mut Config)| {
            let mut config = Config::default();
            mutate(&mut config);
            config.validate().is_err()
        };

        assert!(rejects(|c| c.worker_id.clear()));
        assert!(rejects(|c| c.store_url = "not-a-url".to_string()));
        assert!(rejects(|c| c.poll_interval = Duration::ZERO));
        assert!(rejects(|c| c.pending_set_max_attempts = 0));
        assert!(rejects(|c| c.compute_resource = Some("  ".to_string())));
        assert!(!rejects(|c| c.store_url = "https://store.internal".to_string()));
    }

    #[test]
    fn test_run_prefix_args() {
        let mut config = Config::default().with_compute_resource("cluster");
        assert!(config.run_prefix_args().is_empty());

        config.run_prefix = Some("srun  -n 1".to_string());
        assert_eq!(config.run_prefix_args(), vec!["srun", "-n", "1"]);
        assert_eq!(config.compute_resource.as_deref(), Some("cluster"));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u64>("X", " 7 ").unwrap(), 7);
        assert!(parse_value::<u64>("X", "soon").is_err());
    }
}
