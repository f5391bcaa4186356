//! Runner configuration
//!
//! Defines the configurable parameters of both executors: where local
//! checkouts live, which kubectl binary to drive, and the cluster job
//! polling cadence and deadline.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base directory for local checkouts; each app gets `work_dir/<app id>`
    pub work_dir: PathBuf,

    /// git binary used to sync local checkouts
    pub git_bin: String,

    /// kubectl binary used for cluster jobs
    pub kubectl_bin: String,

    /// How often a cluster job is polled for logs and status
    pub poll_interval: Duration,

    /// Hard deadline for a cluster job
    pub job_timeout: Duration,

    /// How long finished jobs are retained by the cluster
    pub job_ttl_after_finished: Duration,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            git_bin: "git".to_string(),
            kubectl_bin: "kubectl".to_string(),
            poll_interval: Duration::from_secs(2),
            job_timeout: Duration::from_secs(30 * 60),
            job_ttl_after_finished: Duration::from_secs(3600),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PIAFLOW_WORK_DIR (optional, default: work)
    /// - PIAFLOW_GIT (optional, default: git)
    /// - PIAFLOW_KUBECTL (optional, default: kubectl)
    /// - PIAFLOW_POLL_INTERVAL (optional, seconds, default: 2)
    /// - PIAFLOW_JOB_TIMEOUT (optional, seconds, default: 1800)
    /// - PIAFLOW_JOB_TTL (optional, seconds, default: 3600)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PIAFLOW_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }

        if let Ok(bin) = std::env::var("PIAFLOW_GIT") {
            config.git_bin = bin;
        }

        if let Ok(bin) = std::env::var("PIAFLOW_KUBECTL") {
            config.kubectl_bin = bin;
        }

        if let Some(secs) = env_secs("PIAFLOW_POLL_INTERVAL")? {
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = env_secs("PIAFLOW_JOB_TIMEOUT")? {
            config.job_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_secs("PIAFLOW_JOB_TTL")? {
            config.job_ttl_after_finished = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Overrides the work directory
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            anyhow::bail!("work_dir cannot be empty");
        }

        if self.git_bin.trim().is_empty() {
            anyhow::bail!("git_bin cannot be empty");
        }

        if self.kubectl_bin.trim().is_empty() {
            anyhow::bail!("kubectl_bin cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.job_timeout < self.poll_interval {
            anyhow::bail!("job_timeout must be at least one poll_interval");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new("work")
    }
}

fn env_secs(key: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a number of seconds: {}", key, e)),
        Err(_) => Ok(None),
    }
}
