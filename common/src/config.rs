//! Configuration types for runtime, output and fan-out settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary at the end
    pub print_summary: bool,
}

/// Errors detected before any transfer is launched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("host list {0:?} does not exist")]
    MissingHostList(std::path::PathBuf),
    #[error("source path {0:?} does not exist")]
    MissingSource(std::path::PathBuf),
    #[error("at least one source path and a destination path are required")]
    MissingPaths,
    #[error("parallelism must be a positive integer, got {0}")]
    NonPositiveParallel(usize),
    #[error("connection timeout must be a positive number of seconds")]
    NonPositiveTimeout,
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("--password and --ask-password are mutually exclusive")]
    ConflictingCredentials,
    #[error("host list contains no hosts (only blank lines or comments)")]
    EmptyHostList,
}

/// Orchestration settings shared by the scheduler, retry controller and aggregator
#[derive(Debug, Clone, Copy)]
pub struct FanoutSettings {
    /// Maximum number of outstanding transfers during the initial pass
    pub max_parallel: usize,
    /// Number of retry rounds for hosts that failed
    pub retries: u32,
    /// Delay between liveness checks while waiting for a free slot or for stragglers
    pub poll_interval: std::time::Duration,
    /// Pause before each retry round
    pub retry_delay: std::time::Duration,
    /// Keep per-host log and status artifacts instead of purging them
    pub keep_artifacts: bool,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            retries: 0,
            poll_interval: std::time::Duration::from_millis(100),
            retry_delay: std::time::Duration::from_secs(2),
            keep_artifacts: false,
        }
    }
}

impl FanoutSettings {
    /// Validate settings and return errors if invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::NonPositiveParallel(self.max_parallel));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}
