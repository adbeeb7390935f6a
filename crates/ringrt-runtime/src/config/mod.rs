//! Runtime configuration.
//!
//! Compile-time defaults with environment-variable overrides, in the same
//! shape the rest of the workspace uses for its `SchedulerConfig`: a
//! `from_env()` constructor, a builder, `validate()`, and a `print()` for
//! operators.
//!
//! # Example
//!
//! ```rust,ignore
//! use ringrt_runtime::config::Config;
//!
//! let config = Config::from_env().num_workers(4);
//! config.validate().expect("invalid runtime config");
//! ```

pub mod defaults;

use ringrt_core::env::env_get;

/// Runtime configuration with builder-style overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// Submission/completion queue entries per worker's ring.
    pub ring_entries: u32,
    /// Flags passed to `io_uring_setup` (0 by default).
    pub ring_flags: u32,
    /// How many ready-task resumptions a worker runs before force-flushing
    /// pending ring submissions.
    pub submit_interval: u32,
    /// Number of worker threads.
    pub num_workers: usize,
    /// How many local-queue pops a worker does before checking the driver
    /// for completions even if the local queue is non-empty.
    pub check_io_interval: u32,
    /// How many local-queue pops a worker does before checking the global
    /// queue even if the local queue is non-empty.
    pub check_global_interval: u32,
    /// Per-worker local ready-queue capacity.
    pub local_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    /// Build a config from compile-time defaults with environment overrides.
    ///
    /// - `RT_RING_ENTRIES`
    /// - `RT_RING_FLAGS`
    /// - `RT_SUBMIT_INTERVAL`
    /// - `RT_NUM_WORKERS`
    /// - `RT_CHECK_IO_INTERVAL`
    /// - `RT_CHECK_GLOBAL_INTERVAL`
    pub fn from_env() -> Self {
        Self {
            ring_entries: env_get("RT_RING_ENTRIES", defaults::RING_ENTRIES),
            ring_flags: env_get("RT_RING_FLAGS", defaults::RING_FLAGS),
            submit_interval: env_get("RT_SUBMIT_INTERVAL", defaults::SUBMIT_INTERVAL),
            num_workers: env_get("RT_NUM_WORKERS", defaults::num_workers()),
            check_io_interval: env_get("RT_CHECK_IO_INTERVAL", defaults::CHECK_IO_INTERVAL),
            check_global_interval: env_get(
                "RT_CHECK_GLOBAL_INTERVAL",
                defaults::CHECK_GLOBAL_INTERVAL,
            ),
            local_queue_capacity: defaults::LOCAL_QUEUE_CAPACITY,
        }
    }

    /// Defaults with no environment override — useful in tests.
    pub fn new() -> Self {
        Self {
            ring_entries: defaults::RING_ENTRIES,
            ring_flags: defaults::RING_FLAGS,
            submit_interval: defaults::SUBMIT_INTERVAL,
            num_workers: defaults::num_workers(),
            check_io_interval: defaults::CHECK_IO_INTERVAL,
            check_global_interval: defaults::CHECK_GLOBAL_INTERVAL,
            local_queue_capacity: defaults::LOCAL_QUEUE_CAPACITY,
        }
    }

    pub fn ring_entries(mut self, n: u32) -> Self {
        self.ring_entries = n;
        self
    }

    pub fn ring_flags(mut self, flags: u32) -> Self {
        self.ring_flags = flags;
        self
    }

    pub fn submit_interval(mut self, n: u32) -> Self {
        self.submit_interval = n;
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn check_io_interval(mut self, n: u32) -> Self {
        self.check_io_interval = n;
        self
    }

    pub fn check_global_interval(mut self, n: u32) -> Self {
        self.check_global_interval = n;
        self
    }

    /// Validate configuration, returning the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > 256 {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if !self.ring_entries.is_power_of_two() {
            return Err(ConfigError::InvalidValue("ring_entries must be a power of two"));
        }
        if self.submit_interval == 0 {
            return Err(ConfigError::InvalidValue("submit_interval must be > 0"));
        }
        Ok(())
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ringrt configuration:")?;
        writeln!(f, "  ring_entries:           {}", self.ring_entries)?;
        writeln!(f, "  ring_flags:             {}", self.ring_flags)?;
        writeln!(f, "  submit_interval:        {}", self.submit_interval)?;
        writeln!(f, "  num_workers:            {}", self.num_workers)?;
        writeln!(f, "  check_io_interval:      {}", self.check_io_interval)?;
        writeln!(f, "  check_global_interval:  {}", self.check_global_interval)?;
        write!(f, "  local_queue_capacity:   {}", self.local_queue_capacity)
    }
}

/// Configuration error.
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_is_valid() {
        let config = Config::from_env();
        assert!(config.num_workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = Config::new().num_workers(8).submit_interval(2);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.submit_interval, 2);
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(Config::new().num_workers(0).validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_ring() {
        assert!(Config::new().ring_entries(100).validate().is_err());
    }

    #[test]
    fn display_is_non_empty() {
        assert!(!Config::new().to_string().is_empty());
    }
}
