//! Engine configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the validation engine and both executors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of concurrently running sandboxes, system-wide.
    pub admission_limit: usize,
    /// Optional bound on the admission wait queue. `None` keeps the
    /// original unbounded behavior.
    pub max_queue_depth: Option<usize>,
    /// Default execution timeout when the request does not carry one.
    pub default_timeout: Duration,
    /// Extra time after the timeout before the hard kill fires.
    pub kill_grace: Duration,
    /// Maximum validator memory in bytes.
    pub max_memory: u64,
    /// Maximum open files for Runtime A subprocesses.
    pub max_open_files: u32,
    /// Maximum processes for Runtime A subprocesses.
    pub max_processes: u32,
    /// Python interpreter used to run the Runtime A driver.
    pub python_bin: PathBuf,
    /// Epoch interruption interval for Runtime B deadline checks.
    pub epoch_tick_interval: Duration,
    /// Optional fuel (instruction count) limit for Runtime B.
    pub max_fuel: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission_limit: 4,
            max_queue_depth: None,
            default_timeout: Duration::from_secs(10),
            kill_grace: Duration::from_secs(2),
            max_memory: 64 * 1024 * 1024, // 64MB
            max_open_files: 16,
            max_processes: 1,
            python_bin: PathBuf::from("python3"),
            epoch_tick_interval: Duration::from_millis(10),
            max_fuel: None,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for EngineConfig.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for creating EngineConfig instances.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    admission_limit: Option<usize>,
    max_queue_depth: Option<usize>,
    default_timeout: Option<Duration>,
    kill_grace: Option<Duration>,
    max_memory: Option<u64>,
    max_open_files: Option<u32>,
    max_processes: Option<u32>,
    python_bin: Option<PathBuf>,
    epoch_tick_interval: Option<Duration>,
    max_fuel: Option<u64>,
}

impl EngineConfigBuilder {
    /// Set the maximum number of concurrently running sandboxes.
    pub fn admission_limit(mut self, limit: usize) -> Self {
        self.admission_limit = Some(limit);
        self
    }

    /// Bound the admission wait queue; excess requests are rejected.
    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Set the default execution timeout.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the grace period between timeout and hard kill.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = Some(grace);
        self
    }

    /// Set the maximum validator memory in bytes.
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Set the open-file limit for Runtime A subprocesses.
    pub fn max_open_files(mut self, limit: u32) -> Self {
        self.max_open_files = Some(limit);
        self
    }

    /// Set the process limit for Runtime A subprocesses.
    pub fn max_processes(mut self, limit: u32) -> Self {
        self.max_processes = Some(limit);
        self
    }

    /// Set the Python interpreter path for the Runtime A driver.
    pub fn python_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_bin = Some(path.into());
        self
    }

    /// Set the epoch tick interval for Runtime B deadline checks.
    pub fn epoch_tick_interval(mut self, interval: Duration) -> Self {
        self.epoch_tick_interval = Some(interval);
        self
    }

    /// Set the fuel (instruction count) limit for Runtime B.
    pub fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Build the EngineConfig.
    pub fn build(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            admission_limit: self.admission_limit.unwrap_or(default.admission_limit),
            max_queue_depth: self.max_queue_depth.or(default.max_queue_depth),
            default_timeout: self.default_timeout.unwrap_or(default.default_timeout),
            kill_grace: self.kill_grace.unwrap_or(default.kill_grace),
            max_memory: self.max_memory.unwrap_or(default.max_memory),
            max_open_files: self.max_open_files.unwrap_or(default.max_open_files),
            max_processes: self.max_processes.unwrap_or(default.max_processes),
            python_bin: self.python_bin.unwrap_or(default.python_bin),
            epoch_tick_interval: self
                .epoch_tick_interval
                .unwrap_or(default.epoch_tick_interval),
            max_fuel: self.max_fuel.or(default.max_fuel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.admission_limit, 4);
        assert_eq!(config.max_queue_depth, None);
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.max_memory, 64 * 1024 * 1024);
        assert_eq!(config.max_processes, 1);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .admission_limit(2)
            .max_queue_depth(16)
            .default_timeout(Duration::from_secs(5))
            .kill_grace(Duration::from_millis(500))
            .max_memory(32 * 1024 * 1024)
            .max_fuel(1_000_000)
            .python_bin("/usr/bin/python3.12")
            .build();

        assert_eq!(config.admission_limit, 2);
        assert_eq!(config.max_queue_depth, Some(16));
        assert_eq!(config.default_timeout, Duration::from_secs(5));
        assert_eq!(config.kill_grace, Duration::from_millis(500));
        assert_eq!(config.max_memory, 32 * 1024 * 1024);
        assert_eq!(config.max_fuel, Some(1_000_000));
        assert_eq!(config.python_bin, PathBuf::from("/usr/bin/python3.12"));
    }
}
