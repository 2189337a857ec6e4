//! Runtime configuration
//!
//! Defaults live in the constants below. `RuntimeConfig::global()` reads
//! environment overrides once per process:
//!
//! | Variable               | Field               |
//! |------------------------|---------------------|
//! | `TASKLET_POOL_WORKERS` | `pool_workers`      |
//! | `TASKLET_STACK_SIZE`   | `stack_size`        |
//! | `TASKLET_THREAD_NAME`  | `thread_name_prefix`|

use crate::{TaskletError, TaskletResult};
use once_cell::sync::Lazy;
use tracing::warn;

/// Default number of workers in a `TaskletPool`.
pub const DEFAULT_POOL_WORKERS: usize = 5;

/// Default stack size in bytes for a tasklet's backing thread (2 MB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Minimum accepted stack size in bytes (64 KB).
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Default prefix for tasklet thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "tasklet";

const ENV_POOL_WORKERS: &str = "TASKLET_POOL_WORKERS";
const ENV_STACK_SIZE: &str = "TASKLET_STACK_SIZE";
const ENV_THREAD_NAME: &str = "TASKLET_THREAD_NAME";

static GLOBAL: Lazy<RuntimeConfig> = Lazy::new(|| {
    RuntimeConfig::from_env().unwrap_or_else(|err| {
        warn!(error = %err, "ignoring invalid tasklet environment configuration");
        RuntimeConfig::default()
    })
});

/// Runtime-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Workers started by `TaskletPool::with_config` (0 = one per CPU)
    pub pool_workers: usize,

    /// Stack size in bytes for each tasklet's backing thread
    pub stack_size: usize,

    /// Prefix for tasklet thread names
    pub thread_name_prefix: String,
}

impl RuntimeConfig {
    /// Configuration with default values
    pub fn new() -> Self {
        Self {
            pool_workers: DEFAULT_POOL_WORKERS,
            stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }

    /// Process-wide configuration (defaults plus environment overrides)
    pub fn global() -> &'static RuntimeConfig {
        &GLOBAL
    }

    /// Defaults overridden by `TASKLET_*` environment variables
    pub fn from_env() -> TaskletResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TaskletResult<Self> {
        let mut config = Self::new();

        if let Some(raw) = lookup(ENV_POOL_WORKERS) {
            config.pool_workers = parse_usize(ENV_POOL_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STACK_SIZE) {
            config.stack_size = parse_usize(ENV_STACK_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_THREAD_NAME) {
            let prefix = raw.trim();
            if prefix.is_empty() {
                return Err(TaskletError::InvalidArgument(format!(
                    "{} must not be empty",
                    ENV_THREAD_NAME
                )));
            }
            config.thread_name_prefix = prefix.to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the pool worker count
    pub fn with_pool_workers(mut self, workers: usize) -> Self {
        self.pool_workers = workers;
        self
    }

    /// Set the tasklet stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Pool worker count with 0 resolved to the number of CPUs
    pub fn effective_pool_workers(&self) -> usize {
        if self.pool_workers == 0 {
            num_cpus::get()
        } else {
            self.pool_workers
        }
    }

    /// Check that every field is usable
    pub fn validate(&self) -> TaskletResult<()> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(TaskletError::InvalidArgument(format!(
                "stack size {} is below the minimum of {} bytes",
                self.stack_size, MIN_STACK_SIZE
            )));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_usize(key: &str, raw: &str) -> TaskletResult<usize> {
    raw.trim().parse::<usize>().map_err(|err| {
        TaskletError::InvalidArgument(format!("{}={:?}: {}", key, raw, err))
    })
}
