//! Runtime configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder methods (programmatic)
//! 2. Environment variables (runtime)
//! 3. User's ecore_config.rs (compile-time, via `ECORE_CONFIG_RS`)
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use ecore_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .queue_capacity(64)
//!     .signal_scope(true);
//! config.validate()?;
//! ```

pub mod defaults;

use ecore_core::constants::MIN_STACK_SIZE;
use ecore_core::env::{env_get, env_get_bool, env_get_size};

/// Settings applied to managed threads and queues created from a config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for new threads, 0 for the platform default
    pub thread_stack_size: usize,
    /// Run thread targets inside the signal translation scope
    pub signal_scope: bool,
    /// Prefix of auto-generated thread names
    pub thread_name_prefix: String,
    /// Capacity for queues built with `from_config`; 0 buffers nothing, so
    /// a `MultiNotificationQueue` only hands items to parked consumers
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `ECORE_THREAD_STACK_SIZE` - Stack size in bytes, k/m/g suffix accepted
    /// - `ECORE_THREAD_SIGNAL_SCOPE` - Run targets under signal translation (0/1)
    /// - `ECORE_THREAD_NAME_PREFIX` - Prefix of generated thread names
    /// - `ECORE_QUEUE_CAPACITY` - Default queue capacity
    pub fn from_env() -> Self {
        Self {
            thread_stack_size: env_get_size("ECORE_THREAD_STACK_SIZE", defaults::THREAD_STACK_SIZE),
            signal_scope: env_get_bool("ECORE_THREAD_SIGNAL_SCOPE", defaults::THREAD_SIGNAL_SCOPE),
            thread_name_prefix: env_get(
                "ECORE_THREAD_NAME_PREFIX",
                defaults::THREAD_NAME_PREFIX.to_string(),
            ),
            queue_capacity: env_get("ECORE_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
        }
    }

    /// Create config with compile-time defaults only (no env override).
    pub fn new() -> Self {
        Self {
            thread_stack_size: defaults::THREAD_STACK_SIZE,
            signal_scope: defaults::THREAD_SIGNAL_SCOPE,
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }

    // Builder methods

    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    pub fn signal_scope(mut self, enable: bool) -> Self {
        self.signal_scope = enable;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_stack_size != 0 && self.thread_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue(
                "thread_stack_size must be 0 or >= 16KB",
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name_prefix must not be empty"));
        }
        Ok(())
    }

    /// Log configuration at info level
    pub fn print(&self) {
        ecore_core::kinfo!("ecore configuration:");
        ecore_core::kinfo!("  thread_stack_size:   {}", self.thread_stack_size);
        ecore_core::kinfo!("  signal_scope:        {}", self.signal_scope);
        ecore_core::kinfo!("  thread_name_prefix:  {}", self.thread_name_prefix);
        ecore_core::kinfo!("  queue_capacity:      {}", self.queue_capacity);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
