//! # ecore-core
//!
//! Core types and traits for the ecore synchronization and managed-thread
//! foundation.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! All native implementations (pthread locks, events, threads, signal
//! translation) are in `ecore-runtime`.
//!
//! ## Modules
//!
//! - `atomic_counter` - Atomic signed counter
//! - `error` - Error types
//! - `error_handler` - Process-wide handler for uncaught thread failures
//! - `lock` - Lock capability traits, `NullMutex` and scoped guards
//! - `state` - Thread state and priority enums
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod atomic_counter;
pub mod error;
pub mod error_handler;
pub mod lock;
pub mod state;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use atomic_counter::AtomicCounter;
pub use error::{CoreError, CoreResult, ErrorKind, SystemError};
pub use error_handler::{
    error_handler, handle_error, set_error_handler, DefaultErrorHandler, ErrorHandler,
};
pub use lock::{
    Lockable, NullMutex, RwLockable, ScopedLock, ScopedLockWithUnlock, ScopedReadLock,
    ScopedRwLock, ScopedUnlock, ScopedWriteLock, TimedLockable,
};
pub use state::{Priority, ThreadState};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size, env_is_set};

/// Shared constants
pub mod constants {
    /// Prefix of auto-generated thread names ("thread#1", "thread#2", ...)
    pub const DEFAULT_THREAD_NAME_PREFIX: &str = "thread#";

    /// Queue capacity used when none is configured
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

    /// Smallest stack size accepted for a managed thread
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Poll interval for timed operations without a native timed variant
    pub const TIMED_POLL_INTERVAL_US: u64 = 500;
}
