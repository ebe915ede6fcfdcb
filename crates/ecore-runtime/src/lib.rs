//! # ecore-runtime
//!
//! POSIX implementation of the ecore foundation.
//!
//! This crate provides:
//! - Native locks (recursive and error-checking mutexes, writer-preferring
//!   read/write lock) and a value-guarding `Protected<T>`
//! - Events and a FIFO condition variable
//! - Notification queues (single and multi consumer) and a bounded buffer
//! - Managed threads with priorities, stack size and thread-local storage
//! - Signal translation scopes
//! - Build-time and environment configuration

pub mod config;
pub mod sync;
pub mod queue;
pub mod thread;
pub mod signal;

// Re-exports
pub use config::{ConfigError, RuntimeConfig};
pub use sync::{Condition, Event, FastMutex, Mutex, Protected, RwLock};
pub use queue::{BufferQueue, MultiNotificationQueue, SingleNotificationQueue};
pub use thread::{Runnable, Thread, ThreadHandle, ThreadLocal, ThreadLocalStorage, Tid};
pub use signal::{signal_name, throw_on_signal, SignalHandler};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "macos", target_os = "freebsd"))] {
        /// Name of the platform this runtime was built for
        pub const PLATFORM: &str = std::env::consts::OS;
    } else {
        compile_error!("Unsupported platform");
    }
}
