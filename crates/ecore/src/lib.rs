//! # ecore - Native Synchronization and Managed Threads
//!
//! Building blocks for multithreaded services on POSIX systems.
//!
//! ## Features
//!
//! - **Locks**: recursive `Mutex`, error-checking `FastMutex`, writer-preferring
//!   `RwLock`, no-op `NullMutex`, with scoped guards for all of them
//! - **Signaling**: auto/manual-reset `Event`, FIFO `Condition`
//! - **Queues**: batch-draining `SingleNotificationQueue`, hand-off
//!   `MultiNotificationQueue`, bounded `BufferQueue`
//! - **Threads**: named, prioritized native threads with per-thread storage,
//!   panic capture and optional signal translation
//! - **Errors**: one `CoreError` type; uncaught thread failures go to a
//!   replaceable `ErrorHandler`
//!
//! ## Quick Start
//!
//! ```ignore
//! use ecore::{MultiNotificationQueue, Thread};
//! use std::sync::Arc;
//!
//! fn main() -> ecore::CoreResult<()> {
//!     ecore::init()?;
//!
//!     let queue = Arc::new(MultiNotificationQueue::new(64)?);
//!
//!     let mut consumer = Thread::with_name("consumer")?;
//!     let q = Arc::clone(&queue);
//!     consumer.start_fn(move || {
//!         while let Ok(Some(job)) = q.wait_dequeue() {
//!             if job < 0 {
//!                 break;
//!             }
//!             println!("got {}", job);
//!         }
//!     })?;
//!
//!     for job in 0..10 {
//!         queue.enqueue(job)?;
//!     }
//!     queue.enqueue(-1)?;
//!     consumer.join()
//! }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │          Thread, queues, Condition, scoped locks            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ecore-runtime                            │
//! │   pthread mutex/rwlock/cond, threads, signals, config       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ecore-core                              │
//! │   CoreError, lock traits, guards, AtomicCounter, kprint     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use ecore_core::{
    AtomicCounter,
    CoreError,
    CoreResult,
    ErrorKind,
    SystemError,
    Priority,
    ThreadState,
    ErrorHandler,
    DefaultErrorHandler,
    error_handler,
    handle_error,
    set_error_handler,
    Lockable,
    TimedLockable,
    RwLockable,
    NullMutex,
    ScopedLock,
    ScopedLockWithUnlock,
    ScopedUnlock,
    ScopedRwLock,
    ScopedReadLock,
    ScopedWriteLock,
};
pub use ecore_core::constants;

// Re-export kprint macros for debug logging
pub use ecore_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use ecore_core::kprint::{
    LogLevel, init as init_logging, set_log_level, set_flush_enabled, set_thread_tag,
};

// Re-export env utilities
pub use ecore_core::{env_get, env_get_bool, env_get_opt, env_get_size, env_is_set};

// Re-export runtime types
pub use ecore_runtime::{
    RuntimeConfig,
    ConfigError,
    Mutex,
    FastMutex,
    RwLock,
    Protected,
    Event,
    Condition,
    SingleNotificationQueue,
    MultiNotificationQueue,
    BufferQueue,
    Runnable,
    Thread,
    ThreadHandle,
    ThreadLocal,
    ThreadLocalStorage,
    Tid,
    SignalHandler,
    signal_name,
    throw_on_signal,
};
pub use ecore_runtime::thread::POLICY_DEFAULT;

/// Prepare the process for ecore
///
/// Reads logging settings from the environment and, when the configuration
/// enables signal translation by default, installs the signal handlers up
/// front. Everything works without calling this; it only moves the one-time
/// costs to a known point.
pub fn init() -> CoreResult<()> {
    init_with(&RuntimeConfig::from_env())
}

/// [`init`] with an explicit configuration
pub fn init_with(config: &RuntimeConfig) -> CoreResult<()> {
    init_logging();
    config
        .validate()
        .map_err(|_| CoreError::InvalidState("invalid runtime configuration"))?;
    if config.signal_scope {
        SignalHandler::install()?;
    }
    kdebug!("ecore initialized on {}", ecore_runtime::PLATFORM);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_init() {
        init().unwrap();
        init_with(&RuntimeConfig::new().signal_scope(true)).unwrap();
        assert!(SignalHandler::is_installed());
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let err = init_with(&RuntimeConfig::new().thread_stack_size(1024)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_queue_between_threads() {
        let queue = Arc::new(MultiNotificationQueue::new(8).unwrap());

        let mut consumer = Thread::with_name("facade-consumer").unwrap();
        let q = Arc::clone(&queue);
        let total = Arc::new(AtomicCounter::new(0));
        let t = Arc::clone(&total);
        consumer
            .start_fn(move || {
                while let Ok(Some(n)) = q.wait_dequeue() {
                    for _ in 0..n {
                        t.increment();
                    }
                }
            })
            .unwrap();

        for n in 1..=4 {
            while !queue.enqueue(n).unwrap() {
                Thread::yield_now().unwrap();
            }
        }
        // wait until consumed and parked again, then release the consumer
        while total.value() != 10 || !queue.has_idle_threads().unwrap() {
            Thread::sleep(1);
        }
        queue.wake_up_all().unwrap();
        consumer.join().unwrap();
        assert_eq!(total.value(), 10);
    }

    #[test]
    fn test_scoped_guards_over_runtime_locks() {
        let m = Mutex::new().unwrap();
        {
            let _outer = ScopedLock::new(&m).unwrap();
            // recursive
            let _inner = ScopedLock::new(&m).unwrap();
        }
        assert!(m.try_lock().unwrap());
        m.unlock().unwrap();

        let rw = RwLock::new().unwrap();
        {
            let _r1 = ScopedReadLock::new(&rw).unwrap();
            let _r2 = ScopedReadLock::new(&rw).unwrap();
        }
        {
            let _w = ScopedWriteLock::new(&rw).unwrap();
        }
        assert!(rw.try_write_lock().unwrap());
        rw.unlock().unwrap();
    }
}
