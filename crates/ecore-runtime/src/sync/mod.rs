//! Native synchronization primitives
//!
//! - `mutex` - `Mutex` (recursive) and `FastMutex` (error-checking) over pthread mutexes
//! - `rwlock` - `RwLock` with writer preference
//! - `event` - auto/manual reset `Event`
//! - `condition` - FIFO `Condition` over any `Lockable`
//! - `protected` - `Protected<T>`, a value only reachable under its `FastMutex`
//!
//! Every native object is boxed so its address stays fixed when the Rust
//! wrapper moves.

pub mod mutex;
pub mod rwlock;
pub mod event;
pub mod condition;
pub mod protected;

pub use mutex::{FastMutex, Mutex};
pub use rwlock::RwLock;
pub use event::Event;
pub use condition::Condition;
pub use protected::Protected;

use ecore_core::constants::TIMED_POLL_INTERVAL_US;
use ecore_core::CoreResult;
use std::time::{Duration, Instant};

/// Absolute deadline `milliseconds` from now on `clock`
pub(crate) fn deadline(clock: libc::clockid_t, milliseconds: u64) -> libc::timespec {
    // SAFETY: timespec is plain old data
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    unsafe {
        libc::clock_gettime(clock, &mut ts);
    }

    let secs = (milliseconds / 1000).min(i32::MAX as u64);
    let nsecs = (milliseconds % 1000) * 1_000_000;

    ts.tv_sec = ts.tv_sec.saturating_add(secs as libc::time_t);
    ts.tv_nsec += nsecs as libc::c_long;
    if ts.tv_nsec >= 1_000_000_000 {
        ts.tv_sec = ts.tv_sec.saturating_add(1);
        ts.tv_nsec -= 1_000_000_000;
    }
    ts
}

/// Retry `attempt` until it succeeds or `milliseconds` elapse
///
/// For operations with no native timed variant on the current platform.
pub(crate) fn poll_timeout(
    milliseconds: u64,
    mut attempt: impl FnMut() -> CoreResult<bool>,
) -> CoreResult<bool> {
    let deadline = Instant::now().checked_add(Duration::from_millis(milliseconds));
    loop {
        if attempt()? {
            return Ok(true);
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Ok(false);
            }
        }
        std::thread::sleep(Duration::from_micros(TIMED_POLL_INTERVAL_US));
    }
}
