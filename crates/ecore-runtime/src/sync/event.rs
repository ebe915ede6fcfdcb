//! Auto/manual reset event
//!
//! An event is a boolean flag with blocking waits. In auto-reset mode each
//! `set()` releases exactly one waiter, which clears the flag as it
//! returns. In manual-reset mode the flag stays set, releasing every
//! current and future waiter, until `reset()`.
//!
//! The internal mutex is held across the flag check and the wait
//! registration, so a `set()` racing a `wait()` is never lost.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

use ecore_core::{CoreError, CoreResult};

use super::mutex::RawMutex;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        // No pthread_condattr_setclock on Apple platforms
        const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;
    } else {
        const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
    }
}

pub struct Event {
    mutex: RawMutex,
    cond: Box<UnsafeCell<libc::pthread_cond_t>>,
    /// Only read or written with `mutex` held
    state: AtomicBool,
    auto_reset: bool,
}

// SAFETY: the condition variable is only used with `mutex` held
unsafe impl Send for Event {}
unsafe impl Sync for Event {}

impl Event {
    /// Create an unsignaled event
    pub fn new(auto_reset: bool) -> CoreResult<Self> {
        let mutex = RawMutex::new(libc::PTHREAD_MUTEX_NORMAL)?;
        let cond = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();

        unsafe {
            let rc = libc::pthread_condattr_init(attr.as_mut_ptr());
            if rc != 0 {
                return Err(CoreError::system("cannot create event (condition)", rc));
            }
            #[cfg(not(any(target_os = "macos", target_os = "ios")))]
            {
                let rc = libc::pthread_condattr_setclock(attr.as_mut_ptr(), WAIT_CLOCK);
                if rc != 0 {
                    libc::pthread_condattr_destroy(attr.as_mut_ptr());
                    return Err(CoreError::system("cannot create event (condition)", rc));
                }
            }
            let rc = libc::pthread_cond_init(cond.get(), attr.as_ptr());
            libc::pthread_condattr_destroy(attr.as_mut_ptr());
            if rc != 0 {
                return Err(CoreError::system("cannot create event (condition)", rc));
            }
        }

        Ok(Self {
            mutex,
            cond,
            state: AtomicBool::new(false),
            auto_reset,
        })
    }

    #[inline]
    pub fn is_auto_reset(&self) -> bool {
        self.auto_reset
    }

    /// Signal the event
    pub fn set(&self) -> CoreResult<()> {
        self.mutex.lock()?;
        self.state.store(true, Ordering::Relaxed);
        let rc = unsafe { libc::pthread_cond_broadcast(self.cond.get()) };
        self.mutex.unlock()?;
        if rc != 0 {
            return Err(CoreError::system("cannot signal event", rc));
        }
        Ok(())
    }

    /// Force the unsignaled state
    pub fn reset(&self) -> CoreResult<()> {
        self.mutex.lock()?;
        self.state.store(false, Ordering::Relaxed);
        self.mutex.unlock()
    }

    /// Block until signaled
    pub fn wait(&self) -> CoreResult<()> {
        self.mutex.lock()?;
        let result = self.wait_locked();
        self.mutex.unlock()?;
        result
    }

    /// Block until signaled or fail with `Timeout` after `milliseconds`
    pub fn wait_timeout(&self, milliseconds: u64) -> CoreResult<()> {
        if self.try_wait(milliseconds)? {
            Ok(())
        } else {
            Err(CoreError::Timeout)
        }
    }

    /// Block until signaled, `false` after `milliseconds`
    pub fn try_wait(&self, milliseconds: u64) -> CoreResult<bool> {
        let abstime = super::deadline(WAIT_CLOCK, milliseconds);
        self.mutex.lock()?;
        let result = self.timed_wait_locked(&abstime);
        self.mutex.unlock()?;
        result
    }

    fn wait_locked(&self) -> CoreResult<()> {
        while !self.state.load(Ordering::Relaxed) {
            let rc = unsafe { libc::pthread_cond_wait(self.cond.get(), self.mutex.as_ptr()) };
            if rc != 0 {
                return Err(CoreError::system("wait for event failed", rc));
            }
        }
        self.consume();
        Ok(())
    }

    fn timed_wait_locked(&self, abstime: &libc::timespec) -> CoreResult<bool> {
        while !self.state.load(Ordering::Relaxed) {
            let rc = unsafe {
                libc::pthread_cond_timedwait(self.cond.get(), self.mutex.as_ptr(), abstime)
            };
            match rc {
                0 => {}
                libc::ETIMEDOUT => {
                    // a set() may have landed between the timeout and reacquiring
                    if self.state.load(Ordering::Relaxed) {
                        break;
                    }
                    return Ok(false);
                }
                rc => return Err(CoreError::system("wait for event failed", rc)),
            }
        }
        self.consume();
        Ok(true)
    }

    #[inline]
    fn consume(&self) {
        if self.auto_reset {
            self.state.store(false, Ordering::Relaxed);
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_cond_destroy(self.cond.get());
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("auto_reset", &self.auto_reset)
            .finish_non_exhaustive()
    }
}
