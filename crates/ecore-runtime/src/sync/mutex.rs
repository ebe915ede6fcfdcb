//! Exclusive locks over pthread mutexes
//!
//! `Mutex` is recursive: the holder may lock again and must unlock once per
//! lock. `FastMutex` is non-recursive and error-checking: relocking from the
//! holder and unlocking from a non-holder are both reported as
//! `InvalidState` instead of deadlocking or corrupting the lock.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use ecore_core::{CoreError, CoreResult, Lockable, ScopedLock, TimedLockable};

/// Owned pthread mutex of a fixed type
pub(crate) struct RawMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

// SAFETY: pthread mutexes are designed to be shared between threads; the
// boxed storage never moves while the wrapper is alive.
unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    pub(crate) fn new(kind: libc::c_int) -> CoreResult<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();

        unsafe {
            let rc = libc::pthread_mutexattr_init(attr.as_mut_ptr());
            if rc != 0 {
                return Err(CoreError::system("cannot create mutex", rc));
            }
            let rc = libc::pthread_mutexattr_settype(attr.as_mut_ptr(), kind);
            if rc != 0 {
                libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
                return Err(CoreError::system("cannot create mutex", rc));
            }
            let rc = libc::pthread_mutex_init(inner.get(), attr.as_ptr());
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            if rc != 0 {
                return Err(CoreError::system("cannot create mutex", rc));
            }
        }

        Ok(Self { inner })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }

    pub(crate) fn lock(&self) -> CoreResult<()> {
        match unsafe { libc::pthread_mutex_lock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EDEADLK => Err(CoreError::InvalidState("mutex already held by calling thread")),
            rc => Err(CoreError::system("cannot lock mutex", rc)),
        }
    }

    pub(crate) fn try_lock(&self) -> CoreResult<bool> {
        match unsafe { libc::pthread_mutex_trylock(self.as_ptr()) } {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            rc => Err(CoreError::system("cannot lock mutex", rc)),
        }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn try_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool> {
        // timedlock always measures against CLOCK_REALTIME
        let abstime = super::deadline(libc::CLOCK_REALTIME, milliseconds);
        match unsafe { libc::pthread_mutex_timedlock(self.as_ptr(), &abstime) } {
            0 => Ok(true),
            libc::ETIMEDOUT => Ok(false),
            libc::EDEADLK => Err(CoreError::InvalidState("mutex already held by calling thread")),
            rc => Err(CoreError::system("cannot lock mutex", rc)),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn try_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool> {
        super::poll_timeout(milliseconds, || self.try_lock())
    }

    pub(crate) fn unlock(&self) -> CoreResult<()> {
        match unsafe { libc::pthread_mutex_unlock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EPERM => Err(CoreError::InvalidState("mutex not held by calling thread")),
            rc => Err(CoreError::system("cannot unlock mutex", rc)),
        }
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(self.as_ptr());
        }
    }
}

macro_rules! native_mutex {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        pub struct $name {
            raw: RawMutex,
        }

        impl $name {
            pub fn new() -> CoreResult<Self> {
                Ok(Self { raw: RawMutex::new($kind)? })
            }

            /// Block until acquired
            #[inline]
            pub fn lock(&self) -> CoreResult<()> {
                self.raw.lock()
            }

            /// Acquire within `milliseconds` or fail with `Timeout`
            #[inline]
            pub fn lock_timeout(&self, milliseconds: u64) -> CoreResult<()> {
                TimedLockable::lock_timeout(self, milliseconds)
            }

            /// Acquire if free
            #[inline]
            pub fn try_lock(&self) -> CoreResult<bool> {
                self.raw.try_lock()
            }

            /// Acquire within `milliseconds`, `false` on timeout
            #[inline]
            pub fn try_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool> {
                self.raw.try_lock_timeout(milliseconds)
            }

            #[inline]
            pub fn unlock(&self) -> CoreResult<()> {
                self.raw.unlock()
            }

            /// Lock and return a guard that unlocks on drop
            pub fn guard(&self) -> CoreResult<ScopedLock<'_, Self>> {
                ScopedLock::new(self)
            }
        }

        impl Lockable for $name {
            #[inline]
            fn lock(&self) -> CoreResult<()> {
                self.raw.lock()
            }

            #[inline]
            fn unlock(&self) -> CoreResult<()> {
                self.raw.unlock()
            }
        }

        impl TimedLockable for $name {
            #[inline]
            fn try_lock(&self) -> CoreResult<bool> {
                self.raw.try_lock()
            }

            #[inline]
            fn try_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool> {
                self.raw.try_lock_timeout(milliseconds)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish_non_exhaustive()
            }
        }
    };
}

native_mutex!(
    /// Recursive exclusive lock
    ///
    /// The holder may acquire it again; each `lock` needs a matching `unlock`.
    Mutex,
    libc::PTHREAD_MUTEX_RECURSIVE
);

native_mutex!(
    /// Non-recursive exclusive lock
    ///
    /// Cheaper than [`Mutex`]. A relock from the holder fails with
    /// `InvalidState` rather than deadlocking.
    FastMutex,
    libc::PTHREAD_MUTEX_ERRORCHECK
);
