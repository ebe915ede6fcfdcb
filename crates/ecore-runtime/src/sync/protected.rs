//! A value reachable only while its lock is held

use std::cell::UnsafeCell;

use ecore_core::{CoreResult, ScopedLock};

use super::FastMutex;

/// `T` guarded by a [`FastMutex`]
///
/// Access goes through [`Protected::with`], which holds the lock for the
/// duration of the closure. The closure must not call back into the same
/// `Protected` (the mutex is non-recursive and would report
/// `InvalidState`).
pub struct Protected<T> {
    lock: FastMutex,
    value: UnsafeCell<T>,
}

// SAFETY: the value is only reachable through `with`, under `lock`
unsafe impl<T: Send> Send for Protected<T> {}
unsafe impl<T: Send> Sync for Protected<T> {}

impl<T> Protected<T> {
    pub fn new(value: T) -> CoreResult<Self> {
        Ok(Self {
            lock: FastMutex::new()?,
            value: UnsafeCell::new(value),
        })
    }

    /// Run `f` with exclusive access to the value
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> CoreResult<R> {
        let _guard = ScopedLock::new(&self.lock)?;
        // SAFETY: the lock is held until `_guard` drops
        let value = unsafe { &mut *self.value.get() };
        Ok(f(value))
    }

    /// Exclusive access without locking, through a unique borrow
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Protected<T> {
    pub fn with_default() -> CoreResult<Self> {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for Protected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protected").finish_non_exhaustive()
    }
}
