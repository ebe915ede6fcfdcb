//! Lock capability traits and scoped acquisition guards
//!
//! Native lock implementations live in `ecore-runtime`. Everything here is
//! written against the traits so that `Condition`, the queues and user code
//! can be parameterized over any lock type, including [`NullMutex`] for
//! single-threaded configurations.
//!
//! Guards release on every exit path (normal return, `?` propagation,
//! panic unwinding). A release failure inside `Drop` cannot be propagated
//! and is logged at error level instead.

use crate::error::{CoreError, CoreResult};

/// Exclusive lock capability: the generic unlock/relock protocol
///
/// `unlock` must only be called by the current holder. Implementations
/// report a detected violation as [`CoreError::InvalidState`].
pub trait Lockable {
    /// Block until the lock is acquired
    fn lock(&self) -> CoreResult<()>;

    /// Release the lock
    fn unlock(&self) -> CoreResult<()>;
}

/// Exclusive lock with non-blocking and timed acquisition
pub trait TimedLockable: Lockable {
    /// Acquire if free, return `false` otherwise
    fn try_lock(&self) -> CoreResult<bool>;

    /// Acquire within `milliseconds`, return `false` on timeout
    fn try_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool>;

    /// Acquire within `milliseconds`, fail with [`CoreError::Timeout`]
    fn lock_timeout(&self, milliseconds: u64) -> CoreResult<()> {
        if self.try_lock_timeout(milliseconds)? {
            Ok(())
        } else {
            Err(CoreError::Timeout)
        }
    }
}

/// Reader/writer lock capability
pub trait RwLockable {
    fn read_lock(&self) -> CoreResult<()>;
    fn write_lock(&self) -> CoreResult<()>;

    /// Release either a read or a write hold
    fn unlock(&self) -> CoreResult<()>;
}

/// A lock that does nothing
///
/// Every acquisition succeeds immediately. Use it to instantiate generic
/// code in configurations that need no synchronization.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMutex;

impl NullMutex {
    pub const fn new() -> Self {
        NullMutex
    }
}

impl Lockable for NullMutex {
    #[inline]
    fn lock(&self) -> CoreResult<()> {
        Ok(())
    }

    #[inline]
    fn unlock(&self) -> CoreResult<()> {
        Ok(())
    }
}

impl TimedLockable for NullMutex {
    #[inline]
    fn try_lock(&self) -> CoreResult<bool> {
        Ok(true)
    }

    #[inline]
    fn try_lock_timeout(&self, _milliseconds: u64) -> CoreResult<bool> {
        Ok(true)
    }
}

impl RwLockable for NullMutex {
    #[inline]
    fn read_lock(&self) -> CoreResult<()> {
        Ok(())
    }

    #[inline]
    fn write_lock(&self) -> CoreResult<()> {
        Ok(())
    }

    #[inline]
    fn unlock(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Holds a lock for the lifetime of the guard
///
/// # Example
///
/// ```ignore
/// let mutex = FastMutex::new()?;
/// {
///     let _guard = ScopedLock::new(&mutex)?;
///     // protected region
/// } // released here, also on early return or unwind
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedLock<'a, M: Lockable + ?Sized> {
    mutex: &'a M,
}

impl<'a, M: Lockable + ?Sized> ScopedLock<'a, M> {
    /// Acquire `mutex`, blocking
    pub fn new(mutex: &'a M) -> CoreResult<Self> {
        mutex.lock()?;
        Ok(Self { mutex })
    }
}

impl<'a, M: TimedLockable + ?Sized> ScopedLock<'a, M> {
    /// Acquire `mutex` within `milliseconds` or fail with `Timeout`
    pub fn with_timeout(mutex: &'a M, milliseconds: u64) -> CoreResult<Self> {
        mutex.lock_timeout(milliseconds)?;
        Ok(Self { mutex })
    }
}

impl<'a, M: Lockable + ?Sized> Drop for ScopedLock<'a, M> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            crate::kerror!("scoped lock release failed: {}", e);
        }
    }
}

/// Scoped lock that can also be released early
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedLockWithUnlock<'a, M: Lockable + ?Sized> {
    mutex: Option<&'a M>,
}

impl<'a, M: Lockable + ?Sized> ScopedLockWithUnlock<'a, M> {
    pub fn new(mutex: &'a M) -> CoreResult<Self> {
        mutex.lock()?;
        Ok(Self { mutex: Some(mutex) })
    }

    /// Release now; later calls and the drop are no-ops
    pub fn unlock(&mut self) -> CoreResult<()> {
        match self.mutex.take() {
            Some(m) => m.unlock(),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.mutex.is_some()
    }
}

impl<'a, M: TimedLockable + ?Sized> ScopedLockWithUnlock<'a, M> {
    pub fn with_timeout(mutex: &'a M, milliseconds: u64) -> CoreResult<Self> {
        mutex.lock_timeout(milliseconds)?;
        Ok(Self { mutex: Some(mutex) })
    }
}

impl<'a, M: Lockable + ?Sized> Drop for ScopedLockWithUnlock<'a, M> {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            crate::kerror!("scoped lock release failed: {}", e);
        }
    }
}

/// Inverse guard: the lock is re-acquired when the guard drops
///
/// With `unlock_now == false` the caller is expected to have released the
/// lock already (or to release it inside the scope).
#[must_use = "the lock is re-acquired as soon as the guard is dropped"]
pub struct ScopedUnlock<'a, M: Lockable + ?Sized> {
    mutex: &'a M,
}

impl<'a, M: Lockable + ?Sized> ScopedUnlock<'a, M> {
    pub fn new(mutex: &'a M, unlock_now: bool) -> CoreResult<Self> {
        if unlock_now {
            mutex.unlock()?;
        }
        Ok(Self { mutex })
    }
}

impl<'a, M: Lockable + ?Sized> Drop for ScopedUnlock<'a, M> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.lock() {
            crate::kerror!("scoped relock failed: {}", e);
        }
    }
}

/// Holds a read or write lock for the lifetime of the guard
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedRwLock<'a, L: RwLockable + ?Sized> {
    lock: &'a L,
}

impl<'a, L: RwLockable + ?Sized> ScopedRwLock<'a, L> {
    /// Acquire for writing if `write`, for reading otherwise
    pub fn new(lock: &'a L, write: bool) -> CoreResult<Self> {
        if write {
            lock.write_lock()?;
        } else {
            lock.read_lock()?;
        }
        Ok(Self { lock })
    }
}

impl<'a, L: RwLockable + ?Sized> Drop for ScopedRwLock<'a, L> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            crate::kerror!("scoped rwlock release failed: {}", e);
        }
    }
}

/// Shared (read) hold on a reader/writer lock
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedReadLock<'a, L: RwLockable + ?Sized>(ScopedRwLock<'a, L>);

impl<'a, L: RwLockable + ?Sized> ScopedReadLock<'a, L> {
    pub fn new(lock: &'a L) -> CoreResult<Self> {
        ScopedRwLock::new(lock, false).map(ScopedReadLock)
    }
}

/// Exclusive (write) hold on a reader/writer lock
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedWriteLock<'a, L: RwLockable + ?Sized>(ScopedRwLock<'a, L>);

impl<'a, L: RwLockable + ?Sized> ScopedWriteLock<'a, L> {
    pub fn new(lock: &'a L) -> CoreResult<Self> {
        ScopedRwLock::new(lock, true).map(ScopedWriteLock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Records lock/unlock calls, detects unbalanced use
    #[derive(Default)]
    struct CountingLock {
        held: Cell<i32>,
        locks: Cell<u32>,
        unlocks: Cell<u32>,
    }

    impl Lockable for CountingLock {
        fn lock(&self) -> CoreResult<()> {
            self.held.set(self.held.get() + 1);
            self.locks.set(self.locks.get() + 1);
            Ok(())
        }

        fn unlock(&self) -> CoreResult<()> {
            if self.held.get() == 0 {
                return Err(CoreError::InvalidState("unlock of unheld lock"));
            }
            self.held.set(self.held.get() - 1);
            self.unlocks.set(self.unlocks.get() + 1);
            Ok(())
        }
    }

    impl RwLockable for CountingLock {
        fn read_lock(&self) -> CoreResult<()> {
            Lockable::lock(self)
        }

        fn write_lock(&self) -> CoreResult<()> {
            self.held.set(self.held.get() + 100);
            Ok(())
        }

        fn unlock(&self) -> CoreResult<()> {
            let h = self.held.get();
            self.held.set(if h >= 100 { h - 100 } else { h - 1 });
            Ok(())
        }
    }

    #[test]
    fn test_scoped_lock_releases() {
        let l = CountingLock::default();
        {
            let _g = ScopedLock::new(&l).unwrap();
            assert_eq!(l.held.get(), 1);
        }
        assert_eq!(l.held.get(), 0);
    }

    #[test]
    fn test_scoped_lock_releases_on_early_return() {
        fn protected(l: &CountingLock) -> CoreResult<u32> {
            let _g = ScopedLock::new(l)?;
            Err(CoreError::Timeout)
        }

        let l = CountingLock::default();
        assert!(protected(&l).is_err());
        assert_eq!(l.held.get(), 0);
        assert_eq!(l.unlocks.get(), 1);
    }

    #[test]
    fn test_scoped_lock_releases_on_unwind() {
        let l = CountingLock::default();
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = ScopedLock::new(&l).unwrap();
            panic!("boom");
        }));
        assert!(r.is_err());
        assert_eq!(l.held.get(), 0);
    }

    #[test]
    fn test_scoped_lock_with_unlock() {
        let l = CountingLock::default();
        {
            let mut g = ScopedLockWithUnlock::new(&l).unwrap();
            assert!(g.is_locked());
            g.unlock().unwrap();
            assert!(!g.is_locked());
            assert_eq!(l.held.get(), 0);
            // second unlock is a no-op
            g.unlock().unwrap();
        }
        assert_eq!(l.unlocks.get(), 1);
    }

    #[test]
    fn test_scoped_unlock_relocks() {
        let l = CountingLock::default();
        Lockable::lock(&l).unwrap();
        {
            let _u = ScopedUnlock::new(&l, true).unwrap();
            assert_eq!(l.held.get(), 0);
        }
        assert_eq!(l.held.get(), 1);
    }

    #[test]
    fn test_scoped_rw_guards() {
        let l = CountingLock::default();
        {
            let _r = ScopedReadLock::new(&l).unwrap();
            assert_eq!(l.held.get(), 1);
        }
        {
            let _w = ScopedWriteLock::new(&l).unwrap();
            assert_eq!(l.held.get(), 100);
        }
        {
            let _w = ScopedRwLock::new(&l, true).unwrap();
            assert_eq!(l.held.get(), 100);
        }
        assert_eq!(l.held.get(), 0);
    }

    #[test]
    fn test_null_mutex() {
        let m = NullMutex::new();
        assert!(m.try_lock().unwrap());
        assert!(m.try_lock_timeout(10).unwrap());
        m.lock_timeout(0).unwrap();
        Lockable::unlock(&m).unwrap();
        let _g = ScopedLock::with_timeout(&m, 5).unwrap();
        let _r = ScopedReadLock::new(&m).unwrap();
    }
}
