//! Reader/writer lock with writer preference
//!
//! Wraps a pthread rwlock behind a turnstile mutex. A writer holds the
//! turnstile while it waits for the native lock, so readers arriving after
//! it queue on the turnstile instead of overtaking it. Readers already
//! inside drain normally and the writer gets in.
//!
//! Read locks are not reentrant: a thread holding a read lock that asks
//! for another one while a writer is queued deadlocks.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use ecore_core::{CoreError, CoreResult, RwLockable};

use super::FastMutex;

pub struct RwLock {
    inner: Box<UnsafeCell<libc::pthread_rwlock_t>>,
    turnstile: FastMutex,
    /// Readers plus writer currently holding the lock
    holders: AtomicUsize,
}

// SAFETY: pthread rwlocks are designed to be shared; storage is boxed
unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    pub fn new() -> CoreResult<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_RWLOCK_INITIALIZER));
        let rc = unsafe { libc::pthread_rwlock_init(inner.get(), std::ptr::null()) };
        if rc != 0 {
            return Err(CoreError::system("cannot create reader/writer lock", rc));
        }
        Ok(Self {
            inner,
            turnstile: FastMutex::new()?,
            holders: AtomicUsize::new(0),
        })
    }

    /// Acquire a shared hold, blocking
    pub fn read_lock(&self) -> CoreResult<()> {
        // wait behind any queued writer
        self.turnstile.lock()?;
        self.turnstile.unlock()?;
        let rc = unsafe { libc::pthread_rwlock_rdlock(self.inner.get()) };
        self.acquired(rc, "cannot lock reader/writer lock")
    }

    /// Acquire a shared hold if immediately available
    pub fn try_read_lock(&self) -> CoreResult<bool> {
        if !self.turnstile.try_lock()? {
            return Ok(false);
        }
        self.turnstile.unlock()?;
        let rc = unsafe { libc::pthread_rwlock_tryrdlock(self.inner.get()) };
        self.try_acquired(rc)
    }

    /// Acquire a shared hold within `milliseconds`
    pub fn try_read_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool> {
        super::poll_timeout(milliseconds, || self.try_read_lock())
    }

    /// Acquire the exclusive hold, blocking
    pub fn write_lock(&self) -> CoreResult<()> {
        self.turnstile.lock()?;
        let rc = unsafe { libc::pthread_rwlock_wrlock(self.inner.get()) };
        self.turnstile.unlock()?;
        self.acquired(rc, "cannot lock reader/writer lock")
    }

    /// Acquire the exclusive hold if immediately available
    pub fn try_write_lock(&self) -> CoreResult<bool> {
        if !self.turnstile.try_lock()? {
            return Ok(false);
        }
        let rc = unsafe { libc::pthread_rwlock_trywrlock(self.inner.get()) };
        self.turnstile.unlock()?;
        self.try_acquired(rc)
    }

    /// Acquire the exclusive hold within `milliseconds`
    ///
    /// New readers are held back for the whole wait.
    pub fn try_write_lock_timeout(&self, milliseconds: u64) -> CoreResult<bool> {
        let start = std::time::Instant::now();
        if !self.turnstile.try_lock_timeout(milliseconds)? {
            return Ok(false);
        }
        let spent = start.elapsed().as_millis() as u64;
        let result = super::poll_timeout(milliseconds.saturating_sub(spent), || {
            let rc = unsafe { libc::pthread_rwlock_trywrlock(self.inner.get()) };
            self.try_acquired(rc)
        });
        self.turnstile.unlock()?;
        result
    }

    /// Release a read or write hold
    ///
    /// Unlocking a lock nobody holds fails with `InvalidState`. Releasing a
    /// hold owned by another thread is a caller error and is not detected.
    pub fn unlock(&self) -> CoreResult<()> {
        self.holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| CoreError::InvalidState("reader/writer lock not held"))?;
        match unsafe { libc::pthread_rwlock_unlock(self.inner.get()) } {
            0 => Ok(()),
            libc::EPERM => Err(CoreError::InvalidState("reader/writer lock not held")),
            rc => Err(CoreError::system("cannot unlock reader/writer lock", rc)),
        }
    }

    fn acquired(&self, rc: libc::c_int, op: &'static str) -> CoreResult<()> {
        match rc {
            0 => {
                self.holders.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            libc::EDEADLK => Err(CoreError::InvalidState(
                "reader/writer lock already held for writing by calling thread",
            )),
            rc => Err(CoreError::system(op, rc)),
        }
    }

    fn try_acquired(&self, rc: libc::c_int) -> CoreResult<bool> {
        match rc {
            libc::EBUSY => Ok(false),
            rc => self.acquired(rc, "cannot lock reader/writer lock").map(|_| true),
        }
    }
}

impl RwLockable for RwLock {
    #[inline]
    fn read_lock(&self) -> CoreResult<()> {
        RwLock::read_lock(self)
    }

    #[inline]
    fn write_lock(&self) -> CoreResult<()> {
        RwLock::write_lock(self)
    }

    #[inline]
    fn unlock(&self) -> CoreResult<()> {
        RwLock::unlock(self)
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_rwlock_destroy(self.inner.get());
        }
    }
}

impl std::fmt::Debug for RwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RwLock")
            .field("holders", &self.holders.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecore_core::{ErrorKind, ScopedReadLock, ScopedWriteLock};
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_readers_coexist() {
        const READERS: usize = 4;
        let l = Arc::new(RwLock::new().unwrap());
        let barrier = Arc::new(Barrier::new(READERS));

        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                let l = Arc::clone(&l);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let _r = ScopedReadLock::new(&*l).unwrap();
                    // every reader must be inside at once to pass
                    barrier.wait();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_writer_excludes_readers() {
        let l = RwLock::new().unwrap();
        l.write_lock().unwrap();
        assert!(!l.try_read_lock().unwrap());
        assert!(!l.try_write_lock().unwrap());
        l.unlock().unwrap();

        l.read_lock().unwrap();
        assert!(l.try_read_lock().unwrap());
        assert!(!l.try_write_lock().unwrap());
        l.unlock().unwrap();
        l.unlock().unwrap();
    }

    #[test]
    fn test_unlock_unheld() {
        let l = RwLock::new().unwrap();
        assert_eq!(l.unlock().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_timed_variants() {
        let l = Arc::new(RwLock::new().unwrap());
        l.read_lock().unwrap();

        let l2 = Arc::clone(&l);
        let got = thread::spawn(move || l2.try_write_lock_timeout(30).unwrap())
            .join()
            .unwrap();
        assert!(!got);

        // the expired writer must not leave readers blocked
        assert!(l.try_read_lock_timeout(30).unwrap());
        l.unlock().unwrap();
        l.unlock().unwrap();

        assert!(l.try_write_lock_timeout(30).unwrap());
        l.unlock().unwrap();
    }

    #[test]
    fn test_writer_not_starved() {
        const READERS: usize = 4;
        let l = Arc::new(RwLock::new().unwrap());
        let stop = Arc::new(AtomicBool::new(false));

        // readers overlap continuously, so without writer preference the
        // lock would never be free
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let l = Arc::clone(&l);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let _r = ScopedReadLock::new(&*l).unwrap();
                        thread::sleep(Duration::from_millis(2));
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        for _ in 0..10 {
            let _w = ScopedWriteLock::new(&*l).unwrap();
        }
        let elapsed = start.elapsed();

        stop.store(true, Ordering::Relaxed);
        for h in readers {
            h.join().unwrap();
        }

        assert!(elapsed < Duration::from_secs(5), "writer starved: {:?}", elapsed);
    }
}
