//! FIFO condition variable
//!
//! Built from per-waiter [`Event`]s queued under a [`FastMutex`] rather
//! than a native condition variable, which gives two guarantees the native
//! one lacks: waiters are released strictly in arrival order, and the
//! associated lock can be any [`Lockable`].
//!
//! `wait` returns with the lock *released*; the caller re-acquires it
//! (Mesa semantics). `wait_relock` and `try_wait_relock` re-acquire it
//! before returning.

use std::collections::VecDeque;
use std::sync::Arc;

use ecore_core::{CoreError, CoreResult, Lockable};

use super::{Event, Protected};

pub struct Condition {
    waiters: Protected<VecDeque<Arc<Event>>>,
}

impl Condition {
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            waiters: Protected::new(VecDeque::new())?,
        })
    }

    /// Release `lockable` and block until signaled
    ///
    /// `lockable` must be held by the caller. It is released atomically
    /// with the wait registration, so a `signal()` issued by a thread that
    /// acquires `lockable` afterwards always reaches this waiter.
    pub fn wait<L: Lockable + ?Sized>(&self, lockable: &L) -> CoreResult<()> {
        let event = self.enqueue(lockable)?;
        match event.wait() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.withdraw(&event)?;
                Err(e)
            }
        }
    }

    /// Like [`wait`](Self::wait), failing with `Timeout` after `milliseconds`
    pub fn wait_timeout<L: Lockable + ?Sized>(&self, lockable: &L, milliseconds: u64) -> CoreResult<()> {
        if self.try_wait(lockable, milliseconds)? {
            Ok(())
        } else {
            Err(CoreError::Timeout)
        }
    }

    /// Like [`wait`](Self::wait), returning `false` after `milliseconds`
    ///
    /// A waiter that times out removes its own registration. If a
    /// concurrent `signal()` already took it, the signal counts and the
    /// wait reports success.
    pub fn try_wait<L: Lockable + ?Sized>(&self, lockable: &L, milliseconds: u64) -> CoreResult<bool> {
        let event = self.enqueue(lockable)?;
        match event.try_wait(milliseconds) {
            Ok(true) => Ok(true),
            Ok(false) => Ok(!self.withdraw(&event)?),
            Err(e) => {
                self.withdraw(&event)?;
                Err(e)
            }
        }
    }

    /// [`wait`](Self::wait), then re-acquire `lockable`
    pub fn wait_relock<L: Lockable + ?Sized>(&self, lockable: &L) -> CoreResult<()> {
        let result = self.wait(lockable);
        lockable.lock()?;
        result
    }

    /// [`try_wait`](Self::try_wait), then re-acquire `lockable`
    ///
    /// The lock is re-acquired whatever the outcome.
    pub fn try_wait_relock<L: Lockable + ?Sized>(&self, lockable: &L, milliseconds: u64) -> CoreResult<bool> {
        let result = self.try_wait(lockable, milliseconds);
        lockable.lock()?;
        result
    }

    /// Wake the longest-waiting thread, if any
    ///
    /// Returns whether a waiter was released.
    pub fn signal(&self) -> CoreResult<bool> {
        self.waiters
            .with(|q| match q.pop_front() {
                Some(event) => event.set().map(|_| true),
                None => Ok(false),
            })?
    }

    /// Wake every waiting thread
    pub fn broadcast(&self) -> CoreResult<()> {
        self.waiters.with(|q| {
            for event in q.drain(..) {
                event.set()?;
            }
            Ok(())
        })?
    }

    /// Number of threads currently registered as waiting
    pub fn waiter_count(&self) -> CoreResult<usize> {
        self.waiters.with(|q| q.len())
    }

    fn enqueue<L: Lockable + ?Sized>(&self, lockable: &L) -> CoreResult<Arc<Event>> {
        let event = Arc::new(Event::new(true)?);
        self.waiters.with(|q| {
            lockable.unlock()?;
            q.push_back(Arc::clone(&event));
            Ok::<_, CoreError>(())
        })??;
        Ok(event)
    }

    /// Remove `event` from the wait queue, `true` if it was still there
    fn withdraw(&self, event: &Arc<Event>) -> CoreResult<bool> {
        self.waiters.with(|q| match q.iter().position(|e| Arc::ptr_eq(e, event)) {
            Some(pos) => {
                q.remove(pos);
                true
            }
            None => false,
        })
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::FastMutex;
    use ecore_core::NullMutex;
    use rand::Rng;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_waiters(cond: &Condition, n: usize) {
        let start = Instant::now();
        while cond.waiter_count().unwrap() < n {
            assert!(start.elapsed() < Duration::from_secs(5), "waiters never arrived");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_signal_wakes_in_fifo_order() {
        const WAITERS: usize = 5;
        let lock = Arc::new(FastMutex::new().unwrap());
        let cond = Arc::new(Condition::new().unwrap());
        let order = Arc::new(Protected::new(Vec::new()).unwrap());
        let mut handles = vec![];

        for i in 0..WAITERS {
            let lock = Arc::clone(&lock);
            let c = Arc::clone(&cond);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                lock.lock().unwrap();
                c.wait(&*lock).unwrap();
                order.with(|o| o.push(i)).unwrap();
            }));
            // registration order is arrival order
            wait_for_waiters(&cond, i + 1);
        }

        for n in 1..=WAITERS {
            cond.signal().unwrap();
            let start = Instant::now();
            while order.with(|o| o.len()).unwrap() < n {
                assert!(start.elapsed() < Duration::from_secs(5));
                thread::sleep(Duration::from_millis(1));
            }
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(order.with(|o| o.clone()).unwrap(), (0..WAITERS).collect::<Vec<_>>());
    }

    #[test]
    fn test_broadcast_wakes_all() {
        let lock = Arc::new(FastMutex::new().unwrap());
        let cond = Arc::new(Condition::new().unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let cond = Arc::clone(&cond);
                thread::spawn(move || {
                    lock.lock().unwrap();
                    cond.wait_relock(&*lock).unwrap();
                    lock.unlock().unwrap();
                })
            })
            .collect();

        wait_for_waiters(&cond, 4);
        cond.broadcast().unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cond.waiter_count().unwrap(), 0);
    }

    #[test]
    fn test_signal_without_waiters_is_noop() {
        let cond = Condition::new().unwrap();
        assert!(!cond.signal().unwrap());
        cond.broadcast().unwrap();

        let lock = NullMutex::new();
        assert!(!cond.try_wait(&lock, 10).unwrap());
    }

    #[test]
    fn test_timeout_removes_registration() {
        let lock = FastMutex::new().unwrap();
        let cond = Condition::new().unwrap();

        lock.lock().unwrap();
        let err = cond.wait_timeout(&lock, 20).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(cond.waiter_count().unwrap(), 0);

        // the lock came back released
        assert!(lock.try_lock().unwrap());
        assert!(!cond.try_wait_relock(&lock, 10).unwrap());
        // relocked
        lock.unlock().unwrap();
    }

    #[test]
    fn test_timeout_racing_signal_is_not_lost() {
        const ROUNDS: usize = 300;
        let lock = Arc::new(FastMutex::new().unwrap());
        let cond = Arc::new(Condition::new().unwrap());
        let mut rng = rand::thread_rng();

        for _ in 0..ROUNDS {
            let timeout = rng.gen_range(0..3u64);
            let delay = rng.gen_range(0..3000u64);

            let waiter = {
                let lock = Arc::clone(&lock);
                let cond = Arc::clone(&cond);
                thread::spawn(move || {
                    lock.lock().unwrap();
                    cond.try_wait(&*lock, timeout).unwrap()
                })
            };

            thread::sleep(Duration::from_micros(delay));
            let released = cond.signal().unwrap();
            let woke = waiter.join().unwrap();

            // a signal that took the registration is never lost, and a
            // waiter that timed out left nothing behind
            assert_eq!(released, woke);
            assert_eq!(cond.waiter_count().unwrap(), 0);
        }
    }
}
