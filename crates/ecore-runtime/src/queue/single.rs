//! Batch-draining notification queue
//!
//! Producers append; a consumer wakes and takes *everything* pending in
//! one go. All blocked consumers wake together on new items, and the first
//! to reach the queue gets the batch. Suited to a single consumer thread
//! that amortizes wakeups over many items.

use std::collections::VecDeque;

use ecore_core::{CoreError, CoreResult};

use crate::config::RuntimeConfig;
use crate::sync::{Event, Protected};

struct Pending<T> {
    items: VecDeque<T>,
    /// `wake_up_all` requested and not yet consumed by a drain
    woken: bool,
}

impl<T> Pending<T> {
    /// State `available` must mirror
    #[inline]
    fn signaled(&self) -> bool {
        self.woken || !self.items.is_empty()
    }
}

pub struct SingleNotificationQueue<T> {
    items: Protected<Pending<T>>,
    /// Set exactly while items are pending or a wake-up was requested;
    /// only changed with `items` locked
    available: Event,
    max: usize,
}

impl<T> SingleNotificationQueue<T> {
    /// Create a queue holding at most `max` items
    pub fn new(max: usize) -> CoreResult<Self> {
        Ok(Self {
            items: Protected::new(Pending {
                items: VecDeque::new(),
                woken: false,
            })?,
            available: Event::new(false)?,
            max,
        })
    }

    /// Create a queue with the configured capacity
    pub fn from_config(config: &RuntimeConfig) -> CoreResult<Self> {
        Self::new(config.queue_capacity)
    }

    /// Append `item`, `false` if the queue is full
    pub fn enqueue(&self, item: T) -> CoreResult<bool> {
        self.items.with(|p| {
            if p.items.len() >= self.max {
                return Ok(false);
            }
            p.items.push_back(item);
            self.available.set()?;
            Ok(true)
        })?
    }

    /// Block until items arrive, then move all of them into `out`
    ///
    /// Returns `false` when woken with nothing to take, either by
    /// [`wake_up_all`](Self::wake_up_all) or because another consumer
    /// drained the batch first.
    pub fn wait_dequeue(&self, out: &mut Vec<T>) -> CoreResult<bool> {
        self.available.wait()?;
        self.drain(out)
    }

    /// Like [`wait_dequeue`](Self::wait_dequeue), failing with `Timeout`
    pub fn wait_dequeue_timeout(&self, out: &mut Vec<T>, milliseconds: u64) -> CoreResult<bool> {
        if !self.available.try_wait(milliseconds)? {
            return Err(CoreError::Timeout);
        }
        self.drain(out)
    }

    /// Like [`wait_dequeue`](Self::wait_dequeue), `false` on timeout
    pub fn try_wait_dequeue(&self, out: &mut Vec<T>, milliseconds: u64) -> CoreResult<bool> {
        match self.wait_dequeue_timeout(out, milliseconds) {
            Err(CoreError::Timeout) => Ok(false),
            other => other,
        }
    }

    /// Release every blocked consumer
    ///
    /// The wake-up stays pending, so consumers arriving later return
    /// immediately too, until the next batch is drained.
    pub fn wake_up_all(&self) -> CoreResult<()> {
        self.items.with(|p| {
            p.woken = true;
            self.available.set()
        })?
    }

    pub fn size(&self) -> CoreResult<usize> {
        self.items.with(|p| p.items.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        self.items.with(|p| p.items.is_empty())
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max
    }

    /// Drop all pending items
    ///
    /// A pending wake-up survives; otherwise consumers block again.
    pub fn clear(&self) -> CoreResult<()> {
        self.items.with(|p| {
            p.items.clear();
            if !p.signaled() {
                self.available.reset()?;
            }
            Ok(())
        })?
    }

    fn drain(&self, out: &mut Vec<T>) -> CoreResult<bool> {
        self.items.with(|p| {
            if p.items.is_empty() {
                // woken with nothing, or the batch went to another consumer
                if !p.signaled() {
                    self.available.reset()?;
                }
                return Ok(false);
            }
            out.extend(p.items.drain(..));
            p.woken = false;
            self.available.reset()?;
            Ok(true)
        })?
    }
}

impl<T> std::fmt::Debug for SingleNotificationQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleNotificationQueue")
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_batch_drain() {
        let q = SingleNotificationQueue::new(8).unwrap();
        for i in 0..5 {
            assert!(q.enqueue(i).unwrap());
        }
        assert_eq!(q.size().unwrap(), 5);

        let mut out = Vec::new();
        assert!(q.wait_dequeue(&mut out).unwrap());
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty().unwrap());

        // nothing pending: the event was reset with the drain
        assert!(!q.try_wait_dequeue(&mut out, 10).unwrap());
    }

    #[test]
    fn test_overflow_rejected() {
        let q = SingleNotificationQueue::new(2).unwrap();
        assert!(q.enqueue('a').unwrap());
        assert!(q.enqueue('b').unwrap());
        assert!(!q.enqueue('c').unwrap());
        assert_eq!(q.size().unwrap(), q.max_size());

        q.clear().unwrap();
        assert!(q.enqueue('d').unwrap());
    }

    #[test]
    fn test_clear_rearms_blocking() {
        let q = SingleNotificationQueue::new(4).unwrap();
        let mut out = Vec::new();
        assert!(q.enqueue(1).unwrap());
        q.clear().unwrap();

        let start = Instant::now();
        assert!(q.wait_dequeue_timeout(&mut out, 20).unwrap_err().is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert!(out.is_empty());
    }

    #[test]
    fn test_wake_up_survives_clear_until_drain() {
        let q = SingleNotificationQueue::new(4).unwrap();
        let mut out = Vec::new();
        q.wake_up_all().unwrap();
        q.enqueue(7).unwrap();
        q.clear().unwrap();

        // still pending for every later consumer
        assert!(!q.wait_dequeue_timeout(&mut out, 20).unwrap());
        assert!(!q.wait_dequeue_timeout(&mut out, 20).unwrap());

        // a drained batch consumes it
        q.enqueue(8).unwrap();
        assert!(q.wait_dequeue(&mut out).unwrap());
        assert_eq!(out, vec![8]);
        assert!(q.wait_dequeue_timeout(&mut out, 20).unwrap_err().is_timeout());
    }

    #[test]
    fn test_timeout() {
        let q = SingleNotificationQueue::<u32>::new(2).unwrap();
        let mut out = Vec::new();
        assert!(q.wait_dequeue_timeout(&mut out, 20).unwrap_err().is_timeout());
        assert!(out.is_empty());
    }

    #[test]
    fn test_consumer_wakes_on_enqueue() {
        let q = Arc::new(SingleNotificationQueue::new(16).unwrap());
        let q2 = Arc::clone(&q);
        let consumer = thread::spawn(move || {
            let mut out = Vec::new();
            while out.len() < 3 {
                q2.wait_dequeue(&mut out).unwrap();
            }
            out
        });

        thread::sleep(Duration::from_millis(20));
        for i in 0..3 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(consumer.join().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_wake_up_all_releases_every_consumer() {
        let q = Arc::new(SingleNotificationQueue::<u32>::new(4).unwrap());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut out = Vec::new();
                    q.wait_dequeue(&mut out).unwrap()
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        q.wake_up_all().unwrap();

        for c in consumers {
            assert!(!c.join().unwrap());
        }
    }
}
