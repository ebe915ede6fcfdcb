//! Hand-off notification queue
//!
//! Each consumer takes one item at a time. When consumers are parked, a
//! producer hands its item straight to the one that has waited longest,
//! bypassing the buffer; otherwise the item is buffered, up to `max`.
//! Parked consumers are served in FIFO order.
//!
//! Lock order is queue state, then a waiter's slot, then its event.

use std::collections::VecDeque;
use std::sync::Arc;

use ecore_core::{CoreError, CoreResult};

use crate::config::RuntimeConfig;
use crate::sync::{Event, Protected};

/// A parked consumer
struct WaitInfo<T> {
    slot: Protected<Option<T>>,
    available: Event,
}

struct State<T> {
    items: VecDeque<T>,
    waiters: VecDeque<Arc<WaitInfo<T>>>,
}

/// How a withdrawn registration ended
enum Withdrawn<T> {
    /// a producer handed an item over first
    Delivered(T),
    /// `wake_up_all` released it first
    Released,
    /// still registered; now removed
    Removed,
}

pub struct MultiNotificationQueue<T> {
    state: Protected<State<T>>,
    max: usize,
}

impl<T> MultiNotificationQueue<T> {
    /// Create a queue buffering at most `max` items
    pub fn new(max: usize) -> CoreResult<Self> {
        Ok(Self {
            state: Protected::new(State {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
            })?,
            max,
        })
    }

    /// Create a queue with the configured capacity
    pub fn from_config(config: &RuntimeConfig) -> CoreResult<Self> {
        Self::new(config.queue_capacity)
    }

    /// Deliver `item` to a parked consumer or append it
    ///
    /// `false` if no consumer is parked and the buffer is full.
    pub fn enqueue(&self, item: T) -> CoreResult<bool> {
        self.push(item, false)
    }

    /// Like [`enqueue`](Self::enqueue), but a buffered item goes to the front
    pub fn enqueue_urgent(&self, item: T) -> CoreResult<bool> {
        self.push(item, true)
    }

    /// Take the next item, blocking until one is available
    ///
    /// `None` means the consumer was released by
    /// [`wake_up_all`](Self::wake_up_all).
    pub fn wait_dequeue(&self) -> CoreResult<Option<T>> {
        let info = match self.take_or_park()? {
            Ok(item) => return Ok(Some(item)),
            Err(info) => info,
        };
        if let Err(e) = info.available.wait() {
            return match self.withdraw(&info)? {
                Withdrawn::Delivered(item) => Ok(Some(item)),
                Withdrawn::Released => Ok(None),
                Withdrawn::Removed => Err(e),
            };
        }
        info.slot.with(|s| s.take())
    }

    /// Like [`wait_dequeue`](Self::wait_dequeue), failing with `Timeout`
    /// after `milliseconds`
    ///
    /// An item handed over while the wait was expiring is still returned.
    pub fn wait_dequeue_timeout(&self, milliseconds: u64) -> CoreResult<Option<T>> {
        let info = match self.take_or_park()? {
            Ok(item) => return Ok(Some(item)),
            Err(info) => info,
        };
        let expired = match info.available.try_wait(milliseconds) {
            Ok(true) => return info.slot.with(|s| s.take()),
            Ok(false) => CoreError::Timeout,
            Err(e) => e,
        };
        match self.withdraw(&info)? {
            Withdrawn::Delivered(item) => Ok(Some(item)),
            Withdrawn::Released => Ok(None),
            Withdrawn::Removed => Err(expired),
        }
    }

    /// Like [`wait_dequeue_timeout`](Self::wait_dequeue_timeout), `Ok(None)`
    /// on timeout
    pub fn try_wait_dequeue(&self, milliseconds: u64) -> CoreResult<Option<T>> {
        match self.wait_dequeue_timeout(milliseconds) {
            Err(CoreError::Timeout) => Ok(None),
            other => other,
        }
    }

    /// Release every parked consumer with nothing
    pub fn wake_up_all(&self) -> CoreResult<()> {
        self.state.with(|st| {
            for info in st.waiters.drain(..) {
                info.available.set()?;
            }
            Ok(())
        })?
    }

    /// True if at least one consumer is parked
    pub fn has_idle_threads(&self) -> CoreResult<bool> {
        self.state.with(|st| !st.waiters.is_empty())
    }

    /// Number of buffered items (handed-off items are not counted)
    pub fn size(&self) -> CoreResult<usize> {
        self.state.with(|st| st.items.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        self.state.with(|st| st.items.is_empty())
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max
    }

    /// Drop all buffered items
    pub fn clear(&self) -> CoreResult<()> {
        self.state.with(|st| st.items.clear())
    }

    fn push(&self, item: T, urgent: bool) -> CoreResult<bool> {
        self.state.with(|st| {
            if let Some(info) = st.waiters.pop_front() {
                info.slot.with(|s| *s = Some(item))?;
                info.available.set()?;
                return Ok(true);
            }
            if st.items.len() >= self.max {
                return Ok(false);
            }
            if urgent {
                st.items.push_front(item);
            } else {
                st.items.push_back(item);
            }
            Ok(true)
        })?
    }

    /// Take back a parked consumer's registration after a failed wait
    ///
    /// Runs under the same lock producers deliver under: either the item
    /// already landed in the slot, or nobody can deliver to it any more.
    fn withdraw(&self, info: &Arc<WaitInfo<T>>) -> CoreResult<Withdrawn<T>> {
        self.state.with(|st| {
            if let Some(item) = info.slot.with(|s| s.take())? {
                return Ok(Withdrawn::Delivered(item));
            }
            match st.waiters.iter().position(|w| Arc::ptr_eq(w, info)) {
                Some(pos) => {
                    st.waiters.remove(pos);
                    Ok(Withdrawn::Removed)
                }
                None => Ok(Withdrawn::Released),
            }
        })?
    }

    /// Pop a buffered item, or register the caller as a parked consumer
    fn take_or_park(&self) -> CoreResult<Result<T, Arc<WaitInfo<T>>>> {
        // allocate outside the lock
        let info = Arc::new(WaitInfo {
            slot: Protected::new(None)?,
            available: Event::new(true)?,
        });
        self.state.with(|st| match st.items.pop_front() {
            Some(item) => Ok(item),
            None => {
                st.waiters.push_back(Arc::clone(&info));
                Err(info)
            }
        })
    }
}

impl<T> std::fmt::Debug for MultiNotificationQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiNotificationQueue")
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_idle(q: &MultiNotificationQueue<u32>, n: usize) {
        let start = Instant::now();
        while q.state.with(|st| st.waiters.len()).unwrap() < n {
            assert!(start.elapsed() < Duration::from_secs(5), "consumers never parked");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_capacity_round_trip() {
        let q = MultiNotificationQueue::new(10).unwrap();
        for i in 0..10 {
            assert!(q.enqueue(i).unwrap());
        }
        assert!(!q.enqueue(10).unwrap());
        assert_eq!(q.size().unwrap(), 10);

        for i in 0..10 {
            assert_eq!(q.wait_dequeue().unwrap(), Some(i));
        }
        assert!(q.is_empty().unwrap());
    }

    #[test]
    fn test_full_queue_accepts_again_after_one_dequeue() {
        let q = MultiNotificationQueue::new(3).unwrap();
        for i in 0..3 {
            assert!(q.enqueue(i).unwrap());
        }
        assert!(!q.enqueue(3).unwrap());

        assert_eq!(q.wait_dequeue().unwrap(), Some(0));
        assert!(q.enqueue(3).unwrap());
        assert!(!q.enqueue(4).unwrap());
        assert_eq!(q.size().unwrap(), 3);
    }

    #[test]
    fn test_withdraw_outcomes() {
        let q = MultiNotificationQueue::<u32>::new(4).unwrap();

        // still parked: removed, later items are buffered
        let info = q.take_or_park().unwrap().unwrap_err();
        assert!(matches!(q.withdraw(&info).unwrap(), Withdrawn::Removed));
        assert!(!q.has_idle_threads().unwrap());
        q.enqueue(1).unwrap();
        assert_eq!(q.size().unwrap(), 1);
        q.clear().unwrap();

        // handed an item before withdrawing: the item is kept
        let info = q.take_or_park().unwrap().unwrap_err();
        q.enqueue(2).unwrap();
        assert!(matches!(q.withdraw(&info).unwrap(), Withdrawn::Delivered(2)));
        assert!(q.is_empty().unwrap());

        // released by wake_up_all first
        let info = q.take_or_park().unwrap().unwrap_err();
        q.wake_up_all().unwrap();
        assert!(matches!(q.withdraw(&info).unwrap(), Withdrawn::Released));
        assert!(!q.has_idle_threads().unwrap());
    }

    #[test]
    fn test_urgent_goes_first() {
        let q = MultiNotificationQueue::new(4).unwrap();
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        q.enqueue_urgent(0).unwrap();
        assert_eq!(q.wait_dequeue().unwrap(), Some(0));
        assert_eq!(q.wait_dequeue().unwrap(), Some(1));
        assert_eq!(q.wait_dequeue().unwrap(), Some(2));
    }

    #[test]
    fn test_hand_off_bypasses_buffer() {
        let q = Arc::new(MultiNotificationQueue::new(1).unwrap());
        let q2 = Arc::clone(&q);
        let consumer = thread::spawn(move || q2.wait_dequeue().unwrap());

        wait_for_idle(&q, 1);
        assert!(q.has_idle_threads().unwrap());

        assert!(q.enqueue(42).unwrap());
        // delivered directly, never buffered
        assert_eq!(q.size().unwrap(), 0);
        assert_eq!(consumer.join().unwrap(), Some(42));
        assert!(!q.has_idle_threads().unwrap());
    }

    #[test]
    fn test_parked_consumers_served_fifo() {
        let q = Arc::new(MultiNotificationQueue::new(0).unwrap());
        let mut consumers = vec![];
        for i in 0..3 {
            let q2 = Arc::clone(&q);
            consumers.push(thread::spawn(move || q2.wait_dequeue().unwrap()));
            wait_for_idle(&q, i + 1);
        }

        // zero capacity: only hand-off succeeds
        for item in 100..103 {
            assert!(q.enqueue(item).unwrap());
        }
        assert!(!q.enqueue(999).unwrap());

        let got: Vec<_> = consumers.into_iter().map(|c| c.join().unwrap()).collect();
        assert_eq!(got, vec![Some(100), Some(101), Some(102)]);
    }

    #[test]
    fn test_timeout_deregisters() {
        let q = MultiNotificationQueue::<u32>::new(4).unwrap();
        assert!(q.wait_dequeue_timeout(20).unwrap_err().is_timeout());
        assert!(!q.has_idle_threads().unwrap());
        assert_eq!(q.try_wait_dequeue(5).unwrap(), None);

        // nothing stale is left to swallow the next item
        q.enqueue(7).unwrap();
        assert_eq!(q.size().unwrap(), 1);
    }

    #[test]
    fn test_wake_up_all() {
        let q = Arc::new(MultiNotificationQueue::<u32>::new(4).unwrap());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.wait_dequeue().unwrap())
            })
            .collect();

        wait_for_idle(&q, 3);
        q.wake_up_all().unwrap();
        for c in consumers {
            assert_eq!(c.join().unwrap(), None);
        }
        assert!(!q.has_idle_threads().unwrap());
    }

    #[test]
    fn test_timeout_racing_delivery_loses_nothing() {
        const ROUNDS: usize = 300;
        let q = Arc::new(MultiNotificationQueue::new(0).unwrap());
        let mut rng = rand::thread_rng();
        let delivered = Arc::new(AtomicUsize::new(0));

        for round in 0..ROUNDS as u32 {
            let timeout = rng.gen_range(0..3u64);
            let delay = rng.gen_range(0..3000u64);

            let consumer = {
                let q = Arc::clone(&q);
                let delivered = Arc::clone(&delivered);
                thread::spawn(move || match q.wait_dequeue_timeout(timeout) {
                    Ok(Some(item)) => {
                        delivered.fetch_add(1, Ordering::SeqCst);
                        Some(item)
                    }
                    Ok(None) => panic!("released without wake_up_all"),
                    Err(e) => {
                        assert!(e.is_timeout());
                        None
                    }
                })
            };

            thread::sleep(Duration::from_micros(delay));
            // capacity 0: accepted means handed to the consumer
            let accepted = q.enqueue(round).unwrap();
            let got = consumer.join().unwrap();

            if accepted {
                assert_eq!(got, Some(round), "accepted item lost");
            } else {
                assert_eq!(got, None);
            }
            assert!(!q.has_idle_threads().unwrap());
        }
    }
}
