//! Non-blocking bounded FIFO

use std::collections::VecDeque;

use ecore_core::CoreResult;

use crate::sync::Protected;

pub struct BufferQueue<T> {
    items: Protected<VecDeque<T>>,
    max: usize,
}

impl<T> BufferQueue<T> {
    pub fn new(max: usize) -> CoreResult<Self> {
        Ok(Self {
            items: Protected::new(VecDeque::new())?,
            max,
        })
    }

    /// Append `item`, `false` if full
    pub fn enqueue(&self, item: T) -> CoreResult<bool> {
        self.items.with(|q| {
            if q.len() >= self.max {
                false
            } else {
                q.push_back(item);
                true
            }
        })
    }

    pub fn dequeue(&self) -> CoreResult<Option<T>> {
        self.items.with(|q| q.pop_front())
    }

    /// Move up to `max` items into `out`, returning how many moved
    pub fn dequeue_batch(&self, out: &mut Vec<T>, max: usize) -> CoreResult<usize> {
        self.items.with(|q| {
            let n = max.min(q.len());
            out.extend(q.drain(..n));
            n
        })
    }

    pub fn size(&self) -> CoreResult<usize> {
        self.items.with(|q| q.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        self.items.with(|q| q.is_empty())
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max
    }
}
