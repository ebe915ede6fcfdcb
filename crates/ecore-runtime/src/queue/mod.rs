//! Bounded producer/consumer queues
//!
//! - `single` - `SingleNotificationQueue`: consumers drain whole batches
//! - `multi` - `MultiNotificationQueue`: one item per consumer, direct hand-off
//! - `buffer` - `BufferQueue`: non-blocking bounded FIFO
//!
//! A full queue rejects `enqueue` with `false`. That is backpressure for
//! the producer to act on, not an error.

pub mod single;
pub mod multi;
pub mod buffer;

pub use single::SingleNotificationQueue;
pub use multi::MultiNotificationQueue;
pub use buffer::BufferQueue;
