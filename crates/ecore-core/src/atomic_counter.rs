//! Fixed-width signed counter with atomic increment and decrement
//!
//! Used for reference counts, unique id generation and simple statistics.
//! Targets without 32-bit atomics fall back to a mutex-guarded integer.

use core::fmt;

cfg_if::cfg_if! {
    if #[cfg(target_has_atomic = "32")] {
        use core::sync::atomic::{AtomicI32, Ordering};

        struct Repr(AtomicI32);

        impl Repr {
            #[inline]
            const fn new(v: i32) -> Self {
                Repr(AtomicI32::new(v))
            }

            #[inline]
            fn load(&self) -> i32 {
                self.0.load(Ordering::Acquire)
            }

            #[inline]
            fn store(&self, v: i32) {
                self.0.store(v, Ordering::Release)
            }

            /// Add `delta`, returning the previous value
            #[inline]
            fn fetch_add(&self, delta: i32) -> i32 {
                self.0.fetch_add(delta, Ordering::AcqRel)
            }

            #[inline]
            fn compare_exchange(&self, current: i32, new: i32) -> Result<i32, i32> {
                self.0.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            }
        }
    } else {
        use std::sync::Mutex;

        struct Repr(Mutex<i32>);

        impl Repr {
            #[inline]
            const fn new(v: i32) -> Self {
                Repr(Mutex::new(v))
            }

            fn with<R>(&self, f: impl FnOnce(&mut i32) -> R) -> R {
                let mut guard = match self.0.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                f(&mut guard)
            }

            fn load(&self) -> i32 {
                self.with(|v| *v)
            }

            fn store(&self, new: i32) {
                self.with(|v| *v = new)
            }

            fn fetch_add(&self, delta: i32) -> i32 {
                self.with(|v| {
                    let prev = *v;
                    *v = v.wrapping_add(delta);
                    prev
                })
            }

            fn compare_exchange(&self, current: i32, new: i32) -> Result<i32, i32> {
                self.with(|v| {
                    if *v == current {
                        *v = new;
                        Ok(current)
                    } else {
                        Err(*v)
                    }
                })
            }
        }
    }
}

/// Atomic signed counter
///
/// `increment`/`decrement` return the new value (prefix semantics),
/// `fetch_increment`/`fetch_decrement` the previous one (postfix).
pub struct AtomicCounter {
    repr: Repr,
}

impl AtomicCounter {
    /// Create a counter with the given initial value
    pub const fn new(initial: i32) -> Self {
        Self { repr: Repr::new(initial) }
    }

    /// Current value
    #[inline]
    pub fn value(&self) -> i32 {
        self.repr.load()
    }

    /// Overwrite the value
    #[inline]
    pub fn set(&self, value: i32) {
        self.repr.store(value)
    }

    /// Increment and return the new value
    #[inline]
    pub fn increment(&self) -> i32 {
        self.repr.fetch_add(1).wrapping_add(1)
    }

    /// Increment and return the previous value
    #[inline]
    pub fn fetch_increment(&self) -> i32 {
        self.repr.fetch_add(1)
    }

    /// Decrement and return the new value
    #[inline]
    pub fn decrement(&self) -> i32 {
        self.repr.fetch_add(-1).wrapping_sub(1)
    }

    /// Decrement and return the previous value
    #[inline]
    pub fn fetch_decrement(&self) -> i32 {
        self.repr.fetch_add(-1)
    }

    /// Store `new` if the counter equals `current`
    ///
    /// Returns the previous value in both cases, `Ok` on success.
    #[inline]
    pub fn compare_exchange(&self, current: i32, new: i32) -> Result<i32, i32> {
        self.repr.compare_exchange(current, new)
    }

    /// True if the counter is zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.value() == 0
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for AtomicCounter {
    fn clone(&self) -> Self {
        Self::new(self.value())
    }
}

impl From<i32> for AtomicCounter {
    fn from(v: i32) -> Self {
        Self::new(v)
    }
}

impl fmt::Debug for AtomicCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCounter").field(&self.value()).finish()
    }
}
