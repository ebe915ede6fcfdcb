//! Thread-local storage for managed threads
//!
//! Two per-native-thread bindings:
//! - the `ThreadData` of the managed thread running here, set by the entry
//!   trampoline and read by `Thread::current()`;
//! - the slot map behind [`ThreadLocal`], created on first use and
//!   destroyed at native thread exit or by [`ThreadLocalStorage::clear`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use ecore_core::AtomicCounter;

use super::data::ThreadData;

thread_local! {
    /// Managed thread running on this native thread
    static CURRENT: RefCell<Option<Arc<ThreadData>>> = const { RefCell::new(None) };

    /// ThreadLocal slots of this native thread, by key
    static SLOTS: RefCell<HashMap<usize, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

static NEXT_KEY: AtomicCounter = AtomicCounter::new(0);

/// Bind the calling native thread to `data`
pub(crate) fn set_current(data: Arc<ThreadData>) {
    CURRENT.with(|c| *c.borrow_mut() = Some(data));
}

/// Remove the binding
pub(crate) fn clear_current() {
    // dropped outside the borrow
    let previous = CURRENT.try_with(|c| c.borrow_mut().take()).ok().flatten();
    drop(previous);
}

pub(crate) fn current() -> Option<Arc<ThreadData>> {
    CURRENT.try_with(|c| c.borrow().clone()).ok().flatten()
}

/// A value with one independent instance per thread
///
/// Each thread sees its own `T`, created with `T::default()` on first
/// access. Distinct `ThreadLocal`s never share slots, even of the same
/// type.
///
/// # Example
///
/// ```ignore
/// static REQUESTS: OnceLock<ThreadLocal<u64>> = OnceLock::new();
/// let counter = REQUESTS.get_or_init(ThreadLocal::new);
/// counter.with(|n| *n += 1);
/// ```
pub struct ThreadLocal<T> {
    key: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Default + 'static> ThreadLocal<T> {
    pub fn new() -> Self {
        Self {
            key: NEXT_KEY.increment() as usize,
            _marker: PhantomData,
        }
    }

    /// Run `f` on this thread's instance
    ///
    /// Accessing the same `ThreadLocal` again from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let cell = self.slot();
        let mut value = cell.borrow_mut();
        f(&mut value)
    }

    /// Overwrite this thread's instance
    pub fn set(&self, value: T) {
        self.with(|v| *v = value)
    }

    fn slot(&self) -> Rc<RefCell<T>> {
        SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            if let Some(existing) = slots.get(&self.key) {
                if let Ok(cell) = Rc::clone(existing).downcast::<RefCell<T>>() {
                    return cell;
                }
            }
            let cell = Rc::new(RefCell::new(T::default()));
            slots.insert(self.key, Rc::clone(&cell) as Rc<dyn Any>);
            cell
        })
    }
}

impl<T: Default + Clone + 'static> ThreadLocal<T> {
    /// Copy of this thread's instance
    pub fn get(&self) -> T {
        self.with(|v| v.clone())
    }
}

impl<T: Default + 'static> Default for ThreadLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ThreadLocal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadLocal").field("key", &self.key).finish()
    }
}

/// The calling thread's slot map as a whole
pub struct ThreadLocalStorage;

impl ThreadLocalStorage {
    /// Destroy every `ThreadLocal` instance of the calling thread
    ///
    /// Later accesses start again from `T::default()`.
    pub fn clear() {
        let slots = SLOTS
            .try_with(|s| std::mem::take(&mut *s.borrow_mut()))
            .unwrap_or_default();
        // destructors may touch other ThreadLocals
        drop(slots);
    }

    /// Number of slots in use on the calling thread
    pub fn len() -> usize {
        SLOTS.try_with(|s| s.borrow().len()).unwrap_or(0)
    }
}
