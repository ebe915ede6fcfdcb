//! State shared between a `Thread` and its running native thread
//!
//! Held through an `Arc`: the `Thread` owns one reference, the entry
//! trampoline another for as long as the target runs. Either side may go
//! first; the record is destroyed with the last reference.

use ecore_core::{CoreError, CoreResult, Priority, ThreadState};

use crate::sync::{Event, Protected};

/// Native thread identity, as returned by `Thread::current_tid()`
pub type Tid = usize;

pub(crate) struct Settings {
    pub name: String,
    pub priority: Priority,
    pub os_priority: i32,
    pub policy: i32,
    /// Priority or policy set explicitly; applied at start
    pub sched_explicit: bool,
    pub stack_size: usize,
    pub signal_scope: bool,
    pub state: ThreadState,
    pub tid: Option<Tid>,
    /// Failure of the last run
    pub outcome: Option<CoreError>,
}

pub(crate) struct ThreadData {
    id: i32,
    pub settings: Protected<Settings>,
    /// Manual reset: stays set once the run has completed
    pub done: Event,
}

impl ThreadData {
    pub fn new(id: i32, settings: Settings) -> CoreResult<Self> {
        Ok(Self {
            id,
            settings: Protected::new(settings)?,
            done: Event::new(false)?,
        })
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> CoreResult<String> {
        self.settings.with(|s| s.name.clone())
    }

    pub fn state(&self) -> CoreResult<ThreadState> {
        self.settings.with(|s| s.state)
    }

    /// Record the outcome of a run and mark it finished
    pub fn finish(&self, outcome: CoreResult<()>) -> CoreResult<()> {
        self.settings.with(|s| {
            s.outcome = outcome.err();
            s.state = ThreadState::Finished;
        })
    }
}

impl std::fmt::Debug for ThreadData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadData").field("id", &self.id).finish_non_exhaustive()
    }
}
