//! Managed native threads
//!
//! A [`Thread`] wraps one native thread: name, numeric id, scheduling
//! priority, stack size request and a completion event joiners wait on.
//! The record it shares with the running thread is reference counted, so
//! dropping a `Thread` while its target runs simply detaches it.
//!
//! # Lifecycle
//!
//! `Created -> Running -> Finished -> Joined`. A finished or joined thread
//! may be started again; starting a running one fails with
//! `InvalidState`.
//!
//! # Failures
//!
//! A target that panics, or trips a translated signal when the thread runs
//! under signal translation, still completes the run: the failure is
//! reported to the installed `ErrorHandler` and returned by `join`.

pub mod data;
pub mod priority;
pub mod tls;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use ecore_core::{
    kdebug, kerror, kprint, kwarn, AtomicCounter, CoreError, CoreResult, Priority, ThreadState,
};

use crate::config::RuntimeConfig;
use crate::signal;
pub use data::Tid;
use data::{Settings, ThreadData};
pub use priority::POLICY_DEFAULT;
pub use tls::{ThreadLocal, ThreadLocalStorage};

static NEXT_ID: AtomicCounter = AtomicCounter::new(0);
static DEFAULT_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

fn default_config() -> &'static RuntimeConfig {
    DEFAULT_CONFIG.get_or_init(RuntimeConfig::from_env)
}

/// Work run by a thread, shareable between several threads
pub trait Runnable: Send + Sync {
    fn run(&self);
}

impl<F: Fn() + Send + Sync> Runnable for F {
    fn run(&self) {
        self()
    }
}

enum Target {
    Runnable(Arc<dyn Runnable>),
    Callable(Box<dyn FnOnce() + Send>),
}

impl Target {
    fn run(self) {
        match self {
            Target::Runnable(r) => r.run(),
            Target::Callable(f) => f(),
        }
    }
}

/// A managed native thread
pub struct Thread {
    data: Arc<ThreadData>,
    native: Option<JoinHandle<()>>,
}

impl Thread {
    /// Create a thread named `<prefix><id>` ("thread#1", ...)
    pub fn new() -> CoreResult<Self> {
        Self::build(None, default_config())
    }

    /// Create a thread with an explicit name
    pub fn with_name(name: impl Into<String>) -> CoreResult<Self> {
        Self::build(Some(name.into()), default_config())
    }

    /// Create a thread taking stack size, signal translation and name
    /// prefix from `config`
    pub fn from_config(config: &RuntimeConfig) -> CoreResult<Self> {
        Self::build(None, config)
    }

    fn build(name: Option<String>, config: &RuntimeConfig) -> CoreResult<Self> {
        let id = NEXT_ID.increment();
        let name = name.unwrap_or_else(|| format!("{}{}", config.thread_name_prefix, id));
        let settings = Settings {
            name,
            priority: Priority::Normal,
            os_priority: 0,
            policy: POLICY_DEFAULT,
            sched_explicit: false,
            stack_size: config.thread_stack_size,
            signal_scope: config.signal_scope,
            state: ThreadState::Created,
            tid: None,
            outcome: None,
        };
        Ok(Self {
            data: Arc::new(ThreadData::new(id, settings)?),
            native: None,
        })
    }

    /// Unique id, assigned at construction
    #[inline]
    pub fn id(&self) -> i32 {
        self.data.id()
    }

    /// Native identity of the running (or last) native thread
    pub fn tid(&self) -> CoreResult<Option<Tid>> {
        self.data.settings.with(|s| s.tid)
    }

    pub fn name(&self) -> CoreResult<String> {
        self.data.name()
    }

    /// Rename; takes effect in log tags and the native name at next start
    pub fn set_name(&self, name: impl Into<String>) -> CoreResult<()> {
        let name = name.into();
        self.data.settings.with(|s| s.name = name)
    }

    pub fn state(&self) -> CoreResult<ThreadState> {
        self.data.state()
    }

    /// Request a portable priority
    ///
    /// Mapped onto the native range of the current policy; applied now if
    /// running, otherwise at start.
    pub fn set_priority(&self, priority: Priority) -> CoreResult<()> {
        let policy = self.data.settings.with(|s| s.policy)?;
        let os_priority = priority::to_os_priority(
            priority,
            priority::min_os_priority(policy)?,
            priority::max_os_priority(policy)?,
        );
        self.update_sched(priority, os_priority, policy)
    }

    /// Last requested portable priority
    pub fn priority(&self) -> CoreResult<Priority> {
        self.data.settings.with(|s| s.priority)
    }

    /// Request a native priority under `policy`, clamped to its range
    pub fn set_os_priority(&self, os_priority: i32, policy: i32) -> CoreResult<()> {
        let min = priority::min_os_priority(policy)?;
        let max = priority::max_os_priority(policy)?;
        let os_priority = os_priority.clamp(min, max);
        let level = priority::from_os_priority(os_priority, min, max);
        self.update_sched(level, os_priority, policy)
    }

    /// Native priority in effect (or to be applied at start)
    pub fn os_priority(&self) -> CoreResult<i32> {
        self.data.settings.with(|s| s.os_priority)
    }

    pub fn policy(&self) -> CoreResult<i32> {
        self.data.settings.with(|s| s.policy)
    }

    pub fn min_os_priority(policy: i32) -> CoreResult<i32> {
        priority::min_os_priority(policy)
    }

    pub fn max_os_priority(policy: i32) -> CoreResult<i32> {
        priority::max_os_priority(policy)
    }

    /// Request a stack size for the next start; 0 for the platform default
    ///
    /// Ignored while running.
    pub fn set_stack_size(&self, size: usize) -> CoreResult<()> {
        self.data.settings.with(|s| {
            if s.state == ThreadState::Running {
                kdebug!("stack size change ignored, thread '{}' is running", s.name);
            } else {
                s.stack_size = size;
            }
        })
    }

    pub fn stack_size(&self) -> CoreResult<usize> {
        self.data.settings.with(|s| s.stack_size)
    }

    /// Run targets inside the signal translation scope
    pub fn set_signal_scope(&self, enable: bool) -> CoreResult<()> {
        self.data.settings.with(|s| s.signal_scope = enable)
    }

    /// Run `runnable` on a new native thread
    pub fn start(&mut self, runnable: Arc<dyn Runnable>) -> CoreResult<()> {
        self.spawn(Target::Runnable(runnable))
    }

    /// Run a closure on a new native thread
    pub fn start_fn<F>(&mut self, f: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(Target::Callable(Box::new(f)))
    }

    /// Run `f(data)` on a new native thread
    pub fn start_callable<D>(&mut self, f: fn(D), data: D) -> CoreResult<()>
    where
        D: Send + 'static,
    {
        self.spawn(Target::Callable(Box::new(move || f(data))))
    }

    /// Wait for the run to complete
    ///
    /// Returns the failure recorded for the run, if any.
    pub fn join(&mut self) -> CoreResult<()> {
        self.ensure_started()?;
        self.data.done.wait()?;
        self.complete_join()
    }

    /// Like [`join`](Self::join), failing with `Timeout` after `milliseconds`
    pub fn join_timeout(&mut self, milliseconds: u64) -> CoreResult<()> {
        if self.try_join(milliseconds)? {
            Ok(())
        } else {
            Err(CoreError::Timeout)
        }
    }

    /// Like [`join`](Self::join), `Ok(false)` after `milliseconds`
    pub fn try_join(&mut self, milliseconds: u64) -> CoreResult<bool> {
        self.ensure_started()?;
        if !self.data.done.try_wait(milliseconds)? {
            return Ok(false);
        }
        self.complete_join().map(|_| true)
    }

    pub fn is_running(&self) -> CoreResult<bool> {
        Ok(self.data.state()? == ThreadState::Running)
    }

    /// Shared handle on this thread
    pub fn handle(&self) -> ThreadHandle {
        ThreadHandle(Arc::clone(&self.data))
    }

    /// The managed thread calling this, `None` on unmanaged threads
    pub fn current() -> Option<ThreadHandle> {
        tls::current().map(ThreadHandle)
    }

    /// Native identity of the calling thread
    pub fn current_tid() -> Tid {
        unsafe { libc::pthread_self() as Tid }
    }

    pub fn sleep(milliseconds: u64) {
        std::thread::sleep(std::time::Duration::from_millis(milliseconds));
    }

    /// Give up the rest of the time slice
    pub fn yield_now() -> CoreResult<()> {
        nix::sched::sched_yield().map_err(|e| CoreError::system("cannot yield thread", e as i32))
    }

    fn update_sched(&self, level: Priority, os_priority: i32, policy: i32) -> CoreResult<()> {
        let running_tid = self.data.settings.with(|s| {
            s.priority = level;
            s.os_priority = os_priority;
            s.policy = policy;
            s.sched_explicit = true;
            match s.state {
                ThreadState::Running => s.tid,
                _ => None,
            }
        })?;
        match running_tid {
            Some(tid) => priority::apply(tid as libc::pthread_t, policy, os_priority),
            None => Ok(()),
        }
    }

    fn spawn(&mut self, target: Target) -> CoreResult<()> {
        let (name, stack_size) = self.data.settings.with(|s| {
            if !s.state.can_start() {
                return Err(CoreError::InvalidState("thread already running"));
            }
            Ok((s.name.clone(), s.stack_size))
        })??;

        // reap the previous run before reusing the record
        if let Some(previous) = self.native.take() {
            if previous.join().is_err() {
                kwarn!("previous run of thread {} unwound past its entry", self.id());
            }
        }
        self.data.done.reset()?;
        self.data.settings.with(|s| {
            s.state = ThreadState::Running;
            s.outcome = None;
        })?;

        let mut builder = std::thread::Builder::new().name(name.replace('\0', " "));
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }

        let data = Arc::clone(&self.data);
        match builder.spawn(move || trampoline(data, target)) {
            Ok(handle) => {
                let tid = native_tid(&handle);
                self.data.settings.with(|s| s.tid = Some(tid))?;
                self.native = Some(handle);
                kdebug!("thread '{}' (id {}) started", name, self.id());
                Ok(())
            }
            Err(e) => {
                self.data.settings.with(|s| s.state = ThreadState::Created)?;
                Err(CoreError::system(
                    "cannot start thread",
                    e.raw_os_error().unwrap_or(libc::EAGAIN),
                ))
            }
        }
    }

    fn ensure_started(&self) -> CoreResult<()> {
        match self.data.state()? {
            ThreadState::Created => Err(CoreError::InvalidState("thread not started")),
            _ => Ok(()),
        }
    }

    fn complete_join(&mut self) -> CoreResult<()> {
        if let Some(native) = self.native.take() {
            if native.join().is_err() {
                return Err(CoreError::Panicked("native thread unwound".to_string()));
            }
        }
        self.data.settings.with(|s| {
            s.state = ThreadState::Joined;
            match &s.outcome {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        })?
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.native.is_some() {
            // dropping the JoinHandle detaches; ThreadData lives on in the trampoline
            kdebug!("thread {} detached", self.id());
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread").field("id", &self.id()).finish_non_exhaustive()
    }
}

/// Shared view of a managed thread, as returned by [`Thread::current`]
#[derive(Clone)]
pub struct ThreadHandle(Arc<ThreadData>);

impl ThreadHandle {
    #[inline]
    pub fn id(&self) -> i32 {
        self.0.id()
    }

    pub fn name(&self) -> CoreResult<String> {
        self.0.name()
    }

    pub fn priority(&self) -> CoreResult<Priority> {
        self.0.settings.with(|s| s.priority)
    }

    pub fn tid(&self) -> CoreResult<Option<Tid>> {
        self.0.settings.with(|s| s.tid)
    }

    pub fn is_running(&self) -> CoreResult<bool> {
        Ok(self.0.state()? == ThreadState::Running)
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ThreadHandle").field(&self.id()).finish()
    }
}

#[cfg(unix)]
fn native_tid(handle: &JoinHandle<()>) -> Tid {
    use std::os::unix::thread::JoinHandleExt;
    handle.as_pthread_t() as Tid
}

/// Entry point of every managed native thread
fn trampoline(data: Arc<ThreadData>, target: Target) {
    tls::set_current(Arc::clone(&data));

    let (name, signal_scope, sched) = match data.settings.with(|s| {
        // the spawning side records it too, possibly after the target started
        s.tid = Some(Thread::current_tid());
        (
            s.name.clone(),
            s.signal_scope,
            s.sched_explicit.then_some((s.policy, s.os_priority)),
        )
    }) {
        Ok(v) => v,
        Err(e) => {
            kerror!("thread {} cannot read its settings: {}", data.id(), e);
            (String::new(), false, None)
        }
    };
    kprint::set_thread_tag(&name);

    let outcome = match sched {
        Some((policy, os_priority)) => {
            priority::apply(unsafe { libc::pthread_self() }, policy, os_priority)
        }
        None => Ok(()),
    }
    .and_then(|_| run_target(target, signal_scope));

    if let Err(e) = &outcome {
        ecore_core::handle_error(&name, e);
    }

    // thread-local destructors are user code too
    let cleared = catch_unwind(ThreadLocalStorage::clear).map_err(panic_error);
    if let Err(e) = &cleared {
        ecore_core::handle_error(&name, e);
    }

    if let Err(e) = data.finish(outcome.and(cleared)) {
        kerror!("cannot record completion: {}", e);
    }
    if let Err(e) = data.done.set() {
        kerror!("cannot signal completion: {}", e);
    }
    tls::clear_current();
    kprint::clear_thread_tag();
}

fn panic_error(payload: Box<dyn std::any::Any + Send>) -> CoreError {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    CoreError::Panicked(msg)
}

fn run_target(target: Target, signal_scope: bool) -> CoreResult<()> {
    let guarded =
        move || catch_unwind(AssertUnwindSafe(move || target.run())).map_err(panic_error);

    if signal_scope {
        signal::throw_on_signal(guarded)?
    } else {
        guarded()
    }
}
