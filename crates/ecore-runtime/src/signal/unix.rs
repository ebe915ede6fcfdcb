//! Unix signal translation
//!
//! Without non-local jumps a handler cannot abandon the faulting code, so
//! translation is limited to what can be resumed safely:
//!
//! - a signal *sent* to the thread (`raise`, `kill`, `pthread_kill`) while
//!   it is inside a scope is recorded, and the scope returns
//!   `Signal { signal }` once its body completes;
//! - a hardware fault, or any handled signal outside a scope, restores the
//!   disposition that was installed before ours. The fault then repeats
//!   (or the signal is re-raised) and the process behaves as if we had
//!   never been installed.

use std::borrow::Cow;
use std::cell::Cell;
use std::sync::OnceLock;

use ecore_core::{CoreError, CoreResult};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Signals routed through the translation handler
pub const HANDLED_SIGNALS: [Signal; 4] = [
    Signal::SIGILL,
    Signal::SIGBUS,
    Signal::SIGSEGV,
    Signal::SIGSYS,
];

static PREVIOUS: OnceLock<Vec<(Signal, SigAction)>> = OnceLock::new();

thread_local! {
    /// Nesting depth of translation scopes on this thread
    static SCOPE_DEPTH: Cell<u32> = const { Cell::new(0) };

    /// Signal recorded by the handler for the innermost scope, 0 if none
    static PENDING: Cell<i32> = const { Cell::new(0) };
}

/// Installs the translation handler and runs code under it
pub struct SignalHandler;

impl SignalHandler {
    /// Install handlers for [`HANDLED_SIGNALS`], once per process
    pub fn install() -> CoreResult<()> {
        if PREVIOUS.get().is_some() {
            return Ok(());
        }

        let mut result = Ok(());
        PREVIOUS.get_or_init(|| {
            let action = SigAction::new(
                SigHandler::SigAction(handle_signal),
                SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
                SigSet::empty(),
            );
            let mut previous = Vec::with_capacity(HANDLED_SIGNALS.len());
            for sig in HANDLED_SIGNALS {
                // SAFETY: handle_signal only touches const thread-locals and
                // async-signal-safe calls
                match unsafe { sigaction(sig, &action) } {
                    Ok(prev) => previous.push((sig, prev)),
                    Err(errno) => {
                        result = Err(CoreError::system("cannot install signal handler", errno as i32));
                    }
                }
            }
            ecore_core::kdebug!("signal translation installed for {} signals", previous.len());
            previous
        });
        result
    }

    #[inline]
    pub fn is_installed() -> bool {
        PREVIOUS.get().is_some()
    }

    /// See [`throw_on_signal`]
    pub fn throw_on_signal<R>(body: impl FnOnce() -> R) -> CoreResult<R> {
        throw_on_signal(body)
    }

    /// True if the calling thread is inside a translation scope
    pub fn in_scope() -> bool {
        SCOPE_DEPTH.with(|d| d.get() > 0)
    }
}

/// Run `body` in a signal translation scope
///
/// Returns `Err(Signal { signal })` if a handled signal was sent to this
/// thread while `body` ran, `Ok` with the body's value otherwise. Scopes
/// nest; a signal is reported by the innermost one only.
pub fn throw_on_signal<R>(body: impl FnOnce() -> R) -> CoreResult<R> {
    SignalHandler::install()?;

    let scope = Scope::enter();
    let value = body();
    match scope.exit() {
        0 => Ok(value),
        signal => Err(CoreError::Signal { signal }),
    }
}

/// Descriptive message for a signal number
pub fn signal_name(sig: i32) -> Cow<'static, str> {
    match sig {
        libc::SIGILL => Cow::Borrowed("Illegal instruction"),
        libc::SIGBUS => Cow::Borrowed("Bus error"),
        libc::SIGSEGV => Cow::Borrowed("Segmentation violation"),
        libc::SIGSYS => Cow::Borrowed("Invalid system call"),
        n => Cow::Owned(format!("Signal {}", n)),
    }
}

/// Marks the calling thread as inside a scope; restores on drop
struct Scope {
    saved_pending: i32,
    exited: bool,
}

impl Scope {
    fn enter() -> Self {
        let saved_pending = PENDING.with(|p| p.replace(0));
        SCOPE_DEPTH.with(|d| d.set(d.get() + 1));
        Scope {
            saved_pending,
            exited: false,
        }
    }

    /// Leave the scope, returning the signal recorded inside it
    fn exit(mut self) -> i32 {
        self.exited = true;
        self.leave()
    }

    fn leave(&self) -> i32 {
        SCOPE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
        PENDING.with(|p| p.replace(self.saved_pending))
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        // unwinding out of the body
        if !self.exited {
            self.leave();
        }
    }
}

extern "C" fn handle_signal(sig: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    // si_code <= 0: generated by kill/raise/sigqueue, not by a fault
    let sent = info.is_null() || unsafe { (*info).si_code } <= 0;
    let in_scope = SCOPE_DEPTH.with(|d| d.get() > 0);

    if sent && in_scope {
        PENDING.with(|p| p.set(sig));
        return;
    }

    write_stderr(b"ecore: unhandled ");
    write_stderr(static_name(sig).as_bytes());
    write_stderr(b", restoring previous disposition\n");

    restore_previous(sig);
    if sent {
        unsafe {
            libc::raise(sig);
        }
    }
    // a fault returns to the faulting instruction, which now traps under
    // the previous disposition
}

fn restore_previous(sig: libc::c_int) {
    let previous = PREVIOUS
        .get()
        .and_then(|v| v.iter().find(|(s, _)| *s as libc::c_int == sig).map(|(_, a)| *a));
    let Ok(signal) = Signal::try_from(sig) else {
        return;
    };
    let action = previous
        .unwrap_or_else(|| SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty()));
    unsafe {
        let _ = sigaction(signal, &action);
    }
}

/// Allocation-free name for use inside the handler
fn static_name(sig: libc::c_int) -> &'static str {
    match sig {
        libc::SIGILL => "Illegal instruction",
        libc::SIGBUS => "Bus error",
        libc::SIGSEGV => "Segmentation violation",
        libc::SIGSYS => "Invalid system call",
        _ => "signal",
    }
}

fn write_stderr(msg: &[u8]) {
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGSEGV), "Segmentation violation");
        assert_eq!(signal_name(libc::SIGILL), "Illegal instruction");
        assert_eq!(signal_name(libc::SIGBUS), "Bus error");
        assert_eq!(signal_name(libc::SIGSYS), "Invalid system call");
        assert_eq!(signal_name(1234), "Signal 1234");
    }

    #[test]
    fn test_scope_passes_value_through() {
        assert_eq!(throw_on_signal(|| 41 + 1).unwrap(), 42);
        assert!(SignalHandler::is_installed());
        assert!(!SignalHandler::in_scope());
    }

    #[test]
    fn test_raised_signal_becomes_error() {
        let err = throw_on_signal(|| {
            assert!(SignalHandler::in_scope());
            unsafe {
                libc::raise(libc::SIGSEGV);
            }
            "unreachable result"
        })
        .unwrap_err();

        assert_eq!(err, CoreError::Signal { signal: libc::SIGSEGV });
        assert!(!SignalHandler::in_scope());
    }

    #[test]
    fn test_nested_scopes_report_innermost() {
        let outer = throw_on_signal(|| {
            let inner = throw_on_signal(|| unsafe {
                libc::raise(libc::SIGILL);
            });
            assert_eq!(inner.unwrap_err(), CoreError::Signal { signal: libc::SIGILL });
            7
        });
        assert_eq!(outer.unwrap(), 7);
    }

    #[test]
    fn test_scope_restored_after_panic() {
        let r = std::panic::catch_unwind(|| {
            let _ = throw_on_signal(|| panic!("inside scope"));
        });
        assert!(r.is_err());
        assert!(!SignalHandler::in_scope());
    }
}
