//! Signal-to-error translation
//!
//! Turns SIGILL, SIGBUS, SIGSEGV and SIGSYS delivered inside a
//! [`throw_on_signal`] scope into a `CoreError::Signal` for the caller.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("ecore-runtime requires a POSIX platform");
    }
}
