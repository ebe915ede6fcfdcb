//! Error types shared by every ecore primitive

use core::fmt;

/// Result type for ecore operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by locks, events, queues and threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A timed wait, lock or join exceeded its deadline
    Timeout,

    /// Programmer error: double start, unlock of an unheld lock, relock
    /// of a non-recursive mutex by its holder
    InvalidState(&'static str),

    /// A native primitive call failed at the OS level
    System(SystemError),

    /// A signal was delivered inside a signal translation scope
    Signal {
        /// Originating signal number
        signal: i32,
    },

    /// A thread target panicked
    Panicked(String),
}

/// Coarse classification of [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    InvalidState,
    SystemResource,
    Signal,
    Panicked,
}

impl CoreError {
    /// Build a system error from a native return code
    #[inline]
    pub fn system(op: &'static str, errno: i32) -> Self {
        CoreError::System(SystemError { op, errno })
    }

    /// Build a system error from the calling thread's `errno`
    pub fn last_os_error(op: &'static str) -> Self {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        CoreError::system(op, errno)
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::System(_) => ErrorKind::SystemResource,
            CoreError::Signal { .. } => ErrorKind::Signal,
            CoreError::Panicked(_) => ErrorKind::Panicked,
        }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Timeout => write!(f, "operation timed out"),
            CoreError::InvalidState(what) => write!(f, "invalid state: {}", what),
            CoreError::System(e) => write!(f, "system error: {}", e),
            CoreError::Signal { signal } => write!(f, "signal {} caught", signal),
            CoreError::Panicked(msg) => write!(f, "thread panicked: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::System(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure of a native call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemError {
    /// Operation that failed, e.g. "cannot lock mutex"
    pub op: &'static str,

    /// Raw errno (or pthread return code)
    pub errno: i32,
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.op,
            std::io::Error::from_raw_os_error(self.errno)
        )
    }
}

impl std::error::Error for SystemError {}

impl From<SystemError> for CoreError {
    fn from(e: SystemError) -> Self {
        CoreError::System(e)
    }
}
