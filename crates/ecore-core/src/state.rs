//! Managed thread state and portable priority types

use core::fmt;

/// Lifecycle of a managed thread
///
/// `Created -> Running -> Finished -> Joined`. A thread in `Finished` or
/// `Joined` may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Constructed, never started
    Created = 0,

    /// Native thread executing the target
    Running = 1,

    /// Target returned (or failed), completion signaled
    Finished = 2,

    /// A joiner observed completion
    Joined = 3,
}

impl ThreadState {
    /// True if `start` is legal from this state
    #[inline]
    pub const fn can_start(&self) -> bool {
        !matches!(self, ThreadState::Running)
    }

    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, ThreadState::Finished | ThreadState::Joined)
    }
}

impl From<u8> for ThreadState {
    fn from(v: u8) -> Self {
        match v {
            0 => ThreadState::Created,
            1 => ThreadState::Running,
            2 => ThreadState::Finished,
            3 => ThreadState::Joined,
            _ => ThreadState::Created, // Default for invalid values
        }
    }
}

impl From<ThreadState> for u8 {
    fn from(state: ThreadState) -> u8 {
        state as u8
    }
}

/// Portable thread priority
///
/// Mapped linearly onto the native priority range of the scheduling
/// policy in use; see `ecore_runtime::thread::priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Priority {
    Lowest = 0,
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Highest = 4,
}

impl Priority {
    /// Number of priority levels
    pub const COUNT: usize = 5;

    /// Position on the linear scale (0 = Lowest, 4 = Highest)
    #[inline]
    pub const fn as_index(&self) -> usize {
        *self as usize
    }

    #[inline]
    pub const fn from_index(idx: usize) -> Option<Priority> {
        match idx {
            0 => Some(Priority::Lowest),
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            3 => Some(Priority::High),
            4 => Some(Priority::Highest),
            _ => None,
        }
    }

    /// Iterator over all priorities (lowest to highest)
    pub fn iter() -> impl Iterator<Item = Priority> {
        [
            Priority::Lowest,
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Highest,
        ]
        .into_iter()
    }
}

impl From<u8> for Priority {
    fn from(v: u8) -> Self {
        Priority::from_index(v as usize).unwrap_or(Priority::Normal)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Lowest => write!(f, "LOWEST"),
            Priority::Low => write!(f, "LOW"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Highest => write!(f, "HIGHEST"),
        }
    }
}
