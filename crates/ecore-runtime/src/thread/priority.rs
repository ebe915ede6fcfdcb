//! Portable priority to native scheduling priority mapping
//!
//! The five levels are spread linearly over `[min, max]` of the scheduling
//! policy. The reverse map sends every native value back to the level
//! whose band contains it, so the canonical values round-trip whenever the
//! range is at least four wide. Policies with a one-value range (Linux
//! `SCHED_OTHER` is `[0, 0]`) collapse every level onto that value; the
//! requested level is therefore kept alongside the native value.

use ecore_core::{CoreError, CoreResult, Priority};

/// Policy used unless one is requested
pub const POLICY_DEFAULT: i32 = libc::SCHED_OTHER;

/// Native value for `priority` on a policy ranging over `[min, max]`
pub fn to_os_priority(priority: Priority, min: i32, max: i32) -> i32 {
    let span = max - min;
    match priority {
        Priority::Lowest => min,
        Priority::Low => min + span / 4,
        Priority::Normal => min + span / 2,
        Priority::High => min + 3 * span / 4,
        Priority::Highest => max,
    }
}

/// Portable level for a native value on a policy ranging over `[min, max]`
pub fn from_os_priority(os_priority: i32, min: i32, max: i32) -> Priority {
    let normal = min + (max - min) / 2;
    if os_priority <= min {
        Priority::Lowest
    } else if os_priority < normal {
        Priority::Low
    } else if os_priority == normal {
        Priority::Normal
    } else if os_priority < max {
        Priority::High
    } else {
        Priority::Highest
    }
}

/// Lowest native priority of `policy`
pub fn min_os_priority(policy: i32) -> CoreResult<i32> {
    match unsafe { libc::sched_get_priority_min(policy) } {
        -1 => Err(CoreError::last_os_error("cannot get minimum thread priority")),
        n => Ok(n),
    }
}

/// Highest native priority of `policy`
pub fn max_os_priority(policy: i32) -> CoreResult<i32> {
    match unsafe { libc::sched_get_priority_max(policy) } {
        -1 => Err(CoreError::last_os_error("cannot get maximum thread priority")),
        n => Ok(n),
    }
}

/// Apply `policy`/`os_priority` to a running native thread
pub(crate) fn apply(thread: libc::pthread_t, policy: i32, os_priority: i32) -> CoreResult<()> {
    // SAFETY: sched_param is plain old data
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = os_priority;
    match unsafe { libc::pthread_setschedparam(thread, policy, &param) } {
        0 => Ok(()),
        rc => Err(CoreError::system("cannot set thread priority", rc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_levels() {
        for (min, max) in [(1, 99), (0, 4), (-20, 19), (15, 47)] {
            for p in Priority::iter() {
                let os = to_os_priority(p, min, max);
                assert!(os >= min && os <= max);
                assert_eq!(from_os_priority(os, min, max), p, "range {}..={}", min, max);
            }
        }
    }

    #[test]
    fn test_linear_spread() {
        assert_eq!(to_os_priority(Priority::Lowest, 1, 99), 1);
        assert_eq!(to_os_priority(Priority::Low, 1, 99), 25);
        assert_eq!(to_os_priority(Priority::Normal, 1, 99), 50);
        assert_eq!(to_os_priority(Priority::High, 1, 99), 74);
        assert_eq!(to_os_priority(Priority::Highest, 1, 99), 99);
    }

    #[test]
    fn test_monotonic() {
        let os: Vec<_> = Priority::iter().map(|p| to_os_priority(p, 1, 99)).collect();
        assert!(os.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_degenerate_range() {
        for p in Priority::iter() {
            assert_eq!(to_os_priority(p, 0, 0), 0);
        }
        assert_eq!(from_os_priority(0, 0, 0), Priority::Lowest);
    }

    #[test]
    fn test_native_range() {
        let min = min_os_priority(POLICY_DEFAULT).unwrap();
        let max = max_os_priority(POLICY_DEFAULT).unwrap();
        assert!(min <= max);
        assert!(min_os_priority(-12345).is_err());
    }
}
