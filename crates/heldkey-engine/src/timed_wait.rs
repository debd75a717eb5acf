//! Cancellable timed waits with coarse-to-fine sleep slices.
//!
//! Every action loop in the engine sleeps through this primitive. The wait
//! computes an absolute deadline from a monotonic clock and sleeps in slices
//! sized by the remaining time, so that a cancellation (trigger released,
//! panic, shutdown) is observed within a few milliseconds without spinning
//! the CPU for the whole duration.

use std::{
    thread,
    time::{Duration, Instant},
};

/// Remaining time at or above which the long slice is used.
const LONG_REMAINING_MS: u64 = 16;
/// Remaining time at or above which the mid slice is used.
const MID_REMAINING_MS: u64 = 2;

/// Sleep-slice durations for a tiered wait.
#[derive(Clone, Copy, Debug)]
pub struct WaitProfile {
    /// Slice while plenty of time remains.
    pub long: Duration,
    /// Slice while remaining time is in the middle band.
    pub mid: Duration,
    /// Slice for the final couple of milliseconds; zero means yield.
    pub short: Duration,
}

impl Default for WaitProfile {
    fn default() -> Self {
        Self {
            long: Duration::from_millis(14),
            mid: Duration::from_millis(1),
            short: Duration::ZERO,
        }
    }
}

/// Wait up to `ms` milliseconds, checking `is_cancelled` before every slice.
///
/// Returns `true` if the full duration elapsed with the predicate false at
/// every check, `false` as soon as the predicate turns true, including at
/// entry before any sleeping. Never blocks meaningfully past the deadline:
/// each slice is clamped to the time remaining.
pub fn wait_cancellable(ms: u64, is_cancelled: impl Fn() -> bool) -> bool {
    wait_with_profile(ms, WaitProfile::default(), is_cancelled)
}

/// [`wait_cancellable`] with explicit slice durations.
pub fn wait_with_profile(ms: u64, profile: WaitProfile, is_cancelled: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(ms);
    loop {
        if is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        let slice = if remaining >= Duration::from_millis(LONG_REMAINING_MS) {
            profile.long
        } else if remaining >= Duration::from_millis(MID_REMAINING_MS) {
            profile.mid
        } else {
            profile.short
        };
        if slice.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(slice.min(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    #[test]
    fn elapses_fully_when_never_cancelled() {
        let start = Instant::now();
        assert!(wait_cancellable(40, || false));
        assert!(start.elapsed() >= Duration::from_millis(40));
        // Bounded above: deadline plus at most one long slice and scheduling slack.
        assert!(start.elapsed() < Duration::from_millis(120));
    }

    #[test]
    fn returns_false_before_sleeping_when_cancelled_at_entry() {
        let start = Instant::now();
        assert!(!wait_cancellable(500, || true));
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn zero_duration_elapses_immediately() {
        assert!(wait_cancellable(0, || false));
    }

    #[test]
    fn observes_cancellation_within_one_slice() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = flag.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            setter.store(true, Ordering::SeqCst);
        });
        let start = Instant::now();
        assert!(!wait_cancellable(1000, || flag.load(Ordering::SeqCst)));
        // 30ms until cancel, plus at most one long slice, plus slack.
        assert!(start.elapsed() < Duration::from_millis(120));
        handle.join().unwrap();
    }
}
