//! Platform-specific shared memory and wait primitives
//!
//! Segment objects are POSIX shared memory (`shm_open`), available on every
//! Unix. The cross-process wait used by blocking pulls is a futex on Linux;
//! elsewhere it degrades to bounded polling of the same header word.

#[cfg(target_os = "linux")]
pub mod linux;
pub mod posix;

pub use posix::{
    MemoryConfig, attach_segment_mmap, create_segment_mmap, get_current_pid, is_process_alive,
    object_name, unlink_segment, validate_name,
};

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Result of waiting on a shared word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The word changed, a waker fired, or the wait was interrupted; re-check state
    Notified,
    /// The timeout elapsed with the word unchanged
    TimedOut,
}

/// Block while `*word == expected`, at most `timeout` (forever if `None`).
#[cfg(target_os = "linux")]
pub fn wait_for_change(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
    linux::futex_wait(word, expected, timeout)
}

/// Wake every process blocked in [`wait_for_change`] on `word`.
#[cfg(target_os = "linux")]
pub fn wake_all(word: &AtomicU32) {
    linux::futex_wake_all(word);
}

/// Block while `*word == expected`, at most `timeout` (forever if `None`).
#[cfg(not(target_os = "linux"))]
pub fn wait_for_change(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
    poll_for_change(word, expected, timeout, common::prelude::DEFAULT_POLL_INTERVAL)
}

/// No-op: pollers notice the changed word by themselves.
#[cfg(not(target_os = "linux"))]
pub fn wake_all(_word: &AtomicU32) {}

/// Degraded wait: re-check `word` every `interval` until it changes or `timeout` elapses.
pub fn poll_for_change(
    word: &AtomicU32,
    expected: u32,
    timeout: Option<Duration>,
    interval: Duration,
) -> WaitOutcome {
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    let start = Instant::now();
    loop {
        if word.load(Ordering::Acquire) != expected {
            return WaitOutcome::Notified;
        }
        let nap = match timeout {
            Some(limit) => {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    return WaitOutcome::TimedOut;
                }
                interval.min(limit - elapsed)
            }
            None => interval,
        };
        std::thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_when_word_is_unchanged() {
        let word = AtomicU32::new(3);
        let start = Instant::now();
        let outcome = wait_for_change(&word, 3, Some(Duration::from_millis(20)));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_returns_immediately_on_stale_expectation() {
        let word = AtomicU32::new(4);
        let outcome = wait_for_change(&word, 3, Some(Duration::from_secs(5)));
        assert_eq!(outcome, WaitOutcome::Notified);
    }

    #[test]
    fn test_wake_releases_waiter() {
        let word = AtomicU32::new(0);
        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let deadline = Instant::now() + Duration::from_secs(5);
                while word.load(Ordering::Acquire) == 0 {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if wait_for_change(&word, 0, Some(left)) == WaitOutcome::TimedOut {
                        return false;
                    }
                }
                true
            });
            std::thread::sleep(Duration::from_millis(10));
            word.fetch_add(1, Ordering::Release);
            wake_all(&word);
            assert!(waiter.join().unwrap());
        });
    }

    #[test]
    fn test_poll_for_change_times_out() {
        let word = AtomicU32::new(9);
        let outcome = poll_for_change(
            &word,
            9,
            Some(Duration::from_millis(5)),
            Duration::from_millis(1),
        );
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }
}
