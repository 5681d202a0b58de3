//! Push/pull protocol between the producer and its consumers
//!
//! The producer writes the data buffer (and any keywords belonging to the
//! frame), then calls [`SharedMemory::push_data_to_storage`]:
//!
//! 1. release fence, so every buffer store happens-before step 3
//! 2. `last_access_time_ns = max(last_access_time_ns, now)`
//! 3. `version += 1` (release)
//! 4. `notify_seq += 1`, then wake every waiter on it
//!
//! A consumer's [`SharedMemory::pull_data_from_storage`] loads `notify_seq`,
//! then `version` (acquire). Observing a version above its private
//! `last_seen_version` makes the whole preceding buffer write visible. If
//! there is nothing new it sleeps on `notify_seq` with the value it loaded,
//! so a push landing between the check and the sleep is never missed.
//!
//! Pulls never write to the mapping.

use crate::error::{ShmError, ShmResult};
use crate::platform::{wait_for_change, wake_all};
use crate::shared_memory::SharedMemory;
use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::time::{Duration, Instant};
use tracing::trace;

/// What a pull does when no new version is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMode {
    /// Sleep on the segment's notify word (futex on Linux) until a push or the timeout.
    #[default]
    Blocking,
    /// Sleep `interval`, re-check, repeat until a push or the timeout.
    Polling {
        /// Time between two checks
        interval: Duration,
    },
    /// Return [`PullOutcome::NoNewFrame`] immediately.
    NonBlocking,
}

/// Successful result of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// A version newer than the handle's last seen one is published and visible.
    Updated {
        /// The version now observed
        version: u64,
    },
    /// Nothing new (non-blocking mode only).
    NoNewFrame,
}

impl PullOutcome {
    /// True for [`PullOutcome::Updated`]
    pub fn is_updated(&self) -> bool {
        matches!(self, PullOutcome::Updated { .. })
    }

    /// The observed version, if any
    pub fn version(&self) -> Option<u64> {
        match self {
            PullOutcome::Updated { version } => Some(*version),
            PullOutcome::NoNewFrame => None,
        }
    }
}

impl SharedMemory {
    /// Publish the current buffer contents as a new version.
    ///
    /// Never waits for consumers. Returns the new version, which also becomes
    /// this handle's last seen version.
    pub fn push_data_to_storage(&mut self) -> u64 {
        let header = self.segment.header();

        fence(Ordering::Release);
        let now = header.touch();
        let version = header.version.fetch_add(1, Ordering::Release) + 1;
        header.notify_seq.fetch_add(1, Ordering::Release);
        wake_all(&header.notify_seq);

        self.last_seen_version = version;
        self.observed_access_ns = self.observed_access_ns.max(now);
        trace!("push '{}' -> version {}", self.name(), version);
        version
    }

    /// Wait for a version newer than the last one this handle observed.
    ///
    /// `timeout` falls back to the configured default; `None` in both places
    /// waits indefinitely. Fails with `Timeout` when the deadline passes in
    /// blocking or polling mode.
    pub fn pull_data_from_storage(&mut self, timeout: Option<Duration>) -> ShmResult<PullOutcome> {
        self.pull(timeout.or(self.default_timeout), None)
    }

    /// Like [`SharedMemory::pull_data_from_storage`], but gives up with
    /// `Cancelled` once `cancel` is set. The flag is checked at least every
    /// configured cancel-check interval.
    pub fn pull_data_from_storage_cancellable(
        &mut self,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
    ) -> ShmResult<PullOutcome> {
        self.pull(timeout.or(self.default_timeout), Some(cancel))
    }

    /// Whether a newer version than the last seen one is published.
    /// Does not consume it.
    pub fn has_new_frame(&self) -> bool {
        self.version() > self.last_seen_version
    }

    /// Current pull mode
    pub fn pull_mode(&self) -> PullMode {
        self.pull_mode
    }

    /// Change how later pulls wait.
    pub fn set_pull_mode(&mut self, mode: PullMode) {
        self.pull_mode = mode;
    }

    fn pull(
        &mut self,
        timeout: Option<Duration>,
        cancel: Option<&AtomicBool>,
    ) -> ShmResult<PullOutcome> {
        let start = Instant::now();

        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                trace!("pull '{}' cancelled", self.name());
                return Err(ShmError::Cancelled);
            }

            let header = self.segment.header();
            let seq = header.notify_seq.load(Ordering::Acquire);
            let version = header.version.load(Ordering::Acquire);
            if version > self.last_seen_version {
                self.last_seen_version = version;
                self.observe_access();
                trace!("pull '{}' -> version {}", self.name(), version);
                return Ok(PullOutcome::Updated { version });
            }

            let poll_interval = match self.pull_mode {
                PullMode::NonBlocking => return Ok(PullOutcome::NoNewFrame),
                PullMode::Blocking => None,
                PullMode::Polling { interval } => Some(interval),
            };

            let remaining = match timeout {
                Some(limit) => {
                    let waited = start.elapsed();
                    if waited >= limit {
                        trace!("pull '{}' timed out after {:?}", self.name(), waited);
                        return Err(ShmError::Timeout {
                            name: self.name().to_string(),
                            waited,
                        });
                    }
                    Some(limit - waited)
                }
                None => None,
            };
            let slice = match cancel {
                Some(_) => Some(remaining.map_or(self.cancel_check_interval, |r| {
                    r.min(self.cancel_check_interval)
                })),
                None => remaining,
            };

            // Either way the loop re-checks the version; a timed-out slice
            // is caught by the deadline check above.
            match poll_interval {
                None => {
                    wait_for_change(&header.notify_seq, seq, slice);
                }
                Some(interval) => {
                    std::thread::sleep(slice.map_or(interval, |s| s.min(interval)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;

    struct Segment(String);

    impl Segment {
        fn new(tag: &str) -> (Self, SharedMemory) {
            let name = format!("sync_{tag}_{}", std::process::id());
            let shm = SharedMemory::create(&name, 16, DataType::Uint8, &[]).unwrap();
            (Self(name), shm)
        }
    }

    impl Drop for Segment {
        fn drop(&mut self) {
            let _ = SharedMemory::unlink(&self.0);
        }
    }

    #[test]
    fn test_push_advances_version() {
        let (seg, mut producer) = Segment::new("push");
        let mut consumer = SharedMemory::open(&seg.0).unwrap();

        assert!(!consumer.has_new_frame());
        assert_eq!(producer.push_data_to_storage(), 1);
        assert_eq!(producer.push_data_to_storage(), 2);
        assert_eq!(producer.last_seen_version(), 2);

        assert!(consumer.has_new_frame());
        assert!(consumer.has_new_frame());
        let outcome = consumer.pull_data_from_storage(None).unwrap();
        assert_eq!(outcome, PullOutcome::Updated { version: 2 });
        assert_eq!(outcome.version(), Some(2));
        assert!(!consumer.has_new_frame());
    }

    #[test]
    fn test_non_blocking_reports_no_frame() {
        let (seg, _producer) = Segment::new("nonblock");
        let mut consumer = SharedMemory::open(&seg.0).unwrap();
        consumer.set_pull_mode(PullMode::NonBlocking);

        let outcome = consumer.pull_data_from_storage(None).unwrap();
        assert_eq!(outcome, PullOutcome::NoNewFrame);
        assert!(!outcome.is_updated());
    }

    #[test]
    fn test_zero_timeout_fails_fast() {
        let (seg, _producer) = Segment::new("zero");
        let mut consumer = SharedMemory::open(&seg.0).unwrap();
        let err = consumer
            .pull_data_from_storage(Some(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, ShmError::Timeout { .. }));
        assert_eq!(consumer.version(), 0);
    }

    #[test]
    fn test_preset_cancel_flag() {
        let (seg, _producer) = Segment::new("cancel");
        let mut consumer = SharedMemory::open(&seg.0).unwrap();
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            consumer.pull_data_from_storage_cancellable(None, &cancel),
            Err(ShmError::Cancelled)
        ));
    }
}
