//! Even/odd version counter guarding values wider than one atomic word

use crate::error::{ShmError, ShmResult};
use std::sync::atomic::{AtomicU32, Ordering, fence};

/// Attempts before a reader or writer gives up on a busy entry.
pub const MAX_RETRIES: u32 = 100_000;

/// Spins between two `yield_now` calls while waiting on a busy entry.
const SPINS_PER_YIELD: u32 = 64;

/// Version counter using even/odd optimistic versioning.
///
/// Borrowed from a word inside the mapping, so every process attached to the
/// segment shares it. Writers move the word from even to odd (exclusive, via
/// compare-exchange so that two writing processes never interleave), write
/// the payload, then move it to the next even value. Readers snapshot the
/// word, copy the payload, and accept the copy only if the word is the same
/// even value afterwards.
///
/// The word carries no owner. A process that dies while holding a
/// [`WriteGuard`] leaves it odd for good, and every later read or write of
/// that entry ends in `VersionConflict`. Recovery is to recreate the segment
/// (see [`crate::lifecycle`]).
#[derive(Debug, Clone, Copy)]
pub struct VersionCounter<'a> {
    counter: &'a AtomicU32,
}

impl<'a> VersionCounter<'a> {
    /// Wrap a shared counter word
    pub fn new(counter: &'a AtomicU32) -> Self {
        Self { counter }
    }

    /// Get current version with acquire ordering
    pub fn load(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Begin write operation - take the entry by moving it to an odd version
    pub fn begin_write(&self) -> ShmResult<WriteGuard<'a>> {
        for attempt in 0..MAX_RETRIES {
            let current = self.counter.load(Ordering::Relaxed);
            if Self::is_stable(current)
                && self
                    .counter
                    .compare_exchange_weak(
                        current,
                        current.wrapping_add(1),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                // Payload stores must not move above the odd marker.
                fence(Ordering::Release);
                return Ok(WriteGuard {
                    counter: self.counter,
                });
            }
            backoff(attempt);
        }
        Err(ShmError::VersionConflict)
    }

    /// Read a value consistently with respect to concurrent writers
    pub fn read<T>(&self, mut copy: impl FnMut() -> T) -> ShmResult<T> {
        for attempt in 0..MAX_RETRIES {
            let before = self.counter.load(Ordering::Acquire);
            if Self::is_stable(before) {
                let value = copy();
                fence(Ordering::Acquire);
                let after = self.counter.load(Ordering::Relaxed);
                if before == after {
                    return Ok(value);
                }
            }
            backoff(attempt);
        }
        Err(ShmError::VersionConflict)
    }

    /// Check if version is stable (even)
    pub fn is_stable(version: u32) -> bool {
        version % 2 == 0
    }

    /// Check if version indicates write in progress (odd)
    pub fn is_writing(version: u32) -> bool {
        version % 2 == 1
    }
}

/// Exclusive write access to one entry; completes the write on drop.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    counter: &'a AtomicU32,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        // Back to even: publishes every payload store made under the guard.
        self.counter.fetch_add(1, Ordering::Release);
    }
}

fn backoff(attempt: u32) {
    if attempt % SPINS_PER_YIELD == SPINS_PER_YIELD - 1 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}
