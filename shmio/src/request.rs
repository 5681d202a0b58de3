//! On-demand frames: consumers ask, the producer serves
//!
//! Two header words carry the handshake. `request_seq` is bumped by every
//! [`SharedMemory::consumer_request_start`]; `ready_seq` is raised by
//! [`SharedMemory::producer_request_done`] to the latest request the
//! producer picked up. A consumer's request is served once `ready_seq` has
//! reached its ticket. One `producer_request_done` serves every request that
//! was pending when the producer woke, so concurrent consumers share a frame.
//!
//! ```text
//! consumer                              producer
//! ────────                              ────────
//! consumer_request_start()  ──wake──▶   producer_wait_for_request()
//!                                       write buffer, push_data_to_storage()
//! consumer_wait_for_ready() ◀──wake──   producer_request_done()
//! read buffer
//! ```
//!
//! Both waits sleep on the word they watch (futex on Linux) and honour a
//! timeout the same way a pull does.

use crate::error::{ShmError, ShmResult};
use crate::platform::{wait_for_change, wake_all};
use crate::shared_memory::SharedMemory;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// True once `current` has reached `target` on a wrapping 32-bit sequence.
pub(crate) fn seq_reached(current: u32, target: u32) -> bool {
    current.wrapping_sub(target) as i32 >= 0
}

impl SharedMemory {
    /// Ask the producer for a new frame. Returns the request ticket, which
    /// [`SharedMemory::consumer_wait_for_ready`] waits on.
    pub fn consumer_request_start(&mut self) -> u32 {
        let header = self.segment.header();
        let ticket = header.request_seq.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        wake_all(&header.request_seq);

        self.pending_request = Some(ticket);
        trace!("request '{}' -> ticket {}", self.name(), ticket);
        ticket
    }

    /// Wait until the producer has served this handle's last request.
    ///
    /// Without an outstanding request, waits for every request issued so
    /// far. Buffer writes the producer made before
    /// [`SharedMemory::producer_request_done`] are visible on return.
    pub fn consumer_wait_for_ready(&mut self, timeout: Option<Duration>) -> ShmResult<u32> {
        let header = self.segment.header();
        let ticket = self
            .pending_request
            .unwrap_or_else(|| header.request_seq.load(Ordering::Acquire));

        self.wait_on(&header.ready_seq, timeout.or(self.default_timeout), |ready| {
            seq_reached(ready, ticket)
        })?;

        self.pending_request = None;
        let ready = self.segment.header().ready_seq.load(Ordering::Acquire);
        trace!("ready '{}' -> {} (ticket {})", self.name(), ready, ticket);
        Ok(ready)
    }

    /// Wait until some consumer has a request the producer has not served.
    /// Returns the latest request number, remembered for
    /// [`SharedMemory::producer_request_done`].
    pub fn producer_wait_for_request(&mut self, timeout: Option<Duration>) -> ShmResult<u32> {
        let header = self.segment.header();
        let ready_seq = &header.ready_seq;

        self.wait_on(&header.request_seq, timeout.or(self.default_timeout), |request| {
            request != ready_seq.load(Ordering::Acquire)
        })?;

        let request = self.segment.header().request_seq.load(Ordering::Acquire);
        self.serving_request = Some(request);
        trace!("serving '{}' request {}", self.name(), request);
        Ok(request)
    }

    /// Mark the request picked up by the last
    /// [`SharedMemory::producer_wait_for_request`] (or, without one, every
    /// request issued so far) as served and wake the waiting consumers.
    ///
    /// Write and push the frame first. Returns the new ready number.
    pub fn producer_request_done(&mut self) -> u32 {
        let header = self.segment.header();
        let target = self
            .serving_request
            .take()
            .unwrap_or_else(|| header.request_seq.load(Ordering::Acquire));

        let previous = header
            .ready_seq
            .fetch_update(Ordering::Release, Ordering::Acquire, |ready| {
                (!seq_reached(ready, target)).then_some(target)
            });
        wake_all(&header.ready_seq);

        let ready = match previous {
            Ok(_) => target,
            Err(current) => current,
        };
        trace!("done '{}' -> ready {}", self.name(), ready);
        ready
    }

    /// Whether a consumer request is waiting to be served. Does not consume it.
    pub fn has_pending_request(&self) -> bool {
        let header = self.segment.header();
        header.request_seq.load(Ordering::Acquire) != header.ready_seq.load(Ordering::Acquire)
    }

    /// Sleep on `word` until `done` accepts its value or `timeout` passes.
    fn wait_on(
        &self,
        word: &AtomicU32,
        timeout: Option<Duration>,
        mut done: impl FnMut(u32) -> bool,
    ) -> ShmResult<()> {
        let start = Instant::now();
        loop {
            let observed = word.load(Ordering::Acquire);
            if done(observed) {
                return Ok(());
            }

            let remaining = match timeout {
                Some(limit) => {
                    let waited = start.elapsed();
                    if waited >= limit {
                        return Err(ShmError::Timeout {
                            name: self.name().to_string(),
                            waited,
                        });
                    }
                    Some(limit - waited)
                }
                None => None,
            };
            wait_for_change(word, observed, remaining);
        }
    }
}
