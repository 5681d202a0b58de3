//! Linux futex wait/wake on a word inside a shared mapping
//!
//! The operations are issued without `FUTEX_PRIVATE_FLAG` so that the kernel
//! keys the wait queue on the physical page and waiters in other processes
//! mapping the same segment are woken.

use super::WaitOutcome;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// `FUTEX_WAIT`: sleep while `*word == expected`, relative `timeout`.
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitOutcome {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: `word` is a live, 4-byte aligned u32; `ts_ptr` is null or
    // points at a timespec that outlives the call.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0u32,
        )
    };

    if rc == 0 {
        return WaitOutcome::Notified;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ETIMEDOUT) => WaitOutcome::TimedOut,
        // EAGAIN: word already differs. EINTR: signal. Both mean "re-check".
        Some(libc::EAGAIN) | Some(libc::EINTR) => WaitOutcome::Notified,
        errno => {
            tracing::warn!("futex wait failed (errno {:?}), falling back to re-check", errno);
            WaitOutcome::Notified
        }
    }
}

/// `FUTEX_WAKE` every waiter on `word`; returns how many were woken.
pub fn futex_wake_all(word: &AtomicU32) -> usize {
    // SAFETY: `word` is a live, 4-byte aligned u32.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        )
    };
    if rc < 0 {
        tracing::warn!("futex wake failed: {}", std::io::Error::last_os_error());
        return 0;
    }
    rc as usize
}
