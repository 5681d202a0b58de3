//! Prelude module for common re-exports.
//!
//! ```rust
//! use shmio_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Segment Format ─────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_NAMESPACE, KEYWORD_NAME_LEN, LAYOUT_VERSION, SHMIO_MAGIC};

/// Default interval of the degraded polling wait (500 µs).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Default slice a cancellable pull sleeps before re-checking its cancel flag.
pub const DEFAULT_CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(10);
