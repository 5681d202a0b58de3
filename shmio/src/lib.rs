//! # shmio: zero-copy shared memory segments
//!
//! Named shared memory segments for exchanging large buffers (images, sample
//! grids) plus typed metadata between independent processes on one host,
//! without a broker. One producer creates a segment and publishes frames;
//! any number of consumers open it and pull the latest frame.
//!
//! ## Segment layout
//!
//! ```text
//! ┌───────────────────┬──────────────────────┬──────────────────────────────┐
//! │ Header (128 B)    │ Keyword table        │ Data buffer                  │
//! │ magic, type,      │ name/type/value/     │ element_count × element_size │
//! │ shape, version,   │ comment per entry    │ (64-byte aligned)            │
//! │ timestamps        │                      │                              │
//! └───────────────────┴──────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Producer / consumer
//!
//! ```rust,no_run
//! use shmio::{DataType, Keyword, SharedMemory};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Producer
//! let keywords = [
//!     Keyword::long("WIDTH", 640, "Width")?,
//!     Keyword::long("HEIGHT", 480, "Height")?,
//!     Keyword::double("FRMRATE", 0.0, "Frame rate (fps)")?,
//! ];
//! let mut camera = SharedMemory::create("camera", 640 * 480, DataType::Uint16, &keywords)?;
//! camera.ndarray_mut::<u16>()?.fill(1000);
//! camera.keywords().set_value("FRMRATE", 30.5)?;
//! camera.push_data_to_storage();
//!
//! // Consumer (usually another process)
//! let mut viewer = SharedMemory::open("camera")?;
//! viewer.pull_data_from_storage(Some(Duration::from_millis(50)))?;
//! let frame = viewer.ndarray::<u16>()?;
//! assert_eq!(frame.shape(), &[480, 640]);
//! println!("{} fps", viewer.keywords().get_double("FRMRATE")?);
//!
//! SharedMemory::unlink("camera")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Visibility
//!
//! Buffer writes become visible to a consumer exactly when its pull observes
//! the version bump of the push that followed them (release on push, acquire
//! on pull). Keyword values are individually guarded by a per-entry sequence
//! counter and never observed torn.
//!
//! ## Frames on request
//!
//! Besides free-running push/pull, a consumer may ask for a frame with
//! [`SharedMemory::consumer_request_start`] and wait for it with
//! [`SharedMemory::consumer_wait_for_ready`]; the producer answers through
//! [`SharedMemory::producer_wait_for_request`] and
//! [`SharedMemory::producer_request_done`]. See [`request`].
//!
//! ## Lifetime
//!
//! Dropping a handle unmaps it. The segment itself stays in the namespace
//! until [`SharedMemory::unlink`] is called, or until
//! [`lifecycle::cleanup_orphaned_segments`] reclaims it after its producer died.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod data_type;
pub mod discovery;
pub mod error;
pub mod keyword;
pub mod lifecycle;
pub mod platform;
pub mod request;
pub mod segment;
pub mod shared_memory;
pub mod store;
pub mod sync;
pub mod version;

pub use buffer::{ArrayView, ArrayViewMut, Element, Half};
pub use config::{PullConfig, PullStrategy, ShmConfig};
pub use data_type::DataType;
pub use discovery::{SegmentDiscovery, SegmentInfo};
pub use error::{ShmError, ShmResult};
pub use keyword::{Keyword, KeywordType, KeywordValue};
pub use lifecycle::{SegmentCleanup, cleanup_orphaned_segments};
pub use shared_memory::SharedMemory;
pub use store::KeywordStore;
pub use sync::{PullMode, PullOutcome};

pub use common::config::LogLevel;

/// Install a `tracing` subscriber printing to stderr.
///
/// `RUST_LOG` overrides `level`. Does nothing if a global subscriber is
/// already installed.
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
