//! shmio Common Library
//!
//! Constants describing the shared-memory segment format and the
//! configuration loading utilities used by every shmio crate.
//!
//! # Module Structure
//!
//! - [`consts`] - Segment format constants (magic, field widths, limits)
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! common = { package = "shmio_common", path = "../shmio_common" }
//! ```
//!
//! ```rust
//! use shmio_common::consts::*;
//! use shmio_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
