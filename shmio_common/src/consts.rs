//! Shared memory constants for the shmio workspace.
//!
//! Single source of truth for the segment format: magic tag, layout version,
//! fixed field widths and size limits. Every crate imports from here; changing
//! any value here changes the on-segment format and requires bumping
//! [`LAYOUT_VERSION`].

/// Magic tag written (last) into every initialized segment header: `"SHMIO\0\0\x01"`.
pub const SHMIO_MAGIC: u64 = u64::from_le_bytes(*b"SHMIO\0\0\x01");

/// Version of the header + keyword table layout.
pub const LAYOUT_VERSION: u32 = 2;

/// Default namespace prefix for POSIX shared-memory object names.
///
/// A segment called `camera` lives at `/shmio_camera` (`/dev/shm/shmio_camera` on Linux).
pub const DEFAULT_NAMESPACE: &str = "shmio";

/// Maximum segment name length in bytes (namespace prefix excluded).
///
/// Kept well under `NAME_MAX` so that `/<namespace>_<name>` always fits.
pub const MAX_SEGMENT_NAME_LEN: usize = 200;

/// CPU cache line size in bytes. The header and the data region are aligned to it.
pub const CACHE_LINE_SIZE: usize = 64;

/// Maximum data buffer size in bytes (1 GiB).
pub const SHM_MAX_SIZE: usize = 1_073_741_824;

/// Maximum number of dimensions stored in the header.
pub const MAX_DIMS: usize = 4;

/// Maximum number of keywords per segment.
pub const MAX_KEYWORDS: usize = 256;

/// Fixed width of a keyword name in bytes.
pub const KEYWORD_NAME_LEN: usize = 16;

/// Fixed width of a keyword string value in bytes.
pub const KEYWORD_TEXT_LEN: usize = 64;

/// Fixed width of a keyword comment in bytes.
pub const KEYWORD_COMMENT_LEN: usize = 80;

/// Keyword holding the row length of an image-like buffer.
pub const WIDTH_KEYWORD: &str = "WIDTH";

/// Keyword holding the number of rows of an image-like buffer.
pub const HEIGHT_KEYWORD: &str = "HEIGHT";

/// Keyword holding the number of planes of a cube-like buffer.
pub const DEPTH_KEYWORD: &str = "DEPTH";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_shmio() {
        assert_eq!(&SHMIO_MAGIC.to_le_bytes()[..5], b"SHMIO");
        assert_ne!(SHMIO_MAGIC, 0);
    }

    #[test]
    fn text_width_is_word_multiple() {
        // String values are stored as atomic u64 words.
        assert_eq!(KEYWORD_TEXT_LEN % 8, 0);
    }

    #[test]
    fn size_limits_are_consistent() {
        assert!(SHM_MAX_SIZE > CACHE_LINE_SIZE);
        assert!(CACHE_LINE_SIZE.is_power_of_two());
        assert!(MAX_DIMS >= 3);
        assert!(MAX_KEYWORDS > 0);
    }
}
