//! Error types for shared memory operations

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment already exists
    #[error("Segment already exists: {name}")]
    AlreadyExists {
        /// Segment name
        name: String,
    },

    /// Segment not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Keyword not declared in the segment's keyword store
    #[error("Keyword not found: {name}")]
    KeywordNotFound {
        /// Keyword name
        name: String,
    },

    /// Header validation failed on open; the segment is unusable
    #[error("Segment format mismatch for '{name}': {reason}")]
    FormatMismatch {
        /// Segment name
        name: String,
        /// What failed to validate
        reason: String,
    },

    /// The object exists but its creator has not finished initializing it
    #[error("Segment '{name}' is not ready: {reason}")]
    NotReady {
        /// Segment name
        name: String,
        /// What is still missing
        reason: String,
    },

    /// A pull or a request handshake wait passed its deadline
    #[error("Timed out after {waited:?} waiting on '{name}'")]
    Timeout {
        /// Segment name
        name: String,
        /// Time spent waiting
        waited: Duration,
    },

    /// Value or element type does not match the declared type
    #[error("Type mismatch for {what}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Keyword name or buffer description
        what: String,
        /// Declared type
        expected: String,
        /// Offered type
        found: String,
    },

    /// Size, count or width outside the supported range
    #[error("Value out of range: {reason}")]
    OutOfRange {
        /// Description of the violated limit
        reason: String,
    },

    /// Keyword declared twice at creation
    #[error("Duplicate keyword: {name}")]
    DuplicateKeyword {
        /// Keyword name
        name: String,
    },

    /// Segment name unusable as a shared memory object name
    #[error("Invalid segment name '{name}': {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A keyword entry stayed locked by a writer for too long
    #[error("Version conflict detected - retry recommended")]
    VersionConflict,

    /// A cancellable pull observed its cancel flag
    #[error("Pull cancelled")]
    Cancelled,

    /// Invalid handle configuration
    #[error("Invalid configuration: {source}")]
    Config {
        /// Source configuration error
        #[from]
        source: common::config::ConfigError,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

impl ShmError {
    /// True for a missing segment or a missing keyword.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ShmError::NotFound { .. } | ShmError::KeywordNotFound { .. }
        )
    }

    /// Whether retrying the same call can succeed.
    ///
    /// Malformed segments and caller-side mistakes are permanent.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            ShmError::FormatMismatch { .. }
                | ShmError::InvalidName { .. }
                | ShmError::DuplicateKeyword { .. }
                | ShmError::TypeMismatch { .. }
                | ShmError::OutOfRange { .. }
                | ShmError::Config { .. }
        )
    }

    pub(crate) fn format_mismatch(name: &str, reason: impl Into<String>) -> Self {
        ShmError::FormatMismatch {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_ready(name: &str, reason: impl Into<String>) -> Self {
        ShmError::NotReady {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(reason: impl Into<String>) -> Self {
        ShmError::OutOfRange {
            reason: reason.into(),
        }
    }
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_covers_segments_and_keywords() {
        let seg = ShmError::NotFound {
            name: "cam".to_string(),
        };
        let kw = ShmError::KeywordNotFound {
            name: "EXPTIME".to_string(),
        };
        assert!(seg.is_not_found());
        assert!(kw.is_not_found());
        assert!(!ShmError::Cancelled.is_not_found());
    }

    #[test]
    fn test_format_mismatch_is_not_retriable() {
        let err = ShmError::format_mismatch("cam", "bad magic");
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("bad magic"));

        let timeout = ShmError::Timeout {
            name: "cam".to_string(),
            waited: Duration::from_millis(50),
        };
        assert!(timeout.is_retriable());
    }

    #[test]
    fn test_half_created_segment_is_retriable() {
        let err = ShmError::not_ready("cam", "magic not published");
        assert!(err.is_retriable());
        assert!(!err.is_not_found());
    }
}
