//! Reclamation of segments left behind by dead producers
//!
//! Segments are never unlinked implicitly: a producer that exits cleanly is
//! expected to call [`SharedMemory::unlink`](crate::SharedMemory::unlink).
//! A producer that crashes leaves its object in the namespace. Such a segment
//! is an orphan once its writer process is gone and nothing has been pushed
//! for longer than the grace period.
//!
//! Reclamation is also the way out of a keyword entry left locked by a
//! process killed mid-write: such an entry answers every access with
//! `VersionConflict` until the segment is recreated, since the entry's
//! sequence word does not record which process holds it.

use crate::discovery::{SegmentDiscovery, SegmentInfo};
use crate::error::{ShmError, ShmResult};
use crate::shared_memory::SharedMemory;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Cleanup coordinator for orphaned segments
#[derive(Debug, Clone)]
pub struct SegmentCleanup {
    discovery: SegmentDiscovery,
    grace_period: Duration,
}

impl SegmentCleanup {
    /// Coordinator for the default namespace
    pub fn new(grace_period: Duration) -> Self {
        Self::with_discovery(SegmentDiscovery::new(), grace_period)
    }

    /// Coordinator over an explicit discovery scope
    pub fn with_discovery(discovery: SegmentDiscovery, grace_period: Duration) -> Self {
        Self {
            discovery,
            grace_period,
        }
    }

    /// Whether `info` describes an orphan at time `now`
    pub fn is_orphaned(&self, info: &SegmentInfo, now: SystemTime) -> bool {
        if info.writer_alive {
            return false;
        }
        now.duration_since(info.last_accessed)
            .is_ok_and(|idle| idle >= self.grace_period)
    }

    /// Unlink every orphan in the namespace; returns the reclaimed names.
    pub fn cleanup_orphaned_segments(&self) -> ShmResult<Vec<String>> {
        let now = SystemTime::now();
        let mut reclaimed = Vec::new();

        for segment in self.discovery.list_segments()? {
            if !self.is_orphaned(&segment, now) {
                continue;
            }
            match SharedMemory::unlink_in(self.discovery.namespace(), &segment.name) {
                Ok(()) => {
                    info!(
                        "Reclaimed orphaned segment '{}' (writer pid {} gone, {} mappings left)",
                        segment.name, segment.writer_pid, segment.attach_count
                    );
                    reclaimed.push(segment.name);
                }
                // Someone else got there first.
                Err(ShmError::NotFound { .. }) => {
                    debug!("Orphan '{}' already unlinked", segment.name);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(reclaimed)
    }
}

/// Unlink orphans of the default namespace idle for at least `grace`.
pub fn cleanup_orphaned_segments(grace: Duration) -> ShmResult<Vec<String>> {
    SegmentCleanup::new(grace).cleanup_orphaned_segments()
}
