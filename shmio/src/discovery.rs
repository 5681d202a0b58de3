//! Segment discovery and metadata inspection

use crate::data_type::DataType;
use crate::error::{ShmError, ShmResult};
use crate::platform::{attach_segment_mmap, is_process_alive, object_name};
use crate::segment::{SharedMemorySegment, ns_to_system_time};
use common::consts::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Directory where Linux exposes POSIX shared memory objects.
pub const SHM_DIR: &str = "/dev/shm";

/// Segment discovery over one namespace
#[derive(Debug, Clone)]
pub struct SegmentDiscovery {
    namespace: String,
    shm_dir: PathBuf,
}

/// Segment metadata information
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// Segment name
    pub name: String,
    /// Data section size in bytes
    pub size: usize,
    /// Element type
    pub data_type: DataType,
    /// Dimension extents
    pub shape: Vec<usize>,
    /// Declared keywords
    pub keyword_count: usize,
    /// Latest published version
    pub version: u64,
    /// Writer process ID
    pub writer_pid: u32,
    /// Whether the writer process is still running
    pub writer_alive: bool,
    /// Live mappings
    pub attach_count: u32,
    /// Creation timestamp
    pub created_at: SystemTime,
    /// Last push timestamp
    pub last_accessed: SystemTime,
}

impl SegmentDiscovery {
    /// Discovery in the default namespace
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Discovery in `namespace`
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            shm_dir: PathBuf::from(SHM_DIR),
        }
    }

    /// Namespace being scanned
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// List every valid segment of the namespace, newest first.
    ///
    /// Objects that fail validation are logged and skipped. Returns an empty
    /// list on systems without `/dev/shm`.
    pub fn list_segments(&self) -> ShmResult<Vec<SegmentInfo>> {
        let mut segments = Vec::new();
        if !self.shm_dir.is_dir() {
            return Ok(segments);
        }

        let prefix = format!("{}_", self.namespace);
        for entry in std::fs::read_dir(&self.shm_dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(name) = file_name.strip_prefix(&prefix) else {
                continue;
            };

            match self.inspect(name) {
                Ok(info) => segments.push(info),
                // Unlinked between readdir and open.
                Err(ShmError::NotFound { .. }) => {}
                Err(ShmError::NotReady { .. }) => {
                    debug!("Segment '{}' still being created", name);
                }
                Err(e) => warn!("Skipping shared memory object '{}': {}", file_name, e),
            }
        }

        segments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(segments)
    }

    /// Find segment by name
    pub fn find_segment(&self, name: &str) -> ShmResult<Option<SegmentInfo>> {
        match self.inspect(name) {
            Ok(info) => Ok(Some(info)),
            Err(ShmError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read one segment's header without registering as an attached handle.
    pub fn inspect(&self, name: &str) -> ShmResult<SegmentInfo> {
        let object = object_name(&self.namespace, name)?;
        let segment = SharedMemorySegment::attach(name, attach_segment_mmap(&object, name)?)?;
        let header = segment.header();

        Ok(SegmentInfo {
            name: name.to_string(),
            size: segment.layout.data_size,
            data_type: segment.data_type,
            shape: header.shape().to_vec(),
            keyword_count: segment.layout.keyword_count,
            version: header.version.load(Ordering::Acquire),
            writer_pid: header.writer_pid,
            writer_alive: is_process_alive(header.writer_pid),
            attach_count: header.attach_count.load(Ordering::Acquire),
            created_at: ns_to_system_time(header.creation_time_ns),
            last_accessed: ns_to_system_time(header.last_access_time_ns.load(Ordering::Acquire)),
        })
    }
}

impl Default for SegmentDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
