//! Segment handles: create, open, release, unlink

use crate::config::ShmConfig;
use crate::data_type::DataType;
use crate::error::{ShmError, ShmResult};
use crate::keyword::Keyword;
use crate::platform::{
    MemoryConfig, attach_segment_mmap, create_segment_mmap, object_name, unlink_segment,
};
use crate::segment::{
    Shape, SharedMemorySegment, SegmentLayout, derive_shape, now_ns, ns_to_system_time,
};
use crate::store::{KeywordStore, validate_declarations};
use crate::sync::PullMode;
use common::consts::DEFAULT_NAMESPACE;
use std::fmt;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// A process-local handle on one shared memory segment.
///
/// Created by [`SharedMemory::create`] (the producer) or
/// [`SharedMemory::open`] (consumers). Each handle owns only its own mapping;
/// dropping it unmaps this process's view and never affects other handles.
/// The underlying object outlives every handle until
/// [`SharedMemory::unlink`] is called.
pub struct SharedMemory {
    pub(crate) segment: SharedMemorySegment,
    namespace: String,
    shape: Shape,
    pub(crate) last_seen_version: u64,
    pub(crate) observed_access_ns: u64,
    pub(crate) pull_mode: PullMode,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) cancel_check_interval: Duration,
    pub(crate) pending_request: Option<u32>,
    pub(crate) serving_request: Option<u32>,
}

impl SharedMemory {
    /// Create a segment in the default namespace.
    ///
    /// Allocates room for the header, one entry per keyword and
    /// `element_count` elements of `data_type`. Fails with `AlreadyExists`
    /// if the name is taken, `OutOfRange` for a zero or oversized buffer or
    /// when `WIDTH`/`HEIGHT`/`DEPTH` disagree with `element_count`, and
    /// `DuplicateKeyword` when a name is declared twice.
    pub fn create(
        name: &str,
        element_count: usize,
        data_type: DataType,
        keywords: &[Keyword],
    ) -> ShmResult<Self> {
        Self::create_with_config(name, element_count, data_type, keywords, &ShmConfig::default())
    }

    /// Create a segment using `config` for namespace and pull behaviour.
    pub fn create_with_config(
        name: &str,
        element_count: usize,
        data_type: DataType,
        keywords: &[Keyword],
        config: &ShmConfig,
    ) -> ShmResult<Self> {
        config.validate()?;
        let object = object_name(&config.namespace, name)?;

        if element_count == 0 {
            return Err(ShmError::out_of_range("element count must be positive"));
        }
        let data_size = data_type.byte_size(element_count).ok_or_else(|| {
            ShmError::out_of_range(format!(
                "{element_count} elements of {data_type} overflow the address space"
            ))
        })?;
        validate_declarations(keywords)?;
        let shape = derive_shape(element_count, keywords)?;
        let layout = SegmentLayout::new(keywords.len(), data_size)?;

        let mmap = create_segment_mmap(&object, name, layout.total_size, &MemoryConfig::default())?;
        let segment =
            match SharedMemorySegment::initialize(name, mmap, data_type, &shape, keywords, layout) {
                Ok(segment) => segment,
                Err(e) => {
                    let _ = unlink_segment(&object, name);
                    return Err(e);
                }
            };

        info!(
            "Created segment '{}' ({}): {} x {} {:?}, {} keywords, {} bytes mapped",
            name,
            object,
            element_count,
            data_type,
            shape.as_slice(),
            keywords.len(),
            layout.total_size
        );

        Ok(Self::attached(segment, config, shape))
    }

    /// Open an existing segment in the default namespace.
    ///
    /// Fails with `NotFound` if there is no such segment, with the retriable
    /// `NotReady` while its creator is still initializing it, and with
    /// `FormatMismatch` if its header does not validate.
    pub fn open(name: &str) -> ShmResult<Self> {
        Self::open_with_config(name, &ShmConfig::default())
    }

    /// Open an existing segment using `config` for namespace and pull behaviour.
    pub fn open_with_config(name: &str, config: &ShmConfig) -> ShmResult<Self> {
        config.validate()?;
        let object = object_name(&config.namespace, name)?;
        let mmap = attach_segment_mmap(&object, name)?;
        let segment = SharedMemorySegment::attach(name, mmap)?;
        let shape = segment.header().shape();

        debug!(
            "Opened segment '{}' ({}): {} {:?}, version {}",
            name,
            object,
            segment.data_type,
            shape.as_slice(),
            segment.header().version.load(Ordering::Acquire)
        );

        Ok(Self::attached(segment, config, shape))
    }

    fn attached(segment: SharedMemorySegment, config: &ShmConfig, shape: Shape) -> Self {
        let header = segment.header();
        header.attach_count.fetch_add(1, Ordering::AcqRel);
        let last_seen_version = header.version.load(Ordering::Acquire);
        let observed_access_ns = header.last_access_time_ns.load(Ordering::Acquire);

        Self {
            segment,
            namespace: config.namespace.clone(),
            shape,
            last_seen_version,
            observed_access_ns,
            pull_mode: config.pull.pull_mode(),
            default_timeout: config.pull.timeout(),
            cancel_check_interval: config.pull.cancel_check_interval(),
            pending_request: None,
            serving_request: None,
        }
    }

    /// Release this handle's mapping. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// Remove a segment from the default namespace.
    ///
    /// Mappings held by existing handles stay valid until they are released;
    /// later `open` calls fail with `NotFound`.
    pub fn unlink(name: &str) -> ShmResult<()> {
        Self::unlink_in(DEFAULT_NAMESPACE, name)
    }

    /// Remove a segment from `namespace`.
    pub fn unlink_in(namespace: &str, name: &str) -> ShmResult<()> {
        let object = object_name(namespace, name)?;
        unlink_segment(&object, name)?;
        info!("Unlinked segment '{}' ({})", name, object);
        Ok(())
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.segment.name
    }

    /// Namespace the segment lives in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Data buffer size in bytes
    pub fn size(&self) -> usize {
        self.segment.layout.data_size
    }

    /// Element type
    pub fn data_type(&self) -> DataType {
        self.segment.data_type
    }

    /// Dimension extents, slowest-varying first
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements in the data buffer
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// When the segment was created
    pub fn creation_time(&self) -> SystemTime {
        ns_to_system_time(self.segment.header().creation_time_ns)
    }

    /// Latest access seen by this handle: the last push on the segment or
    /// this handle's last successful pull, whichever is later. Never decreases.
    pub fn last_access_time(&self) -> SystemTime {
        let shared = self
            .segment
            .header()
            .last_access_time_ns
            .load(Ordering::Acquire);
        ns_to_system_time(shared.max(self.observed_access_ns))
    }

    /// Latest published version
    pub fn version(&self) -> u64 {
        self.segment.header().version.load(Ordering::Acquire)
    }

    /// Version this handle last observed
    pub fn last_seen_version(&self) -> u64 {
        self.last_seen_version
    }

    /// Process that created the segment
    pub fn writer_pid(&self) -> u32 {
        self.segment.header().writer_pid
    }

    /// Live mappings across all processes
    pub fn attach_count(&self) -> u32 {
        self.segment.header().attach_count.load(Ordering::Acquire)
    }

    /// The segment's keyword table
    pub fn keywords(&self) -> KeywordStore<'_> {
        KeywordStore::new(self.segment.keyword_entries())
    }

    pub(crate) fn observe_access(&mut self) {
        let shared = self
            .segment
            .header()
            .last_access_time_ns
            .load(Ordering::Acquire);
        self.observed_access_ns = self.observed_access_ns.max(shared).max(now_ns());
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        let count = &self.segment.header().attach_count;
        let previous = count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous.is_err() {
            warn!("Segment '{}' attach count already zero", self.name());
        }
        debug!("Released segment '{}'", self.name());
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name())
            .field("namespace", &self.namespace)
            .field("data_type", &self.data_type())
            .field("shape", &self.shape())
            .field("size", &self.size())
            .field("version", &self.version())
            .field("last_seen_version", &self.last_seen_version)
            .field("pull_mode", &self.pull_mode)
            .finish()
    }
}
