//! Shared memory segment structures and operations
//!
//! A segment is one mapping laid out as
//!
//! ```text
//! ┌──────────────────┬───────────────────────────┬─────────┬──────────────────┐
//! │ SegmentHeader    │ KeywordEntry × count      │ padding │ data buffer      │
//! │ 128 B, align 64  │ 176 B each, decl. order   │ to 64 B │ element_count ×  │
//! │                  │                           │         │ element_size     │
//! └──────────────────┴───────────────────────────┴─────────┴──────────────────┘
//! ```

use crate::data_type::DataType;
use crate::error::{ShmError, ShmResult};
use crate::keyword::{KEYWORD_ENTRY_SIZE, Keyword, KeywordEntry};
use crate::platform::get_current_pid;
use common::consts::{
    CACHE_LINE_SIZE, DEPTH_KEYWORD, HEIGHT_KEYWORD, LAYOUT_VERSION, MAX_DIMS, MAX_KEYWORDS,
    SHM_MAX_SIZE, SHMIO_MAGIC, WIDTH_KEYWORD,
};
use memmap2::MmapMut;
use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Dimension extents, slowest-varying first.
pub type Shape = heapless::Vec<usize, MAX_DIMS>;

/// Segment header with cache-line alignment
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Magic tag; zero until the creator has finished initializing
    pub magic: AtomicU64,
    /// Header/keyword table layout version
    pub layout_version: u32,
    /// `DataType` tag
    pub data_type: u32,
    /// Number of elements in the data buffer
    pub element_count: u64,
    /// Number of valid entries in `dims`
    pub ndim: u32,
    _reserved: u32,
    /// Dimension extents, slowest-varying first
    pub dims: [u64; MAX_DIMS],
    /// Number of keyword table entries
    pub keyword_count: u32,
    /// Process that created the segment
    pub writer_pid: u32,
    /// Creation timestamp (ns since UNIX epoch)
    pub creation_time_ns: u64,
    /// Last push timestamp (ns since UNIX epoch), only ever raised
    pub last_access_time_ns: AtomicU64,
    /// Published frame version
    pub version: AtomicU64,
    /// Wake word bumped on every push
    pub notify_seq: AtomicU32,
    /// Live mappings across all processes
    pub attach_count: AtomicU32,
    /// Byte offset of the data buffer from the start of the mapping
    pub data_offset: u64,
    /// Data buffer size in bytes
    pub data_size: u64,
    /// Frame requests issued by consumers
    pub request_seq: AtomicU32,
    /// Latest request the producer has served
    pub ready_seq: AtomicU32,
}

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = core::mem::size_of::<SegmentHeader>();

const_assert_eq!(core::mem::size_of::<SegmentHeader>(), 128);
const_assert_eq!(core::mem::align_of::<SegmentHeader>(), CACHE_LINE_SIZE);
const_assert_eq!(HEADER_SIZE % core::mem::align_of::<KeywordEntry>(), 0);

impl SegmentHeader {
    /// Create a new header; `magic` stays zero until [`SegmentHeader::publish`].
    pub fn new(
        data_type: DataType,
        shape: &[usize],
        keyword_count: usize,
        layout: &SegmentLayout,
    ) -> Self {
        let now = now_ns();
        let mut dims = [0u64; MAX_DIMS];
        for (dst, &extent) in dims.iter_mut().zip(shape) {
            *dst = extent as u64;
        }

        Self {
            magic: AtomicU64::new(0),
            layout_version: LAYOUT_VERSION,
            data_type: data_type.tag(),
            element_count: shape.iter().product::<usize>() as u64,
            ndim: shape.len() as u32,
            _reserved: 0,
            dims,
            keyword_count: keyword_count as u32,
            writer_pid: get_current_pid(),
            creation_time_ns: now,
            last_access_time_ns: AtomicU64::new(now),
            version: AtomicU64::new(0),
            notify_seq: AtomicU32::new(0),
            attach_count: AtomicU32::new(0),
            data_offset: layout.data_offset as u64,
            data_size: layout.data_size as u64,
            request_seq: AtomicU32::new(0),
            ready_seq: AtomicU32::new(0),
        }
    }

    /// Make the fully written header and keyword table visible to `open`.
    pub fn publish(&self) {
        self.magic.store(SHMIO_MAGIC, Ordering::Release);
    }

    /// Validate header magic, version and internal size consistency
    pub fn validate(&self, name: &str) -> ShmResult<DataType> {
        match self.magic.load(Ordering::Acquire) {
            SHMIO_MAGIC => {}
            0 => return Err(ShmError::not_ready(name, "header not published yet")),
            other => {
                return Err(ShmError::format_mismatch(
                    name,
                    format!("bad magic {other:#018x}"),
                ));
            }
        }

        if self.layout_version != LAYOUT_VERSION {
            return Err(ShmError::format_mismatch(
                name,
                format!(
                    "layout version {} (expected {LAYOUT_VERSION})",
                    self.layout_version
                ),
            ));
        }

        let data_type = DataType::from_tag(self.data_type).ok_or_else(|| {
            ShmError::format_mismatch(name, format!("unknown data type tag {}", self.data_type))
        })?;

        let expected_size = usize::try_from(self.element_count)
            .ok()
            .and_then(|count| data_type.byte_size(count));
        if expected_size != Some(self.data_size as usize) {
            return Err(ShmError::format_mismatch(
                name,
                format!(
                    "data size {} does not match {} x {}",
                    self.data_size, self.element_count, data_type
                ),
            ));
        }

        let ndim = self.ndim as usize;
        if ndim == 0 || ndim > MAX_DIMS {
            return Err(ShmError::format_mismatch(
                name,
                format!("ndim {ndim} outside 1..={MAX_DIMS}"),
            ));
        }
        let product = self.dims[..ndim]
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d));
        if product != Some(self.element_count) {
            return Err(ShmError::format_mismatch(
                name,
                format!(
                    "shape {:?} does not multiply to {}",
                    &self.dims[..ndim],
                    self.element_count
                ),
            ));
        }

        if self.keyword_count as usize > MAX_KEYWORDS {
            return Err(ShmError::format_mismatch(
                name,
                format!("keyword count {} exceeds {MAX_KEYWORDS}", self.keyword_count),
            ));
        }

        Ok(data_type)
    }

    /// Dimension extents
    pub fn shape(&self) -> Shape {
        self.dims[..(self.ndim as usize).min(MAX_DIMS)]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Raise `last_access_time_ns` to now; never moves it backwards.
    pub fn touch(&self) -> u64 {
        let now = now_ns();
        let previous = self.last_access_time_ns.fetch_max(now, Ordering::AcqRel);
        previous.max(now)
    }
}

/// Byte offsets of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    /// Number of keyword table entries
    pub keyword_count: usize,
    /// Offset of the data buffer (cache-line aligned)
    pub data_offset: usize,
    /// Data buffer size
    pub data_size: usize,
    /// Total mapping size
    pub total_size: usize,
}

impl SegmentLayout {
    /// Compute the layout of a segment
    pub fn new(keyword_count: usize, data_size: usize) -> ShmResult<Self> {
        if keyword_count > MAX_KEYWORDS {
            return Err(ShmError::out_of_range(format!(
                "{keyword_count} keywords exceed the limit of {MAX_KEYWORDS}"
            )));
        }
        if data_size == 0 || data_size > SHM_MAX_SIZE {
            return Err(ShmError::out_of_range(format!(
                "data size {data_size} bytes outside 1..={SHM_MAX_SIZE}"
            )));
        }

        let table_end = HEADER_SIZE + keyword_count * KEYWORD_ENTRY_SIZE;
        let data_offset = cache_aligned_size(table_end);

        Ok(Self {
            keyword_count,
            data_offset,
            data_size,
            total_size: data_offset + data_size,
        })
    }
}

/// Round `size` up to the next cache line boundary
pub const fn cache_aligned_size(size: usize) -> usize {
    (size + CACHE_LINE_SIZE - 1) & !(CACHE_LINE_SIZE - 1)
}

/// Shape of a new segment: `[DEPTH, HEIGHT, WIDTH]`, `[HEIGHT, WIDTH]`, or
/// `[element_count]` when no dimension keywords are declared.
pub fn derive_shape(element_count: usize, keywords: &[Keyword]) -> ShmResult<Shape> {
    let extent = |name: &str| -> ShmResult<Option<usize>> {
        let Some(keyword) = keywords.iter().find(|k| k.name() == name) else {
            return Ok(None);
        };
        match keyword.value().as_long() {
            Some(v) if v > 0 => Ok(Some(v as usize)),
            Some(v) => Err(ShmError::out_of_range(format!(
                "dimension keyword {name} must be positive, got {v}"
            ))),
            None => Err(ShmError::TypeMismatch {
                what: format!("dimension keyword {name}"),
                expected: "LONG".to_string(),
                found: keyword.keyword_type().to_string(),
            }),
        }
    };

    let width = extent(WIDTH_KEYWORD)?;
    let height = extent(HEIGHT_KEYWORD)?;
    let depth = extent(DEPTH_KEYWORD)?;

    let dims: Shape = match (depth, height, width) {
        (Some(d), Some(h), Some(w)) => [d, h, w].into_iter().collect(),
        (None, Some(h), Some(w)) => [h, w].into_iter().collect(),
        _ => [element_count].into_iter().collect(),
    };

    let product = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
    if product != Some(element_count) {
        return Err(ShmError::out_of_range(format!(
            "shape {:?} from dimension keywords does not match {element_count} elements",
            dims.as_slice()
        )));
    }

    Ok(dims)
}

/// Core shared memory segment representation
pub struct SharedMemorySegment {
    /// Segment name
    pub name: String,
    /// Byte offsets
    pub layout: SegmentLayout,
    /// Element type
    pub data_type: DataType,
    /// Memory mapping
    mmap: MmapMut,
}

impl SharedMemorySegment {
    /// Initialize a freshly created, zero-filled mapping and publish it.
    pub fn initialize(
        name: &str,
        mut mmap: MmapMut,
        data_type: DataType,
        shape: &[usize],
        keywords: &[Keyword],
        layout: SegmentLayout,
    ) -> ShmResult<Self> {
        if mmap.len() < layout.total_size {
            return Err(ShmError::out_of_range(format!(
                "mapping of {} bytes cannot hold {} bytes",
                mmap.len(),
                layout.total_size
            )));
        }

        let base = mmap.as_mut_ptr();
        // SAFETY: the mapping is page aligned, at least `total_size` long and
        // not yet published, so nobody else reads these bytes.
        unsafe {
            (base as *mut SegmentHeader).write(SegmentHeader::new(
                data_type,
                shape,
                keywords.len(),
                &layout,
            ));
            let entries = base.add(HEADER_SIZE) as *mut KeywordEntry;
            for (index, keyword) in keywords.iter().enumerate() {
                KeywordEntry::write_new(entries.add(index), keyword);
            }
        }

        let segment = Self {
            name: name.to_string(),
            layout,
            data_type,
            mmap,
        };
        segment.header().publish();
        Ok(segment)
    }

    /// Validate an existing mapping and wrap it.
    pub fn attach(name: &str, mmap: MmapMut) -> ShmResult<Self> {
        if mmap.len() < HEADER_SIZE {
            return Err(ShmError::format_mismatch(
                name,
                format!("object is {} bytes, smaller than the header", mmap.len()),
            ));
        }

        // SAFETY: length checked above, mapping is page aligned.
        let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
        let data_type = header.validate(name)?;

        let layout = SegmentLayout::new(header.keyword_count as usize, header.data_size as usize)
            .map_err(|e| ShmError::format_mismatch(name, e.to_string()))?;
        if header.data_offset as usize != layout.data_offset {
            return Err(ShmError::format_mismatch(
                name,
                format!(
                    "data offset {} does not match {} keywords (expected {})",
                    header.data_offset, layout.keyword_count, layout.data_offset
                ),
            ));
        }
        if mmap.len() < layout.total_size {
            return Err(ShmError::format_mismatch(
                name,
                format!(
                    "object is {} bytes, header declares {}",
                    mmap.len(),
                    layout.total_size
                ),
            ));
        }

        let segment = Self {
            name: name.to_string(),
            layout,
            data_type,
            mmap,
        };

        let entries = segment.keyword_entries();
        for (index, entry) in entries.iter().enumerate() {
            entry.validate(name, index)?;
            let entry_name = entry.name();
            if entries[..index].iter().any(|e| e.name() == entry_name) {
                return Err(ShmError::format_mismatch(
                    name,
                    format!("keyword #{index} duplicates an earlier name"),
                ));
            }
        }

        Ok(segment)
    }

    /// Get header reference
    pub fn header(&self) -> &SegmentHeader {
        // SAFETY: size and alignment validated at construction.
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    /// Keyword table in declaration order
    pub fn keyword_entries(&self) -> &[KeywordEntry] {
        // SAFETY: the table lies inside the validated layout; entries only
        // mutate through atomics.
        unsafe {
            std::slice::from_raw_parts(
                self.mmap.as_ptr().add(HEADER_SIZE) as *const KeywordEntry,
                self.layout.keyword_count,
            )
        }
    }

    /// Get data section pointer
    pub fn data_ptr(&self) -> *const u8 {
        // SAFETY: data_offset is inside the mapping.
        unsafe { self.mmap.as_ptr().add(self.layout.data_offset) }
    }

    /// Get mutable data section pointer
    pub fn data_ptr_mut(&mut self) -> *mut u8 {
        // SAFETY: data_offset is inside the mapping.
        unsafe { self.mmap.as_mut_ptr().add(self.layout.data_offset) }
    }

    /// Get data section as slice
    pub fn data(&self) -> &[u8] {
        &self.mmap[self.layout.data_offset..self.layout.total_size]
    }

    /// Get mutable data section as slice
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[self.layout.data_offset..self.layout.total_size]
    }
}

/// Current wall-clock time in ns since the UNIX epoch
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Inverse of [`now_ns`]
pub fn ns_to_system_time(ns: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(ns)
}
