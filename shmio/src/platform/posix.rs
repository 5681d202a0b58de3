//! POSIX shared memory objects and process queries

use crate::error::{ShmError, ShmResult};
use common::consts::MAX_SEGMENT_NAME_LEN;
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::getpid;
use std::fs::File;

/// Mapping options applied when a segment is created
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Prefault the pages (`MAP_POPULATE`) so the first push does not page-fault
    pub populate: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { populate: true }
    }
}

/// Reject names that cannot be embedded in a shared memory object name.
pub fn validate_name(name: &str) -> ShmResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.len() > MAX_SEGMENT_NAME_LEN {
        "name is too long"
    } else if name.contains('/') {
        "name contains '/'"
    } else if name.contains('\0') {
        "name contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(ShmError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// `/<namespace>_<name>`, the object name passed to `shm_open`.
pub fn object_name(namespace: &str, name: &str) -> ShmResult<String> {
    validate_name(namespace)?;
    validate_name(name)?;
    Ok(format!("/{namespace}_{name}"))
}

/// Exclusively create `object` with `size` bytes and map it read/write.
///
/// The object is removed again if sizing or mapping fails, so a failed create
/// never leaves a stray zero-length object behind.
pub fn create_segment_mmap(
    object: &str,
    name: &str,
    size: usize,
    config: &MemoryConfig,
) -> ShmResult<MmapMut> {
    let fd = shm_open(
        object,
        OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
        Mode::S_IRUSR | Mode::S_IWUSR,
    )
    .map_err(|errno| match errno {
        Errno::EEXIST => ShmError::AlreadyExists {
            name: name.to_string(),
        },
        other => ShmError::from(other),
    })?;

    let map = || -> ShmResult<MmapMut> {
        let file = File::from(fd);
        file.set_len(size as u64)?;

        let mut options = MmapOptions::new();
        options.len(size);
        if config.populate {
            options.populate();
        }
        // SAFETY: the object was just created by us and sized to `size`;
        // it is only ever resized by this call.
        Ok(unsafe { options.map_mut(&file)? })
    };

    map().inspect_err(|_| {
        let _ = shm_unlink(object);
    })
}

/// Map an existing object read/write.
///
/// A zero-length object is one whose creator has not sized it yet and gives
/// the retriable `NotReady`.
pub fn attach_segment_mmap(object: &str, name: &str) -> ShmResult<MmapMut> {
    let fd = shm_open(object, OFlag::O_RDWR, Mode::empty()).map_err(|errno| match errno {
        Errno::ENOENT => ShmError::NotFound {
            name: name.to_string(),
        },
        other => ShmError::from(other),
    })?;

    let file = File::from(fd);
    let len = file.metadata()?.len() as usize;
    if len == 0 {
        return Err(ShmError::not_ready(name, "object not sized yet"));
    }

    // SAFETY: segments are never resized after creation.
    let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
    Ok(mmap)
}

/// Remove `object` from the namespace. Existing mappings stay valid.
pub fn unlink_segment(object: &str, name: &str) -> ShmResult<()> {
    shm_unlink(object).map_err(|errno| match errno {
        Errno::ENOENT => ShmError::NotFound {
            name: name.to_string(),
        },
        other => ShmError::from(other),
    })
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // 0 and negative pids address process groups, not a process.
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(Errno::EPERM) => true, // exists, owned by someone else
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
