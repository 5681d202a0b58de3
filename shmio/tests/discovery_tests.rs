//! Discovery and orphan reclamation
//!
//! Each test works in its own namespace so concurrent tests never see each
//! other's segments.

mod support;

use shmio::platform::{MemoryConfig, create_segment_mmap, object_name};
use shmio::{
    DataType, Keyword, SegmentCleanup, SegmentDiscovery, ShmResult, SharedMemory,
};
use std::process::Command;
use std::time::Duration;
use support::{Unlink, unique_namespace};

/// Set when this binary is re-launched to play a producer that dies.
const ORPHAN_NAMESPACE_ENV: &str = "SHMIO_TEST_ORPHAN_NAMESPACE";

#[test]
fn test_list_and_find_segments() -> ShmResult<()> {
    let namespace = unique_namespace("list");
    let first = Unlink::in_namespace(&namespace, "first");
    let second = Unlink::in_namespace(&namespace, "second");
    let config = first.config();

    let keywords = [
        Keyword::long("WIDTH", 4, "")?,
        Keyword::long("HEIGHT", 2, "")?,
    ];
    let mut a = SharedMemory::create_with_config("first", 8, DataType::Int32, &keywords, &config)?;
    let _b = SharedMemory::create_with_config("second", 3, DataType::Double, &[], &second.config())?;
    a.push_data_to_storage();

    let discovery = SegmentDiscovery::with_namespace(&namespace);
    let mut segments = discovery.list_segments()?;
    segments.sort_by(|x, y| x.name.cmp(&y.name));
    assert_eq!(segments.len(), 2);

    let info = &segments[0];
    assert_eq!(info.name, "first");
    assert_eq!(info.size, 32);
    assert_eq!(info.data_type, DataType::Int32);
    assert_eq!(info.shape, vec![2, 4]);
    assert_eq!(info.keyword_count, 2);
    assert_eq!(info.version, 1);
    assert_eq!(info.writer_pid, std::process::id());
    assert!(info.writer_alive);
    assert_eq!(info.attach_count, 1);
    assert_eq!(segments[1].name, "second");

    let found = discovery.find_segment("second")?.expect("second is live");
    assert_eq!(found.size, 24);
    assert!(discovery.find_segment("third")?.is_none());
    Ok(())
}

#[test]
fn test_invalid_objects_are_skipped() -> ShmResult<()> {
    let namespace = unique_namespace("skip");
    let good = Unlink::in_namespace(&namespace, "good");
    let _junk = Unlink::in_namespace(&namespace, "junk");

    let _segment = SharedMemory::create_with_config("good", 4, DataType::Uint8, &[], &good.config())?;
    let object = object_name(&namespace, "junk")?;
    let mut raw = create_segment_mmap(&object, "junk", 4096, &MemoryConfig { populate: false })?;
    raw.fill(0x5A);

    let names: Vec<String> = SegmentDiscovery::with_namespace(&namespace)
        .list_segments()?
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(names, vec!["good".to_string()]);
    Ok(())
}

#[test]
fn test_live_writer_is_not_reclaimed() -> ShmResult<()> {
    let namespace = unique_namespace("live");
    let guard = Unlink::in_namespace(&namespace, "live");
    let _segment = SharedMemory::create_with_config("live", 4, DataType::Uint8, &[], &guard.config())?;

    let cleanup =
        SegmentCleanup::with_discovery(SegmentDiscovery::with_namespace(&namespace), Duration::ZERO);
    assert!(cleanup.cleanup_orphaned_segments()?.is_empty());
    assert!(SharedMemory::open_with_config("live", &guard.config()).is_ok());
    Ok(())
}

/// Producer half of `test_dead_writer_is_reclaimed`; a no-op in a normal run.
#[test]
fn orphan_producer() -> ShmResult<()> {
    let Ok(namespace) = std::env::var(ORPHAN_NAMESPACE_ENV) else {
        return Ok(());
    };
    let config = shmio::ShmConfig::with_namespace(namespace);
    let mut shm = SharedMemory::create_with_config("orphan", 16, DataType::Uint8, &[], &config)?;
    shm.push_data_to_storage();
    // Exits without unlinking, like a crashed producer.
    Ok(())
}

#[test]
fn test_dead_writer_is_reclaimed() -> ShmResult<()> {
    let namespace = unique_namespace("dead");
    let _guard = Unlink::in_namespace(&namespace, "orphan");

    let status = Command::new(std::env::current_exe()?)
        .args(["orphan_producer", "--exact", "--test-threads=1"])
        .env(ORPHAN_NAMESPACE_ENV, &namespace)
        .status()?;
    assert!(status.success());

    let discovery = SegmentDiscovery::with_namespace(&namespace);
    let info = discovery.find_segment("orphan")?.expect("child left its segment behind");
    assert!(!info.writer_alive);
    assert_ne!(info.writer_pid, std::process::id());
    assert_eq!(info.version, 1);

    // Still inside a generous grace period.
    let patient = SegmentCleanup::with_discovery(discovery.clone(), Duration::from_secs(3600));
    assert!(patient.cleanup_orphaned_segments()?.is_empty());

    let eager = SegmentCleanup::with_discovery(discovery.clone(), Duration::ZERO);
    assert_eq!(eager.cleanup_orphaned_segments()?, vec!["orphan".to_string()]);
    assert!(discovery.find_segment("orphan")?.is_none());
    Ok(())
}
