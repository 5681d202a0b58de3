//! Lists the segments of a namespace as JSON and reclaims orphans
//!
//! ```bash
//! cargo run --example shm_monitor -- [namespace] [grace_secs]
//! ```

use shmio::{LogLevel, SegmentCleanup, SegmentDiscovery, ShmResult, init_tracing};
use std::collections::HashSet;
use std::{thread, time::Duration};

fn main() -> ShmResult<()> {
    init_tracing(LogLevel::Info);

    let mut args = std::env::args().skip(1);
    let discovery = match args.next() {
        Some(namespace) => SegmentDiscovery::with_namespace(namespace),
        None => SegmentDiscovery::new(),
    };
    let grace = Duration::from_secs(args.next().and_then(|s| s.parse().ok()).unwrap_or(60));
    let cleanup = SegmentCleanup::with_discovery(discovery.clone(), grace);

    println!("Watching namespace '{}'", discovery.namespace());
    let mut known = HashSet::new();

    loop {
        let segments = discovery.list_segments()?;
        let current: HashSet<String> = segments.iter().map(|info| info.name.clone()).collect();

        for info in segments.iter().filter(|info| !known.contains(&info.name)) {
            println!(">>> {}", serde_json::to_string(info).unwrap_or_default());
        }
        for gone in known.difference(&current) {
            println!("<<< {gone}");
        }
        known = current;

        for name in cleanup.cleanup_orphaned_segments()? {
            println!("xxx reclaimed orphan {name}");
        }
        thread::sleep(Duration::from_millis(500));
    }
}
