//! Helpers shared by the integration tests.

#![allow(dead_code)]

use shmio::{ShmConfig, SharedMemory};
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Segment name unique to this process and call.
pub fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("it_{tag}_{}_{n}", std::process::id())
}

/// Namespace unique to this process and call.
pub fn unique_namespace(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("shmiot{tag}{}n{n}", std::process::id())
}

/// Unlinks the segment when the test ends, pass or fail.
pub struct Unlink {
    namespace: String,
    name: String,
}

impl Unlink {
    pub fn new(name: &str) -> Self {
        Self::in_namespace(common::consts::DEFAULT_NAMESPACE, name)
    }

    pub fn in_namespace(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn config(&self) -> ShmConfig {
        ShmConfig::with_namespace(self.namespace.clone())
    }
}

impl Drop for Unlink {
    fn drop(&mut self) {
        let _ = SharedMemory::unlink_in(&self.namespace, &self.name);
    }
}
