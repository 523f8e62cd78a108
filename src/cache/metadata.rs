use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Bookkeeping for one resident generation. Updated from the read path, so
/// the mutable parts are atomics or behind their own lock.
#[derive(Debug)]
pub struct EntryMetadata {
    created_at: DateTime<Utc>,
    build_time: Duration,
    last_accessed: Mutex<DateTime<Utc>>,
    access_count: AtomicU64,
}

impl EntryMetadata {
    pub fn new(created_at: DateTime<Utc>, build_time: Duration) -> Self {
        Self {
            created_at,
            build_time,
            last_accessed: Mutex::new(created_at),
            access_count: AtomicU64::new(0),
        }
    }

    pub fn record_access(&self) {
        *self.last_accessed.lock() = Utc::now();
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            created_at: self.created_at,
            last_accessed: *self.last_accessed.lock(),
            access_count: self.access_count.load(Ordering::Relaxed),
            build_time_us: u64::try_from(self.build_time.as_micros()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub build_time_us: u64,
}
