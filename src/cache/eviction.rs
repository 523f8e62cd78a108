use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Fingerprint;

/// How many superseded generations a cache keeps resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "count")]
pub enum Retention {
    /// Only the most recently published generation.
    #[default]
    Current,
    /// The `n` most recently used generations.
    MostRecent(usize),
    Unbounded,
}

impl Retention {
    pub fn capacity(self) -> Option<usize> {
        match self {
            Retention::Current => Some(1),
            Retention::MostRecent(count) => Some(count.max(1)),
            Retention::Unbounded => None,
        }
    }

    /// Whether hits change which entry is evicted next.
    pub fn tracks_access(self) -> bool {
        matches!(self.capacity(), Some(capacity) if capacity > 1)
    }

    pub fn policy(self) -> Box<dyn EvictionPolicy> {
        Box::new(LruEvictionPolicy::new(self.capacity()))
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Current => f.write_str("current"),
            Retention::MostRecent(count) => write!(f, "recent:{count}"),
            Retention::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl FromStr for Retention {
    type Err = String;

    /// Accepts `current`, `unbounded`, or `recent:<n>`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Retention::Current),
            "unbounded" | "all" => Ok(Retention::Unbounded),
            other => other
                .strip_prefix("recent:")
                .and_then(|count| count.parse().ok())
                .map(Retention::MostRecent)
                .ok_or_else(|| format!("unknown retention `{text}`")),
        }
    }
}

/// Decides which ready generations leave the cache.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn on_access(&mut self, key: &Fingerprint);

    fn on_insert(&mut self, key: &Fingerprint);

    /// Keys that must leave now, least valuable first.
    fn evict(&mut self) -> Vec<Fingerprint>;

    fn clear(&mut self);
}

/// Least-recently-used order over resident fingerprints, bounded by an
/// optional capacity.
#[derive(Debug)]
pub struct LruEvictionPolicy {
    capacity: Option<usize>,
    order: VecDeque<Fingerprint>,
}

impl LruEvictionPolicy {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
        }
    }

    fn touch(&mut self, key: &Fingerprint) -> bool {
        match self.order.iter().position(|resident| resident == key) {
            Some(position) => {
                if let Some(found) = self.order.remove(position) {
                    self.order.push_back(found);
                }
                true
            }
            None => false,
        }
    }
}

impl EvictionPolicy for LruEvictionPolicy {
    fn on_access(&mut self, key: &Fingerprint) {
        // Hits racing with an eviction may name a key that is already gone.
        self.touch(key);
    }

    fn on_insert(&mut self, key: &Fingerprint) {
        if !self.touch(key) {
            self.order.push_back(key.clone());
        }
    }

    fn evict(&mut self) -> Vec<Fingerprint> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };
        let excess = self.order.len().saturating_sub(capacity);
        self.order.drain(..excess).collect()
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}
