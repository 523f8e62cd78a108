use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::eviction::{EvictionPolicy, Retention};
use super::flight::{Flight, FlightResult};
use super::metadata::{EntryMetadata, MetadataSnapshot};
use super::metrics::{CacheMetrics, CacheStats};
use super::Fingerprint;
use crate::errors::{BuildFailure, CacheError, SpecializationBuildError};
use crate::generation::{Generation, GenerationId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub retention: Retention,
    /// How long a caller waits for somebody else's build. `None` waits forever.
    pub build_timeout: Option<Duration>,
    /// Rebuild fingerprints whose last build failed instead of replaying the error.
    pub retry_failed: bool,
    pub max_failed_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            retention: Retention::Current,
            build_timeout: None,
            retry_failed: false,
            max_failed_entries: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "generation")]
pub enum BuildState {
    Building,
    Ready(GenerationId),
    Failed,
}

/// Introspection view of one resident entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub fingerprint: String,
    pub state: BuildState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum Slot {
    Ready {
        generation: Arc<Generation>,
        metadata: EntryMetadata,
    },
    Failed(Arc<SpecializationBuildError>),
}

#[derive(Default)]
struct Entries {
    slots: HashMap<Fingerprint, Slot>,
    flights: HashMap<Fingerprint, Arc<Flight>>,
    failed_order: VecDeque<Fingerprint>,
    latest: Option<Arc<Generation>>,
}

enum Role {
    Lead(Arc<Flight>),
    Wait(Arc<Flight>),
}

/// Fingerprint → generation map with single-flight builds.
///
/// Hits take a shared lock only. Builds run outside every lock; the caller
/// that starts a build publishes it under a short exclusive lock, and callers
/// asking for the same fingerprint meanwhile wait on that build instead of
/// starting their own.
pub struct SpecializationCache {
    name: String,
    options: CacheOptions,
    entries: RwLock<Entries>,
    /// Generation most recently handed out.
    current: Mutex<Option<Arc<Generation>>>,
    eviction: Mutex<Box<dyn EvictionPolicy>>,
    next_id: AtomicU64,
    metrics: CacheMetrics,
}

impl SpecializationCache {
    pub fn new(name: impl Into<String>, options: CacheOptions) -> Self {
        Self {
            name: name.into(),
            eviction: Mutex::new(options.retention.policy()),
            options,
            entries: RwLock::new(Entries::default()),
            current: Mutex::new(None),
            next_id: AtomicU64::new(0),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Return the ready generation for `fingerprint`, building it with `build`
    /// when there is none. With `force`, a new build starts even when a ready
    /// generation exists; other callers keep getting the old one until the
    /// new one is published.
    pub fn get_or_build<F>(&self, fingerprint: &Fingerprint, force: bool, build: F) -> Result<Arc<Generation>, CacheError>
    where
        F: FnOnce(GenerationId) -> Result<Generation, SpecializationBuildError>,
    {
        if !force {
            if let Some(resolved) = self.lookup(fingerprint) {
                return resolved;
            }
        }

        let role = {
            let mut entries = self.entries.write();
            if !force {
                if let Some(resolved) = self.resident(&entries, fingerprint) {
                    return resolved;
                }
            }
            match entries.flights.get(fingerprint) {
                Some(flight) => Role::Wait(Arc::clone(flight)),
                None => {
                    let flight = Flight::new();
                    entries.flights.insert(fingerprint.clone(), Arc::clone(&flight));
                    Role::Lead(flight)
                }
            }
        };
        self.metrics.record_miss();

        match role {
            Role::Lead(flight) => self.lead(fingerprint, &flight, build),
            Role::Wait(flight) => self.wait(fingerprint, &flight),
        }
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<Result<Arc<Generation>, CacheError>> {
        let entries = self.entries.read();
        let resolved = self.resident(&entries, fingerprint)?;
        drop(entries);
        if self.options.retention.tracks_access() {
            self.eviction.lock().on_access(fingerprint);
        }
        Some(resolved)
    }

    fn resident(&self, entries: &Entries, fingerprint: &Fingerprint) -> Option<Result<Arc<Generation>, CacheError>> {
        match entries.slots.get(fingerprint)? {
            Slot::Ready {
                generation,
                metadata,
            } => {
                metadata.record_access();
                self.mark_current(generation);
                self.metrics.record_hit();
                tracing::trace!(cache = %self.name, %fingerprint, generation = %generation.id, "cache hit");
                Some(Ok(Arc::clone(generation)))
            }
            Slot::Failed(error) if !self.options.retry_failed => {
                self.metrics.record_hit();
                Some(Err(CacheError::Build(Arc::clone(error))))
            }
            Slot::Failed(_) => None,
        }
    }

    fn wait(&self, fingerprint: &Fingerprint, flight: &Flight) -> FlightResult {
        self.metrics.record_wait();
        tracing::debug!(cache = %self.name, %fingerprint, "waiting for in-flight build");
        let started = Instant::now();
        flight.wait(self.options.build_timeout).unwrap_or_else(|| {
            self.metrics.record_timeout();
            let waited = started.elapsed();
            tracing::warn!(cache = %self.name, %fingerprint, ?waited, "gave up waiting for build");
            Err(CacheError::Timeout {
                fingerprint: fingerprint.clone(),
                waited,
            })
        })
    }

    fn lead<F>(&self, fingerprint: &Fingerprint, flight: &Flight, build: F) -> FlightResult
    where
        F: FnOnce(GenerationId) -> Result<Generation, SpecializationBuildError>,
    {
        let id = GenerationId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.metrics.record_build();
        tracing::debug!(cache = %self.name, %fingerprint, generation = %id, "building");

        let outcome = catch_unwind(AssertUnwindSafe(|| build(id))).unwrap_or_else(|payload| {
            Err(SpecializationBuildError {
                routine: self.name.clone(),
                fingerprint: fingerprint.clone(),
                source_text: None,
                cause: BuildFailure::Panicked(panic_message(payload.as_ref())),
            })
        });

        let result = match outcome {
            Ok(generation) => Ok(self.publish(fingerprint, Arc::new(generation))),
            Err(error) => Err(self.record_failure(fingerprint, error)),
        };
        flight.resolve(result.clone());
        result
    }

    /// Install a freshly built generation and make it the current one.
    fn publish(&self, fingerprint: &Fingerprint, generation: Arc<Generation>) -> Arc<Generation> {
        let mut entries = self.entries.write();
        // One flight per fingerprint at a time, so any resident generation for
        // it was built earlier and is replaced.
        entries.flights.remove(fingerprint);

        let metadata = EntryMetadata::new(generation.metadata.created_at, generation.metadata.build_time);
        let replaced = entries.slots.insert(
            fingerprint.clone(),
            Slot::Ready {
                generation: Arc::clone(&generation),
                metadata,
            },
        );
        if matches!(replaced, Some(Slot::Failed(_))) {
            entries.failed_order.retain(|failed| failed != fingerprint);
        }
        if entries.latest.as_ref().is_none_or(|latest| latest.id < generation.id) {
            entries.latest = Some(Arc::clone(&generation));
        }
        self.mark_current(&generation);

        let mut eviction = self.eviction.lock();
        eviction.on_insert(fingerprint);
        let mut evicted = 0;
        for victim in eviction.evict() {
            if &victim == fingerprint {
                continue;
            }
            if let Some(Slot::Ready { .. }) = entries.slots.get(&victim) {
                entries.slots.remove(&victim);
                evicted += 1;
            }
        }
        drop(eviction);
        drop(entries);

        self.metrics.record_evictions(evicted);
        tracing::debug!(cache = %self.name, %fingerprint, generation = %generation.id, evicted, "published");
        generation
    }

    fn record_failure(&self, fingerprint: &Fingerprint, error: SpecializationBuildError) -> CacheError {
        self.metrics.record_failure();
        tracing::warn!(cache = %self.name, %fingerprint, %error, "specialization build failed");
        let error = Arc::new(error);

        let mut entries = self.entries.write();
        entries.flights.remove(fingerprint);
        // A failed rebuild never displaces a working generation.
        if !matches!(entries.slots.get(fingerprint), Some(Slot::Ready { .. })) {
            entries.slots.insert(fingerprint.clone(), Slot::Failed(Arc::clone(&error)));
            entries.failed_order.retain(|failed| failed != fingerprint);
            entries.failed_order.push_back(fingerprint.clone());
            while entries.failed_order.len() > self.options.max_failed_entries {
                let Some(oldest) = entries.failed_order.pop_front() else {
                    break;
                };
                if matches!(entries.slots.get(&oldest), Some(Slot::Failed(_))) {
                    entries.slots.remove(&oldest);
                }
            }
        }
        CacheError::Build(error)
    }

    /// Newest generation ever published, even if since evicted.
    pub fn latest_ready(&self) -> Option<Arc<Generation>> {
        self.entries.read().latest.clone()
    }

    /// Generation most recently returned by a hit or a publish, or marked
    /// with [`SpecializationCache::mark_current`]. Unlike
    /// [`SpecializationCache::latest_ready`] this follows the stable inputs
    /// back to older resident generations.
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.lock().clone()
    }

    /// Record that `generation` is what calls are being served with.
    pub fn mark_current(&self, generation: &Arc<Generation>) {
        let mut current = self.current.lock();
        if current.as_ref().is_none_or(|served| !Arc::ptr_eq(served, generation)) {
            *current = Some(Arc::clone(generation));
        }
    }

    pub fn state(&self, fingerprint: &Fingerprint) -> Option<BuildState> {
        let entries = self.entries.read();
        match entries.slots.get(fingerprint) {
            Some(Slot::Ready { generation, .. }) => Some(BuildState::Ready(generation.id)),
            _ if entries.flights.contains_key(fingerprint) => Some(BuildState::Building),
            Some(Slot::Failed(_)) => Some(BuildState::Failed),
            None => None,
        }
    }

    /// Forget every resident generation and cached failure. Builds already in
    /// flight still finish and wake their waiters.
    pub fn reset(&self) {
        let mut entries = self.entries.write();
        entries.slots.clear();
        entries.failed_order.clear();
        entries.latest = None;
        *self.current.lock() = None;
        self.eviction.lock().clear();
        tracing::debug!(cache = %self.name, "reset");
    }

    pub fn stats(&self) -> CacheStats {
        let resident = self.entries.read().slots.len();
        self.metrics.snapshot(resident)
    }

    /// Resident entries and builds in flight, sorted by fingerprint text.
    pub fn entries(&self) -> Vec<EntrySnapshot> {
        let entries = self.entries.read();
        let mut snapshots: Vec<EntrySnapshot> = entries
            .slots
            .iter()
            .map(|(fingerprint, slot)| match slot {
                Slot::Ready {
                    generation,
                    metadata,
                } => EntrySnapshot {
                    fingerprint: fingerprint.to_string(),
                    state: BuildState::Ready(generation.id),
                    metadata: Some(metadata.snapshot()),
                    error: None,
                },
                Slot::Failed(error) => EntrySnapshot {
                    fingerprint: fingerprint.to_string(),
                    state: BuildState::Failed,
                    metadata: None,
                    error: Some(error.to_string()),
                },
            })
            .collect();
        snapshots.extend(
            entries
                .flights
                .keys()
                .filter(|fingerprint| !entries.slots.contains_key(*fingerprint))
                .map(|fingerprint| EntrySnapshot {
                    fingerprint: fingerprint.to_string(),
                    state: BuildState::Building,
                    metadata: None,
                    error: None,
                }),
        );
        snapshots.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        snapshots
    }
}

impl std::fmt::Debug for SpecializationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecializationCache")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
