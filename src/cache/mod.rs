//! Specialization cache: fingerprints, single-flight builds, retention.

pub mod eviction;
mod fingerprint;
mod flight;
pub mod metadata;
pub mod metrics;
mod specialization_cache;

pub use eviction::{EvictionPolicy, LruEvictionPolicy, Retention};
pub use fingerprint::Fingerprint;
pub use metadata::MetadataSnapshot;
pub use metrics::CacheStats;
pub use specialization_cache::{BuildState, CacheOptions, EntrySnapshot, SpecializationCache};
