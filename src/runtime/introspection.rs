//! Read-only, serializable view of a runner for logging and review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builder::SpecializationBuilder;
use super::runner::SpecializedRunner;
use crate::cache::{CacheStats, EntrySnapshot, Retention};
use crate::config::FailurePolicy;
use crate::generation::{Generation, GenerationId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub id: GenerationId,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub build_time_us: u64,
    pub source: String,
}

impl From<&Generation> for GenerationSummary {
    fn from(generation: &Generation) -> Self {
        Self {
            id: generation.id,
            fingerprint: generation.fingerprint.to_string(),
            created_at: generation.metadata.created_at,
            build_time_us: u64::try_from(generation.metadata.build_time.as_micros()).unwrap_or(u64::MAX),
            source: generation.source.text.clone(),
        }
    }
}

/// Runner snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionSnapshot {
    pub routine: String,
    pub stable_params: Vec<String>,
    pub volatile_params: Vec<String>,
    pub verification: bool,
    pub retention: Retention,
    pub failure_policy: FailurePolicy,
    pub current_generation: Option<GenerationSummary>,
    pub conversion_source: String,
    pub stats: CacheStats,
    pub entries: Vec<EntrySnapshot>,
    pub mismatch_count: u64,
    pub captured_at: DateTime<Utc>,
}

impl IntrospectionSnapshot {
    pub fn capture<B: SpecializationBuilder>(runner: &SpecializedRunner<B>) -> Self {
        let conversion = runner.conversion();
        Self {
            routine: runner.name().to_string(),
            stable_params: conversion.stable_params().to_vec(),
            volatile_params: conversion.volatile_params().to_vec(),
            verification: runner.verification_enabled(),
            retention: runner.config().retention,
            failure_policy: runner.config().failure_policy,
            current_generation: runner
                .current_generation()
                .map(|generation| GenerationSummary::from(generation.as_ref())),
            conversion_source: runner.conversion_source().to_string(),
            stats: runner.cache_stats(),
            entries: runner.cache_entries(),
            mismatch_count: runner.mismatch_count(),
            captured_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use fastpath_ast::build::*;
    use fastpath_ast::{Action, AnnotatedTemplate, Value};

    use crate::runtime::builder::SimpleBuilder;
    use crate::runtime::scope::Scope;

    use super::*;

    #[test]
    fn snapshot_exports_sources_as_json() {
        let template = AnnotatedTemplate::new(
            "double",
            ["k", "x"],
            vec![region(1, vec![ret(mul(var("x"), var("k")))])],
        )
        .with_directive(1, Action::Verbatim);
        let runner = SpecializedRunner::new(template, SimpleBuilder::new(["k"]), Scope::new()).unwrap();

        let empty = runner.snapshot();
        assert!(empty.current_generation.is_none());
        assert_eq!(empty.stable_params, vec!["k".to_string()]);

        runner.call(&[Value::Int(2), Value::Int(4)]).unwrap();
        let snapshot = runner.snapshot();
        let current = snapshot.current_generation.as_ref().unwrap();
        assert_eq!(current.id, GenerationId(1));
        assert_eq!(current.source, "fn double(x) {\n    return (x * 2);\n}\n");
        assert_eq!(snapshot.stats.builds_started, 1);
        assert_eq!(snapshot.entries.len(), 1);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["routine"], "double");
        assert_eq!(json["current_generation"]["id"], 1);
        assert_eq!(json["retention"]["kind"], "current");
        assert!(json["conversion_source"].as_str().unwrap().starts_with("conversion double(k | x)"));
    }
}
