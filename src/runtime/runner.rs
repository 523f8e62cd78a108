//! Call-site replacement for a routine: split, fingerprint, look up or build a
//! specialization, run it, and fall back to the original when that fails.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fastpath_ast::{AnnotatedTemplate, Node, RegionId, Value};
use thiserror::Error;

use super::builder::SpecializationBuilder;
use super::introspection::IntrospectionSnapshot;
use super::scope::Scope;
use super::verify::{MismatchLog, outcomes_agree};
use crate::cache::{CacheStats, EntrySnapshot, Fingerprint, SpecializationCache};
use crate::config::{FailurePolicy, RunnerConfig};
use crate::conversion::{ConversionRoutine, TemplateSource};
use crate::errors::{
    CacheError, ExecError, FingerprintError, RefreshError, SpecializationBuildError, TemplateError,
    VerificationMismatchError,
};
use crate::generation::{CompiledRoutine, Generation, GenerationId, Generator, compile_routine};
use crate::inputs::{ArgumentSplit, StableInputs};

/// Why a call did not get a specialization for its own stable inputs.
#[derive(Debug, Clone, Error)]
pub enum FallbackReason {
    #[error(transparent)]
    Fingerprint(FingerprintError),
    #[error(transparent)]
    Build(Arc<SpecializationBuildError>),
    #[error("timed out after {0:?} waiting for a specialization build")]
    Timeout(Duration),
}

impl From<CacheError> for FallbackReason {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Build(err) => FallbackReason::Build(err),
            CacheError::Timeout { waited, .. } => FallbackReason::Timeout(waited),
        }
    }
}

/// Which routine produced a call's result.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Specialized(GenerationId),
    /// An older generation served under [`FailurePolicy::ServeLastGood`].
    LastGood {
        generation: GenerationId,
        reason: FallbackReason,
    },
    Original(FallbackReason),
}

impl Dispatch {
    pub fn generation(&self) -> Option<GenerationId> {
        match self {
            Dispatch::Specialized(generation) | Dispatch::LastGood { generation, .. } => Some(*generation),
            Dispatch::Original(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self, Dispatch::Specialized(_))
    }
}

#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub value: Value,
    pub dispatch: Dispatch,
    /// Set when verification ran and the original disagreed.
    pub mismatch: Option<VerificationMismatchError>,
}

/// Runs a routine through its specializations.
///
/// Owns its cache; two runners never share generations. Safe to call from
/// many threads at once.
pub struct SpecializedRunner<B: SpecializationBuilder> {
    name: String,
    builder: B,
    config: RunnerConfig,
    split: ArgumentSplit,
    generator: Generator,
    original: CompiledRoutine,
    cache: SpecializationCache,
    verify: AtomicBool,
    mismatches: MismatchLog,
}

impl<B: SpecializationBuilder> SpecializedRunner<B> {
    /// Runner with default configuration, adjusted by the builder.
    pub fn new(
        template: impl Into<Arc<AnnotatedTemplate>>,
        builder: B,
        scope: impl Into<Arc<Scope>>,
    ) -> Result<Self, TemplateError> {
        Self::with_config(template, builder, scope, RunnerConfig::default())
    }

    /// Validates the template, builds its conversion routine and compiles the
    /// original routine. Nothing is specialized until the first call.
    pub fn with_config(
        template: impl Into<Arc<AnnotatedTemplate>>,
        builder: B,
        scope: impl Into<Arc<Scope>>,
        mut config: RunnerConfig,
    ) -> Result<Self, TemplateError> {
        let template = template.into();
        let scope = scope.into();
        builder.configure(&mut config);

        let stable = builder.stable_params();
        let conversion = ConversionRoutine::build(Arc::clone(&template), &stable)?;
        let original =
            compile_routine(&template.name, &template.params, &template.body, &scope).map_err(|source| {
                TemplateError::Original {
                    template: template.name.clone(),
                    source,
                }
            })?;

        let name = template.name.clone();
        let split = conversion.split().clone();
        let verify = config.verify || builder.verification_enabled();
        let cache = SpecializationCache::new(name.clone(), config.cache_options());

        tracing::debug!(
            routine = %name,
            stable = ?split.stable_names(),
            retention = %config.retention,
            failure_policy = %config.failure_policy,
            verify,
            "runner ready"
        );

        Ok(Self {
            generator: Generator::new(Arc::new(conversion), scope, name.clone()),
            name,
            builder,
            config,
            split,
            original,
            cache,
            verify: AtomicBool::new(verify),
            mismatches: MismatchLog::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, ExecError> {
        self.call_with_outcome(args).map(|outcome| outcome.value)
    }

    /// Like [`SpecializedRunner::call`], also reporting how the call was
    /// served. Errors are those of whichever routine ran; specialization
    /// failures never surface here.
    pub fn call_with_outcome(&self, args: &[Value]) -> Result<CallOutcome, ExecError> {
        let (stable, volatile) = self.split.split(args)?;

        let (generation, dispatch) = match self.specialization(&stable) {
            Ok(generation) => {
                let dispatch = Dispatch::Specialized(generation.id);
                (generation, dispatch)
            }
            Err(reason) => match self.fallback(reason) {
                Ok(served) => served,
                Err(reason) => {
                    let value = self.original.call(args)?;
                    return Ok(CallOutcome {
                        value,
                        dispatch: Dispatch::Original(reason),
                        mismatch: None,
                    });
                }
            },
        };

        let specialized = generation.call(&volatile);
        let mismatch = if self.verification_enabled() {
            self.verify_call(&generation, args, &specialized)
        } else {
            None
        };

        Ok(CallOutcome {
            value: specialized?,
            dispatch,
            mismatch,
        })
    }

    fn specialization(&self, stable: &StableInputs) -> Result<Arc<Generation>, FallbackReason> {
        let fingerprint = self
            .builder
            .fingerprint(stable)
            .map_err(FallbackReason::Fingerprint)?;
        let force = self.builder.force_rebuild(stable);
        Ok(self
            .cache
            .get_or_build(&fingerprint, force, |id| self.build(&fingerprint, stable, id))?)
    }

    fn build(
        &self,
        fingerprint: &Fingerprint,
        stable: &StableInputs,
        id: GenerationId,
    ) -> Result<Generation, SpecializationBuildError> {
        let templates = BuilderTemplates(&self.builder);
        let generation = self.generator.generate_with(fingerprint, stable, id, &templates)?;
        self.builder.on_generated(&generation);
        Ok(generation)
    }

    /// Pick what to run instead; `Err` means the original routine.
    fn fallback(&self, reason: FallbackReason) -> Result<(Arc<Generation>, Dispatch), FallbackReason> {
        if self.config.failure_policy == FailurePolicy::ServeLastGood {
            if let Some(generation) = self.cache.latest_ready() {
                self.cache.mark_current(&generation);
                tracing::warn!(
                    routine = %self.name,
                    generation = %generation.id,
                    %reason,
                    "specialization unavailable, serving last good generation"
                );
                let dispatch = Dispatch::LastGood {
                    generation: generation.id,
                    reason,
                };
                return Ok((generation, dispatch));
            }
        }
        tracing::warn!(routine = %self.name, %reason, "specialization unavailable, running original");
        Err(reason)
    }

    fn verify_call(
        &self,
        generation: &Generation,
        args: &[Value],
        specialized: &Result<Value, ExecError>,
    ) -> Option<VerificationMismatchError> {
        let original = self.original.call(args);
        if outcomes_agree(specialized, &original) {
            return None;
        }

        let mismatch = VerificationMismatchError {
            routine: self.name.clone(),
            generation: generation.id,
            fingerprint: generation.fingerprint.clone(),
            args: args.to_vec(),
            specialized: specialized.clone(),
            original,
        };
        tracing::warn!(routine = %self.name, generation = %generation.id, %mismatch, "verification mismatch");
        self.builder.on_mismatch(&mismatch);
        self.mismatches.record(mismatch.clone());
        Some(mismatch)
    }

    pub fn set_verification(&self, enabled: bool) {
        self.verify.store(enabled, Ordering::Relaxed);
    }

    pub fn verification_enabled(&self) -> bool {
        self.verify.load(Ordering::Relaxed)
    }

    /// Drain the mismatches recorded so far, oldest first.
    pub fn take_mismatches(&self) -> Vec<VerificationMismatchError> {
        self.mismatches.take()
    }

    pub fn mismatch_count(&self) -> u64 {
        self.mismatches.total()
    }

    /// Forget every cached generation; the next call rebuilds.
    pub fn reset(&self) {
        self.cache.reset();
        tracing::info!(routine = %self.name, "specializations reset");
    }

    /// Rebuild now for the stable part of `args`, even if a generation for
    /// it is already cached.
    pub fn refresh(&self, args: &[Value]) -> Result<GenerationId, RefreshError> {
        let (stable, _) = self.split.split(args)?;
        let fingerprint = self.builder.fingerprint(&stable)?;
        let generation = self
            .cache
            .get_or_build(&fingerprint, true, |id| self.build(&fingerprint, &stable, id))?;
        Ok(generation.id)
    }

    /// Run the unmodified routine directly.
    pub fn call_original(&self, args: &[Value]) -> Result<Value, ExecError> {
        self.original.call(args)
    }

    pub fn conversion(&self) -> &Arc<ConversionRoutine> {
        self.generator.conversion()
    }

    pub fn conversion_source(&self) -> &str {
        self.generator.conversion().source_text()
    }

    /// Generation most recently built or served; follows the stable inputs
    /// back to older cached generations.
    pub fn current_generation(&self) -> Option<Arc<Generation>> {
        self.cache.current()
    }

    pub fn current_source(&self) -> Option<String> {
        self.current_generation()
            .map(|generation| generation.source.text.clone())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_entries(&self) -> Vec<EntrySnapshot> {
        self.cache.entries()
    }

    pub fn snapshot(&self) -> IntrospectionSnapshot {
        IntrospectionSnapshot::capture(self)
    }
}

/// Routes template regions to the runner's builder.
struct BuilderTemplates<'b, B>(&'b B);

impl<B: SpecializationBuilder> TemplateSource for BuilderTemplates<'_, B> {
    fn region_body(&self, region: RegionId, label: Option<&str>, stable: &StableInputs) -> Option<Vec<Node>> {
        self.0.template(region, label, stable)
    }
}

impl<B: SpecializationBuilder> fmt::Debug for SpecializedRunner<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecializedRunner")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("verify", &self.verification_enabled())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
