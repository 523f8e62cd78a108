//! The extension point through which users plug policy into a runner.

use parking_lot::Mutex;
use fastpath_ast::{Node, RegionId};
use serde::{Deserialize, Serialize};

use crate::cache::{Fingerprint, Retention};
use crate::config::{FailurePolicy, RunnerConfig};
use crate::errors::{FingerprintError, VerificationMismatchError};
use crate::generation::Generation;
use crate::inputs::StableInputs;

/// Policy supplied by the owner of a specialized routine.
///
/// The runner treats every method as a query: implementations may keep
/// their own state but never reach into the runner or its cache.
pub trait SpecializationBuilder: Send + Sync {
    /// Parameters whose values are baked into specializations. Everything
    /// else is volatile and passed through on each call.
    fn stable_params(&self) -> Vec<String>;

    /// Cache key for `stable`. Must be deterministic, and equal fingerprints
    /// must imply the same specialized source.
    fn fingerprint(&self, stable: &StableInputs) -> Result<Fingerprint, FingerprintError>;

    /// Rebuild even though a ready generation exists for the fingerprint.
    fn force_rebuild(&self, _stable: &StableInputs) -> bool {
        false
    }

    /// Initial verification setting; the runner can toggle it later.
    fn verification_enabled(&self) -> bool {
        false
    }

    /// Body for a region under an `Action::Template` directive, or `None` to
    /// keep the region's own. Must depend only on `region`, `label` and
    /// `stable`, since the result is cached under the fingerprint.
    fn template(&self, _region: RegionId, _label: Option<&str>, _stable: &StableInputs) -> Option<Vec<Node>> {
        None
    }

    /// Adjust the runner configuration before the runner is built.
    fn configure(&self, _config: &mut RunnerConfig) {}

    /// Called once per successful build, before the generation is published.
    fn on_generated(&self, _generation: &Generation) {}

    fn on_mismatch(&self, _mismatch: &VerificationMismatchError) {}
}

/// How [`SimpleBuilder`] decides that stable inputs changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalculationMode {
    /// Hash the stable values.
    #[default]
    Hash,
    /// Compare the stable values themselves.
    Compare,
    /// Never; rebuild only on an explicit refresh or reset.
    Manual,
}

/// Ready-made builder covering the common cases.
#[derive(Debug, Default)]
pub struct SimpleBuilder {
    stable: Vec<String>,
    mode: RecalculationMode,
    verify: bool,
    retention: Option<Retention>,
    failure_policy: Option<FailurePolicy>,
    last_source: Mutex<Option<String>>,
}

impl SimpleBuilder {
    pub fn new<S: Into<String>>(stable: impl IntoIterator<Item = S>) -> Self {
        Self {
            stable: stable.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: RecalculationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn retention(mut self, retention: Retention) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn recalculation_mode(&self) -> RecalculationMode {
        self.mode
    }

    /// Source text of the most recent generation this builder saw.
    pub fn last_source(&self) -> Option<String> {
        self.last_source.lock().clone()
    }
}

impl SpecializationBuilder for SimpleBuilder {
    fn stable_params(&self) -> Vec<String> {
        self.stable.clone()
    }

    fn fingerprint(&self, stable: &StableInputs) -> Result<Fingerprint, FingerprintError> {
        Ok(match self.mode {
            RecalculationMode::Hash => Fingerprint::hashed(stable.values()),
            RecalculationMode::Compare => Fingerprint::of_values(stable.values()),
            RecalculationMode::Manual => Fingerprint::constant(),
        })
    }

    fn verification_enabled(&self) -> bool {
        self.verify
    }

    fn configure(&self, config: &mut RunnerConfig) {
        if let Some(retention) = self.retention {
            config.retention = retention;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
    }

    fn on_generated(&self, generation: &Generation) {
        *self.last_source.lock() = Some(generation.source.text.clone());
    }
}
