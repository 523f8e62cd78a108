//! Error taxonomy of the specialization engine.
//!
//! Load-time problems (`TemplateError`) are fatal. Everything raised while
//! building a specialization is recoverable and ends in a fallback to the
//! original routine. Verification mismatches are observations, never thrown
//! into the call path.

use std::sync::Arc;
use std::time::Duration;

use fastpath_ast::{RegionId, Value};
use thiserror::Error;

use crate::cache::Fingerprint;
use crate::generation::GenerationId;

fn hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|candidate| format!(" (did you mean `{candidate}`?)"))
        .unwrap_or_default()
}

/// Malformed annotated template; aborts runner construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template `{template}` declares parameter `{name}` more than once")]
    DuplicateParam { template: String, name: String },

    #[error("stable input `{name}` is not a parameter of `{template}`{}", hint(.suggestion))]
    UnknownStableParam {
        template: String,
        name: String,
        suggestion: Option<String>,
    },

    #[error("region {region} appears more than once")]
    DuplicateRegion { region: RegionId },

    #[error("`{action}` directive references unknown region {region}")]
    UnknownRegion {
        region: RegionId,
        action: &'static str,
    },

    #[error("region {region} has conflicting directives `{first}` and `{second}`")]
    ConflictingDirectives {
        region: RegionId,
        first: &'static str,
        second: &'static str,
    },

    #[error("`{name}` in the {context} of region {region} is not a stable input{}", hint(.suggestion))]
    UnresolvedReference {
        region: RegionId,
        context: &'static str,
        name: String,
        suggestion: Option<String>,
    },

    #[error("the {context} of region {region} calls `{callee}`; stable expressions must be pure")]
    CallInStableExpression {
        region: RegionId,
        context: &'static str,
        callee: String,
    },

    #[error("`{name}` is a stable input and cannot be rebound")]
    StableAssignment { name: String },

    #[error("region {region} cannot be unrolled: {reason}")]
    InvalidUnroll {
        region: RegionId,
        reason: &'static str,
    },

    #[error("original routine `{template}` does not compile: {source}")]
    Original {
        template: String,
        #[source]
        source: CompileError,
    },
}

/// Raised while lowering a statement tree to executable closures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("undefined variable `{name}`{}", hint(.suggestion))]
    UndefinedVariable {
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown function `{name}`{}", hint(.suggestion))]
    UnknownFunction {
        name: String,
        suggestion: Option<String>,
    },

    #[error("`{name}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("`{name}` is not a local variable and cannot be pushed to")]
    PushTargetNotLocal { name: String },
}

/// Raised by a conversion routine evaluating stable-only expressions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("region {region} unrolls over a {found}, expected a list")]
    NotIterable {
        region: RegionId,
        found: &'static str,
    },

    #[error("drop condition of region {region} evaluated to a {found}, expected a bool")]
    NotBoolean {
        region: RegionId,
        found: &'static str,
    },

    #[error("evaluating the {context} of region {region}: {source}")]
    Evaluation {
        region: RegionId,
        context: &'static str,
        #[source]
        source: ExecError,
    },

    #[error("body supplied for template region {region} is invalid: {source}")]
    InvalidTemplate {
        region: RegionId,
        #[source]
        source: TemplateError,
    },
}

/// A builder's fingerprint function rejected the stable inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fingerprint failed: {message}")]
pub struct FingerprintError {
    pub message: String,
}

impl FingerprintError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildFailure {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error("build panicked: {0}")]
    Panicked(String),
}

/// A specialization could not be produced for one fingerprint.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("specializing `{routine}` for {fingerprint} failed: {cause}")]
pub struct SpecializationBuildError {
    pub routine: String,
    pub fingerprint: Fingerprint,
    /// Specialized source that failed to compile, when conversion got that far.
    pub source_text: Option<String>,
    #[source]
    pub cause: BuildFailure,
}

/// Runtime failure inside an original or specialized routine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecError {
    #[error("type mismatch in `{op}`: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in `{op}`")]
    Overflow { op: &'static str },

    #[error("index {index} out of bounds for a list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("`{routine}` expects {expected} arguments, got {found}")]
    Arity {
        routine: String,
        expected: usize,
        found: usize,
    },

    #[error("`{function}` failed: {message}")]
    Native { function: String, message: String },
}

/// The specialized and original routines disagreed on one call.
#[derive(Debug, Error, Clone, PartialEq)]
#[error(
    "`{routine}` generation {generation} diverged from the original: specialized {}, original {}",
    show(.specialized),
    show(.original)
)]
pub struct VerificationMismatchError {
    pub routine: String,
    pub generation: GenerationId,
    pub fingerprint: Fingerprint,
    pub args: Vec<Value>,
    pub specialized: Result<Value, ExecError>,
    pub original: Result<Value, ExecError>,
}

fn show(outcome: &Result<Value, ExecError>) -> String {
    match outcome {
        Ok(value) => format!("returned {value}"),
        Err(err) => format!("failed with `{err}`"),
    }
}

#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error(transparent)]
    Build(Arc<SpecializationBuildError>),

    #[error("gave up after {waited:?} waiting for the in-flight build of {fingerprint}")]
    Timeout {
        fingerprint: Fingerprint,
        waited: Duration,
    },
}

/// An explicit rebuild requested through the runner could not complete.
#[derive(Debug, Error, Clone)]
pub enum RefreshError {
    #[error(transparent)]
    Arguments(#[from] ExecError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_are_appended_to_messages() {
        let err = CompileError::UndefinedVariable {
            name: "thresold".into(),
            suggestion: Some("threshold".into()),
        };
        assert_eq!(
            err.to_string(),
            "undefined variable `thresold` (did you mean `threshold`?)"
        );

        let err = CompileError::UnknownFunction {
            name: "frobnicate".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "unknown function `frobnicate`");
    }
}
