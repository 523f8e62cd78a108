//! Runtime specialization of routines.
//!
//! An [`AnnotatedTemplate`] marks regions of a routine with directives. Once,
//! at load time, it is turned into a [`ConversionRoutine`]; at call time the
//! [`SpecializedRunner`] feeds it the values of the stable inputs, compiles the
//! resulting specialized routine, caches it by fingerprint and runs it with the
//! remaining arguments. When specialization fails the original routine runs
//! instead.
//!
//! ```no_run
//! use fastpath::build::*;
//! use fastpath::{Action, AnnotatedTemplate, Scope, SimpleBuilder, SpecializedRunner, Value};
//!
//! let template = AnnotatedTemplate::new(
//!     "clamp",
//!     ["threshold", "x"],
//!     vec![region(1, vec![ret(call("min", vec![var("x"), var("threshold")]))])],
//! )
//! .with_directive(1, Action::Inline);
//!
//! let runner = SpecializedRunner::new(template, SimpleBuilder::new(["threshold"]), Scope::with_prelude())?;
//! assert_eq!(runner.call(&[Value::Int(10), Value::Int(5)])?, Value::Int(5));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod conversion;
pub mod errors;
pub mod generation;
pub mod inputs;
pub mod loader;
pub mod ops;
pub mod runtime;
pub mod utils;

pub use fastpath_ast::{self as ast, Action, AnnotatedTemplate, Directive, Node, RegionId, Value, build};

pub use cache::{Fingerprint, Retention, SpecializationCache};
pub use config::{FailurePolicy, RunnerConfig};
pub use conversion::{ConversionRoutine, NoTemplates, TemplateSource};
pub use errors::{
    CacheError, CompileError, ConversionError, ExecError, FingerprintError, RefreshError, SpecializationBuildError,
    TemplateError, VerificationMismatchError,
};
pub use generation::{Generation, GenerationId, Generator};
pub use inputs::StableInputs;
pub use loader::{load_template, save_template};
pub use runtime::{
    CallOutcome, Dispatch, FallbackReason, IntrospectionSnapshot, NativeFunction, RecalculationMode, Scope,
    SimpleBuilder, SpecializationBuilder, SpecializedRunner,
};
pub use utils::logger::init_logging;
