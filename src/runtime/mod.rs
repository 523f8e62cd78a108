//! Runtime side of the engine: the runner that replaces a routine at its call
//! site, the builder contract it consults, and the scope specialized code
//! resolves names against.

pub mod builder;
pub mod introspection;
pub mod runner;
pub mod scope;
pub mod verify;

pub use builder::{RecalculationMode, SimpleBuilder, SpecializationBuilder};
pub use introspection::{GenerationSummary, IntrospectionSnapshot};
pub use runner::{CallOutcome, Dispatch, FallbackReason, SpecializedRunner};
pub use scope::{NativeFunction, Scope};
