//! Generation stage: runs a conversion routine for concrete stable inputs and
//! compiles the result into a callable specialized routine.

mod compile;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fastpath_ast::{Node, Value, render_routine};
use serde::{Deserialize, Serialize};

pub use compile::{CompiledRoutine, compile_routine};

use crate::cache::Fingerprint;
use crate::conversion::{ConversionRoutine, NoTemplates, TemplateSource};
use crate::errors::{BuildFailure, ExecError, SpecializationBuildError};
use crate::inputs::StableInputs;
use crate::runtime::scope::Scope;

/// Monotonically increasing per cache; a larger id was built later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(pub u64);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Output of one conversion: the body tree and its rendered text.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecializedSource {
    pub routine: String,
    /// Volatile parameters, in call order.
    pub params: Vec<String>,
    pub body: Vec<Node>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationMetadata {
    pub created_at: DateTime<Utc>,
    pub build_time: Duration,
}

/// A specialized routine together with its provenance.
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: GenerationId,
    pub fingerprint: Fingerprint,
    pub source: SpecializedSource,
    pub routine: CompiledRoutine,
    pub metadata: GenerationMetadata,
}

impl Generation {
    pub fn call(&self, volatile: &[Value]) -> Result<Value, ExecError> {
        self.routine.call(volatile)
    }
}

/// Produces generations from one conversion routine, compiled against the
/// original routine's scope.
#[derive(Debug, Clone)]
pub struct Generator {
    conversion: Arc<ConversionRoutine>,
    scope: Arc<Scope>,
    name: String,
}

impl Generator {
    pub fn new(conversion: Arc<ConversionRoutine>, scope: Arc<Scope>, name: impl Into<String>) -> Self {
        Self {
            conversion,
            scope,
            name: name.into(),
        }
    }

    pub fn conversion(&self) -> &Arc<ConversionRoutine> {
        &self.conversion
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generate(
        &self,
        fingerprint: &Fingerprint,
        stable: &StableInputs,
        id: GenerationId,
    ) -> Result<Generation, SpecializationBuildError> {
        self.generate_with(fingerprint, stable, id, &NoTemplates)
    }

    /// Build generation `id`, taking template region bodies from `templates`.
    pub fn generate_with(
        &self,
        fingerprint: &Fingerprint,
        stable: &StableInputs,
        id: GenerationId,
        templates: &dyn TemplateSource,
    ) -> Result<Generation, SpecializationBuildError> {
        let started = Instant::now();
        let failed = |source_text: Option<String>, cause: BuildFailure| SpecializationBuildError {
            routine: self.name.clone(),
            fingerprint: fingerprint.clone(),
            source_text,
            cause,
        };

        let body = self
            .conversion
            .convert_with(stable, templates)
            .map_err(|err| failed(None, err.into()))?;
        let params = self.conversion.volatile_params().to_vec();
        let text = render_routine(&self.name, &params, &body);
        let routine = match compile_routine(&self.name, &params, &body, &self.scope) {
            Ok(routine) => routine,
            Err(err) => return Err(failed(Some(text), err.into())),
        };

        let build_time = started.elapsed();
        tracing::info!(
            routine = %self.name,
            generation = %id,
            %fingerprint,
            build_us = u64::try_from(build_time.as_micros()).unwrap_or(u64::MAX),
            "generated specialized routine"
        );

        Ok(Generation {
            id,
            fingerprint: fingerprint.clone(),
            source: SpecializedSource {
                routine: self.name.clone(),
                params,
                body,
                text,
            },
            routine,
            metadata: GenerationMetadata {
                created_at: Utc::now(),
                build_time,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use fastpath_ast::build::*;
    use fastpath_ast::{Action, AnnotatedTemplate};

    use super::*;

    fn generator(template: AnnotatedTemplate, stable: &[&str], scope: Scope) -> Generator {
        let stable: Vec<String> = stable.iter().map(ToString::to_string).collect();
        let conversion = ConversionRoutine::build(Arc::new(template), &stable).unwrap();
        Generator::new(Arc::new(conversion), Arc::new(scope), "clamp")
    }

    fn inputs(threshold: i64) -> StableInputs {
        [("threshold", Value::Int(threshold))].into_iter().collect()
    }

    #[test]
    fn generated_routine_carries_provenance() {
        let template = AnnotatedTemplate::new(
            "clamp",
            ["threshold", "x"],
            vec![region(
                1,
                vec![ret(call("min", vec![add(var("x"), var("threshold")), mul(var("threshold"), int(2))]))],
            )],
        )
        .with_directive(1, Action::Inline);
        let generator = generator(template, &["threshold"], Scope::with_prelude());
        let fingerprint = Fingerprint::hashed(&[Value::Int(10)]);

        let generation = generator
            .generate(&fingerprint, &inputs(10), GenerationId(7))
            .unwrap();
        assert_eq!(generation.id, GenerationId(7));
        assert_eq!(generation.fingerprint, fingerprint);
        assert_eq!(generation.source.params, vec!["x".to_string()]);
        assert_eq!(
            generation.source.text,
            "fn clamp(x) {\n    return min((x + 10), 20);\n}\n"
        );
        assert_eq!(generation.call(&[Value::Int(5)]), Ok(Value::Int(15)));
        assert_eq!(generation.call(&[Value::Int(50)]), Ok(Value::Int(20)));
    }

    #[test]
    fn compile_failures_keep_the_offending_source() {
        let template = AnnotatedTemplate::new(
            "clamp",
            ["threshold", "x"],
            vec![
                region(1, vec![let_("limit", var("threshold"))]),
                ret(add(var("x"), var("limit"))),
            ],
        )
        .with_directive(1, Action::Kill);
        let generator = generator(template, &["threshold"], Scope::new());

        let err = generator
            .generate(&Fingerprint::constant(), &inputs(1), GenerationId(1))
            .unwrap_err();
        assert_eq!(err.routine, "clamp");
        assert!(matches!(err.cause, BuildFailure::Compile(_)));
        assert_eq!(
            err.source_text.as_deref(),
            Some("fn clamp(x) {\n    return (x + limit);\n}\n")
        );
    }
}
