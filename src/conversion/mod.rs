//! Conversion stage: turns an annotated template, once, into a routine that
//! writes specialized routine bodies for given stable-input values.

mod convert;
mod fold;
mod lower;
mod validate;

use std::fmt;
use std::sync::Arc;

use fastpath_ast::{AnnotatedTemplate, Node, Printer, RegionId};
use once_cell::sync::OnceCell;

use crate::errors::{ConversionError, TemplateError};
use crate::inputs::{ArgumentSplit, StableInputs};
use convert::Context;
use fold::Env;
use lower::{Lowering, Mode, Op};

/// Supplies bodies for regions under an `Action::Template` directive.
///
/// Must be deterministic for a given stable bundle: the result is cached
/// under the bundle's fingerprint.
pub trait TemplateSource {
    fn region_body(&self, region: RegionId, label: Option<&str>, stable: &StableInputs) -> Option<Vec<Node>>;
}

/// Every template region keeps its own body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTemplates;

impl TemplateSource for NoTemplates {
    fn region_body(&self, _region: RegionId, _label: Option<&str>, _stable: &StableInputs) -> Option<Vec<Node>> {
        None
    }
}

pub struct ConversionRoutine {
    template: Arc<AnnotatedTemplate>,
    split: ArgumentSplit,
    ops: Vec<Op>,
    source: OnceCell<String>,
}

impl ConversionRoutine {
    /// Validate `template` and lower it. Every failure here is a programming
    /// error in the template or the builder's stable-input declaration.
    pub fn build(template: Arc<AnnotatedTemplate>, stable: &[String]) -> Result<Self, TemplateError> {
        let directives = validate::validate(&template, stable)?;
        let ops = Lowering::new(directives, stable).body(&template.body, Mode::Verbatim)?;
        let split = ArgumentSplit::new(&template.name, &template.params, stable);

        tracing::debug!(
            routine = %template.name,
            stable = ?split.stable_names(),
            ops = ops.len(),
            "built conversion routine"
        );

        Ok(Self {
            split,
            ops,
            template,
            source: OnceCell::new(),
        })
    }

    /// Produce the specialized body for `stable`. Pure and deterministic.
    pub fn convert(&self, stable: &StableInputs) -> Result<Vec<Node>, ConversionError> {
        self.convert_with(stable, &NoTemplates)
    }

    /// Like [`ConversionRoutine::convert`], asking `templates` for the body
    /// of each template region.
    pub fn convert_with(
        &self,
        stable: &StableInputs,
        templates: &dyn TemplateSource,
    ) -> Result<Vec<Node>, ConversionError> {
        let mut env = Env::default();
        for (name, value) in stable.iter() {
            env.bind(name, value.clone());
        }
        let cx = Context {
            stable,
            stable_names: self.stable_params(),
            templates,
        };
        let mut body = Vec::new();
        convert::run_ops(&self.ops, &cx, &mut env, &mut body)?;
        Ok(body)
    }

    pub fn template(&self) -> &Arc<AnnotatedTemplate> {
        &self.template
    }

    pub fn split(&self) -> &ArgumentSplit {
        &self.split
    }

    pub fn stable_params(&self) -> &[String] {
        self.split.stable_names()
    }

    /// Parameters of every specialized routine, in signature order.
    pub fn volatile_params(&self) -> &[String] {
        self.split.volatile_names()
    }

    /// Generated source of this conversion routine.
    pub fn source_text(&self) -> &str {
        self.source.get_or_init(|| {
            let mut printer = Printer::new();
            printer.open(format_args!(
                "conversion {}({} | {})",
                self.template.name,
                self.stable_params().join(", "),
                self.volatile_params().join(", ")
            ));
            lower::render_ops(&mut printer, &self.ops);
            printer.close();
            printer.finish()
        })
    }
}

impl fmt::Display for ConversionRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_text())
    }
}

impl fmt::Debug for ConversionRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRoutine")
            .field("routine", &self.template.name)
            .field("stable", &self.stable_params())
            .field("ops", &self.ops.len())
            .finish_non_exhaustive()
    }
}
