use serde::{Deserialize, Serialize};

use crate::nodes::{Expr, Node, RegionId};

/// What the conversion stage does with a tagged region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Copy statements, replacing stable-input references with their values.
    Verbatim,
    /// Copy statements, then fold constant sub-expressions and remove `if`
    /// branches that became unreachable.
    Inline,
    /// Omit the region when the stable-only condition evaluates to `true`.
    DropIf(Expr),
    /// Expand the region's single `for` loop over its stable iterable.
    Unroll,
    /// Never emit the region.
    Kill,
    /// Let the builder supply the region's body for each stable bundle; the
    /// region's own body is used when it supplies none. Supplied bodies are
    /// folded like `Inline` regions.
    Template,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Verbatim => "verbatim",
            Action::Inline => "inline",
            Action::DropIf(_) => "drop_if",
            Action::Unroll => "unroll",
            Action::Kill => "kill",
            Action::Template => "template",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub region: RegionId,
    pub action: Action,
}

/// Parsed, annotated body of an original routine.
///
/// `params` is the positional signature of the original routine; the
/// directive list refers to regions of `body` by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedTemplate {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
    #[serde(default)]
    pub directives: Vec<Directive>,
}

impl AnnotatedTemplate {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = S>,
        body: Vec<Node>,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            body,
            directives: Vec::new(),
        }
    }

    pub fn with_directive(mut self, region: u32, action: Action) -> Self {
        self.directives.push(Directive {
            region: RegionId(region),
            action,
        });
        self
    }

    pub fn directive_for(&self, region: RegionId) -> Option<&Action> {
        self.directives
            .iter()
            .find(|directive| directive.region == region)
            .map(|directive| &directive.action)
    }
}
