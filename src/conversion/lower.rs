//! Lowering of a validated template into conversion ops.

use std::fmt::Write as _;

use fastpath_ast::{Action, Expr, Node, Printer, Region, RegionId, Stmt};

use super::validate::DirectiveMap;
use crate::errors::TemplateError;
use crate::utils::suggest::find_best_match;

/// How statements of a region are copied into the specialized routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Verbatim,
    Inline,
}

/// One step of a conversion routine. Region boundaries are gone by now:
/// transparent regions are flattened into their parent and killed regions
/// are simply absent.
#[derive(Debug, Clone)]
pub(crate) enum Op {
    /// Leaf statement (`let`, assignment, push, expression, return).
    Emit {
        stmt: Stmt,
        mode: Mode,
    },
    If {
        cond: Expr,
        then_ops: Vec<Op>,
        else_ops: Vec<Op>,
        mode: Mode,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Op>,
        mode: Mode,
    },
    Block(Vec<Op>),
    DropIf {
        region: RegionId,
        cond: Expr,
        body: Vec<Op>,
    },
    Unroll {
        region: RegionId,
        var: String,
        iterable: Expr,
        body: Vec<Op>,
    },
    /// Builder-supplied body, or `default` when the builder supplies none.
    Template {
        region: RegionId,
        label: Option<String>,
        default: Vec<Op>,
        unroll_vars: Vec<String>,
    },
}

pub(crate) struct Lowering<'t> {
    directives: DirectiveMap<'t>,
    stable: &'t [String],
    unroll_vars: Vec<String>,
}

impl<'t> Lowering<'t> {
    pub(crate) fn new(directives: DirectiveMap<'t>, stable: &'t [String]) -> Self {
        Self {
            directives,
            stable,
            unroll_vars: Vec::new(),
        }
    }

    /// Lowering for a body supplied inside enclosing unroll loops; their
    /// variables may be read but not rebound.
    pub(crate) fn with_unroll_vars(mut self, unroll_vars: Vec<String>) -> Self {
        self.unroll_vars = unroll_vars;
        self
    }

    pub(crate) fn body(&mut self, nodes: &[Node], mode: Mode) -> Result<Vec<Op>, TemplateError> {
        let mut ops = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Stmt(stmt) => ops.push(self.stmt(stmt, mode)?),
                Node::Region(region) => self.region(region, mode, &mut ops)?,
            }
        }
        Ok(ops)
    }

    fn region(&mut self, region: &Region, mode: Mode, ops: &mut Vec<Op>) -> Result<(), TemplateError> {
        match self.directives.get(&region.id).copied() {
            None => ops.extend(self.body(&region.body, mode)?),
            Some(Action::Verbatim) => ops.extend(self.body(&region.body, Mode::Verbatim)?),
            Some(Action::Inline) => ops.extend(self.body(&region.body, Mode::Inline)?),
            Some(Action::Kill) => {}
            Some(Action::DropIf(cond)) => {
                self.stable_expr(region.id, "drop condition", cond)?;
                let body = self.body(&region.body, mode)?;
                ops.push(Op::DropIf {
                    region: region.id,
                    cond: cond.clone(),
                    body,
                });
            }
            Some(Action::Unroll) => ops.push(self.unroll(region, mode)?),
            Some(Action::Template) => {
                let default = self.body(&region.body, mode)?;
                ops.push(Op::Template {
                    region: region.id,
                    label: region.label.clone(),
                    default,
                    unroll_vars: self.unroll_vars.clone(),
                });
            }
        }
        Ok(())
    }

    fn unroll(&mut self, region: &Region, mode: Mode) -> Result<Op, TemplateError> {
        let [Node::Stmt(Stmt::For { var, iterable, body })] = region.body.as_slice() else {
            return Err(TemplateError::InvalidUnroll {
                region: region.id,
                reason: "the region must hold exactly one `for` loop",
            });
        };
        self.stable_expr(region.id, "unroll iterable", iterable)?;
        if self.unroll_vars.contains(var) {
            return Err(TemplateError::StableAssignment { name: var.clone() });
        }

        self.unroll_vars.push(var.clone());
        let lowered = self.body(body, mode);
        self.unroll_vars.pop();

        Ok(Op::Unroll {
            region: region.id,
            var: var.clone(),
            iterable: iterable.clone(),
            body: lowered?,
        })
    }

    fn stmt(&mut self, stmt: &Stmt, mode: Mode) -> Result<Op, TemplateError> {
        if let Some(name) = stmt.binds() {
            if self.unroll_vars.iter().any(|var| var == name) {
                return Err(TemplateError::StableAssignment {
                    name: name.to_string(),
                });
            }
        }

        Ok(match stmt {
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => Op::If {
                cond: cond.clone(),
                then_ops: self.body(then_body, mode)?,
                else_ops: self.body(else_body, mode)?,
                mode,
            },
            Stmt::For {
                var,
                iterable,
                body,
            } => Op::For {
                var: var.clone(),
                iterable: iterable.clone(),
                body: self.body(body, mode)?,
                mode,
            },
            Stmt::Block(body) => Op::Block(self.body(body, mode)?),
            leaf => Op::Emit {
                stmt: leaf.clone(),
                mode,
            },
        })
    }

    /// Drop conditions and unroll iterables are evaluated during conversion,
    /// so they may only read stable inputs and enclosing unroll variables.
    fn stable_expr(&self, region: RegionId, context: &'static str, expr: &Expr) -> Result<(), TemplateError> {
        if let Some(callee) = expr.first_call() {
            return Err(TemplateError::CallInStableExpression {
                region,
                context,
                callee: callee.to_string(),
            });
        }

        let known = |name: &str| {
            self.stable.iter().any(|param| param == name)
                || self.unroll_vars.iter().any(|var| var == name)
        };
        let mut unresolved = None;
        expr.for_each_var(&mut |name| {
            if unresolved.is_none() && !known(name) {
                unresolved = Some(name);
            }
        });

        match unresolved {
            None => Ok(()),
            Some(name) => Err(TemplateError::UnresolvedReference {
                region,
                context,
                name: name.to_string(),
                suggestion: find_best_match(
                    name,
                    self.stable
                        .iter()
                        .chain(&self.unroll_vars)
                        .map(String::as_str),
                ),
            }),
        }
    }
}

/// Render ops as the conversion routine's source text.
pub(crate) fn render_ops(printer: &mut Printer<'_>, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Emit { stmt, mode } => printer.line(format_args!("{} {}", verb(*mode), leaf_text(stmt))),
            Op::If {
                cond,
                then_ops,
                else_ops,
                mode,
            } => {
                printer.open(format_args!("{} if {cond}", verb(*mode)));
                render_ops(printer, then_ops);
                if !else_ops.is_empty() {
                    printer.reopen("else");
                    render_ops(printer, else_ops);
                }
                printer.close();
            }
            Op::For {
                var,
                iterable,
                body,
                mode,
            } => {
                printer.open(format_args!("{} for {var} in {iterable}", verb(*mode)));
                render_ops(printer, body);
                printer.close();
            }
            Op::Block(body) => {
                printer.open("emit block");
                render_ops(printer, body);
                printer.close();
            }
            Op::DropIf { region, cond, body } => {
                printer.open(format_args!("unless {cond} @region {region}"));
                render_ops(printer, body);
                printer.close();
            }
            Op::Unroll {
                region,
                var,
                iterable,
                body,
            } => {
                printer.open(format_args!("unroll {var} in {iterable} @region {region}"));
                render_ops(printer, body);
                printer.close();
            }
            Op::Template {
                region, default, ..
            } => {
                printer.open(format_args!("template @region {region}"));
                render_ops(printer, default);
                printer.close();
            }
        }
    }
}

fn verb(mode: Mode) -> &'static str {
    match mode {
        Mode::Verbatim => "emit",
        Mode::Inline => "fold",
    }
}

fn leaf_text(stmt: &Stmt) -> String {
    let mut text = String::new();
    // Writing into a String cannot fail.
    let _ = match stmt {
        Stmt::Let { name, expr } => write!(text, "let {name} = {expr};"),
        Stmt::Assign { name, expr } => write!(text, "{name} = {expr};"),
        Stmt::Push { target, value } => write!(text, "{target}.push({value});"),
        Stmt::Expr(expr) => write!(text, "{expr};"),
        Stmt::Return(expr) => write!(text, "return {expr};"),
        Stmt::If { .. } | Stmt::For { .. } | Stmt::Block(_) => write!(text, "{{ .. }}"),
    };
    text
}
