use std::collections::HashMap;

use fastpath_ast::{Expr, Node, RegionId, Stmt, Value};

use super::TemplateSource;
use super::fold::{Env, eval_stable, rewrite};
use super::lower::{Lowering, Mode, Op};
use super::validate::check_bindings;
use crate::errors::ConversionError;
use crate::inputs::StableInputs;

/// What a conversion run needs besides its bindings.
pub(crate) struct Context<'c> {
    pub(crate) stable: &'c StableInputs,
    pub(crate) stable_names: &'c [String],
    pub(crate) templates: &'c dyn TemplateSource,
}

pub(crate) fn run_ops<'a>(
    ops: &'a [Op],
    cx: &Context<'_>,
    env: &mut Env<'a>,
    out: &mut Vec<Node>,
) -> Result<(), ConversionError> {
    for op in ops {
        match op {
            Op::Emit { stmt, mode } => out.push(Node::Stmt(emit_leaf(stmt, *mode, env))),
            Op::If {
                cond,
                then_ops,
                else_ops,
                mode,
            } => {
                let cond = rewrite(cond, *mode, env);
                if *mode == Mode::Inline {
                    if let Expr::Literal(Value::Bool(taken)) = cond {
                        let live = if taken { then_ops } else { else_ops };
                        let mut branch = Vec::new();
                        run_ops(live, cx, env, &mut branch)?;
                        splice(out, branch);
                        continue;
                    }
                }
                let mut then_body = Vec::new();
                run_ops(then_ops, cx, env, &mut then_body)?;
                let mut else_body = Vec::new();
                run_ops(else_ops, cx, env, &mut else_body)?;
                out.push(Node::Stmt(Stmt::If {
                    cond,
                    then_body,
                    else_body,
                }));
            }
            Op::For {
                var,
                iterable,
                body,
                mode,
            } => {
                let iterable = rewrite(iterable, *mode, env);
                let mut converted = Vec::new();
                run_ops(body, cx, env, &mut converted)?;
                out.push(Node::Stmt(Stmt::For {
                    var: var.clone(),
                    iterable,
                    body: converted,
                }));
            }
            Op::Block(body) => {
                let mut converted = Vec::new();
                run_ops(body, cx, env, &mut converted)?;
                out.push(Node::Stmt(Stmt::Block(converted)));
            }
            Op::DropIf { region, cond, body } => {
                match evaluate(*region, "drop condition", cond, env)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => run_ops(body, cx, env, out)?,
                    other => {
                        return Err(ConversionError::NotBoolean {
                            region: *region,
                            found: other.type_name(),
                        });
                    }
                }
            }
            Op::Unroll {
                region,
                var,
                iterable,
                body,
            } => {
                let items = match evaluate(*region, "unroll iterable", iterable, env)? {
                    Value::List(items) => items,
                    other => {
                        return Err(ConversionError::NotIterable {
                            region: *region,
                            found: other.type_name(),
                        });
                    }
                };
                for item in items.iter() {
                    env.bind(var, item.clone());
                    let mut copy = Vec::new();
                    let converted = run_ops(body, cx, env, &mut copy);
                    env.unbind();
                    converted?;
                    splice(out, copy);
                }
            }
            Op::Template {
                region,
                label,
                default,
                unroll_vars,
            } => match cx.templates.region_body(*region, label.as_deref(), cx.stable) {
                None => run_ops(default, cx, env, out)?,
                Some(supplied) => {
                    let ops = lower_supplied(*region, &supplied, cx.stable_names, unroll_vars)?;
                    let mut scoped = env.scoped();
                    run_ops(&ops, cx, &mut scoped, out)?;
                }
            },
        }
    }
    Ok(())
}

/// Supplied bodies get the checks a template body gets at load time. They
/// carry no directives of their own, so nested regions are transparent.
fn lower_supplied(
    region: RegionId,
    body: &[Node],
    stable_names: &[String],
    unroll_vars: &[String],
) -> Result<Vec<Op>, ConversionError> {
    let invalid = |source| ConversionError::InvalidTemplate { region, source };
    check_bindings(body, stable_names).map_err(invalid)?;
    Lowering::new(HashMap::new(), stable_names)
        .with_unroll_vars(unroll_vars.to_vec())
        .body(body, Mode::Inline)
        .map_err(invalid)
}

fn evaluate(
    region: RegionId,
    context: &'static str,
    expr: &Expr,
    env: &Env<'_>,
) -> Result<Value, ConversionError> {
    eval_stable(expr, env).map_err(|source| ConversionError::Evaluation {
        region,
        context,
        source,
    })
}

fn emit_leaf(stmt: &Stmt, mode: Mode, env: &Env<'_>) -> Stmt {
    match stmt {
        Stmt::Let { name, expr } => Stmt::Let {
            name: name.clone(),
            expr: rewrite(expr, mode, env),
        },
        Stmt::Assign { name, expr } => Stmt::Assign {
            name: name.clone(),
            expr: rewrite(expr, mode, env),
        },
        Stmt::Push { target, value } => Stmt::Push {
            target: target.clone(),
            value: rewrite(value, mode, env),
        },
        Stmt::Expr(expr) => Stmt::Expr(rewrite(expr, mode, env)),
        Stmt::Return(expr) => Stmt::Return(rewrite(expr, mode, env)),
        Stmt::If { .. } | Stmt::For { .. } | Stmt::Block(_) => stmt.clone(),
    }
}

/// Splice a converted body into its parent. A body that declares locals keeps
/// its own scope.
fn splice(out: &mut Vec<Node>, body: Vec<Node>) {
    let declares = body
        .iter()
        .any(|node| matches!(node, Node::Stmt(Stmt::Let { .. })));
    if declares {
        out.push(Node::Stmt(Stmt::Block(body)));
    } else {
        out.extend(body);
    }
}
