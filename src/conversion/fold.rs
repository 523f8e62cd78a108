use fastpath_ast::{BinaryOp, Expr, Value};

use super::lower::Mode;
use crate::errors::ExecError;
use crate::ops;

/// Stable inputs and unroll variables bound while a conversion runs.
#[derive(Debug, Default)]
pub(crate) struct Env<'a> {
    bindings: Vec<(&'a str, Value)>,
}

impl<'a> Env<'a> {
    pub(crate) fn bind(&mut self, name: &'a str, value: Value) {
        self.bindings.push((name, value));
    }

    pub(crate) fn unbind(&mut self) {
        self.bindings.pop();
    }

    /// Copy of the current bindings, for running ops that live shorter than
    /// this environment.
    pub(crate) fn scoped(&self) -> Env<'a> {
        Env {
            bindings: self.bindings.clone(),
        }
    }

    /// Innermost binding wins.
    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| *bound == name)
            .map(|(_, value)| value)
    }
}

/// Replace bound names by their values, then fold when `mode` asks for it.
pub(crate) fn rewrite(expr: &Expr, mode: Mode, env: &Env<'_>) -> Expr {
    let substituted = substitute(expr, env);
    match mode {
        Mode::Verbatim => substituted,
        Mode::Inline => fold(substituted),
    }
}

fn substitute(expr: &Expr, env: &Env<'_>) -> Expr {
    match expr {
        Expr::Var(name) => match env.lookup(name) {
            Some(value) => Expr::Literal(value.clone()),
            None => expr.clone(),
        },
        Expr::Literal(_) => expr.clone(),
        Expr::Unary { op, expr } => Expr::Unary {
            op: *op,
            expr: Box::new(substitute(expr, env)),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(substitute(left, env)),
            right: Box::new(substitute(right, env)),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: callee.clone(),
            args: args.iter().map(|arg| substitute(arg, env)).collect(),
        },
        Expr::Index { base, index } => Expr::Index {
            base: Box::new(substitute(base, env)),
            index: Box::new(substitute(index, env)),
        },
        Expr::List(items) => Expr::List(items.iter().map(|item| substitute(item, env)).collect()),
    }
}

/// Constant folding over pure operators. Calls are never evaluated, and a
/// sub-expression whose evaluation fails stays as written so the runtime
/// raises the same error.
pub(crate) fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::Unary { op, expr } => {
            let inner = fold(*expr);
            if let Expr::Literal(value) = &inner {
                if let Ok(folded) = ops::unary(op, value) {
                    return Expr::Literal(folded);
                }
            }
            Expr::Unary {
                op,
                expr: Box::new(inner),
            }
        }
        Expr::Binary { op, left, right } => {
            let left = fold(*left);
            let right = fold(*right);
            if let Expr::Literal(l) = &left {
                if let Ok(Some(decided)) = ops::short_circuit(op, l) {
                    return Expr::Literal(decided);
                }
                if let Expr::Literal(r) = &right {
                    if let Ok(folded) = ops::binary(op, l, r) {
                        return Expr::Literal(folded);
                    }
                }
            }
            Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Expr::Index { base, index } => {
            let base = fold(*base);
            let index = fold(*index);
            if let (Expr::Literal(b), Expr::Literal(i)) = (&base, &index) {
                if let Ok(item) = ops::index(b, i) {
                    return Expr::Literal(item);
                }
            }
            Expr::Index {
                base: Box::new(base),
                index: Box::new(index),
            }
        }
        Expr::List(items) => {
            let items: Vec<Expr> = items.into_iter().map(fold).collect();
            if items.iter().all(Expr::is_literal) {
                Expr::Literal(Value::list(items.into_iter().filter_map(|item| match item {
                    Expr::Literal(value) => Some(value),
                    _ => None,
                })))
            } else {
                Expr::List(items)
            }
        }
        Expr::Call { callee, args } => Expr::Call {
            callee,
            args: args.into_iter().map(fold).collect(),
        },
        other @ (Expr::Literal(_) | Expr::Var(_)) => other,
    }
}

/// Evaluate a stable-only expression during conversion.
pub(crate) fn eval_stable(expr: &Expr, env: &Env<'_>) -> Result<Value, ExecError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => env.lookup(name).cloned().ok_or_else(|| ExecError::Native {
            function: name.clone(),
            message: "not bound to a stable input".into(),
        }),
        Expr::Unary { op, expr } => ops::unary(*op, &eval_stable(expr, env)?),
        Expr::Binary { op, left, right } => {
            let left = eval_stable(left, env)?;
            if matches!(op, BinaryOp::And | BinaryOp::Or) {
                if let Some(decided) = ops::short_circuit(*op, &left)? {
                    return Ok(decided);
                }
            }
            ops::binary(*op, &left, &eval_stable(right, env)?)
        }
        Expr::Index { base, index } => ops::index(&eval_stable(base, env)?, &eval_stable(index, env)?),
        Expr::List(items) => items
            .iter()
            .map(|item| eval_stable(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::from),
        Expr::Call { callee, .. } => Err(ExecError::Native {
            function: callee.clone(),
            message: "calls are not evaluated during conversion".into(),
        }),
    }
}
