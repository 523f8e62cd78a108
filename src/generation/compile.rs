//! Lowering of statement trees to nested closures.
//!
//! Locals live in numbered frame slots resolved at compile time; functions and
//! module-level bindings are looked up in the [`Scope`] once, while compiling,
//! and captured by the closures that use them.

use std::fmt;
use std::sync::Arc;

use fastpath_ast::{BinaryOp, Expr, Node, Stmt, Value};

use crate::errors::{CompileError, ExecError};
use crate::ops;
use crate::runtime::scope::Scope;
use crate::utils::suggest::find_best_match;

struct Frame {
    slots: Vec<Value>,
}

enum Flow {
    Next,
    Return(Value),
}

type ExprFn = Box<dyn Fn(&Frame) -> Result<Value, ExecError> + Send + Sync>;
type StmtFn = Box<dyn Fn(&mut Frame) -> Result<Flow, ExecError> + Send + Sync>;

struct RoutineCode {
    name: String,
    params: Vec<String>,
    frame_size: usize,
    body: Vec<StmtFn>,
}

/// An executable routine. Cloning shares the compiled code.
#[derive(Clone)]
pub struct CompiledRoutine {
    code: Arc<RoutineCode>,
}

impl CompiledRoutine {
    pub fn name(&self) -> &str {
        &self.code.name
    }

    pub fn params(&self) -> &[String] {
        &self.code.params
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, ExecError> {
        let code = &self.code;
        if args.len() != code.params.len() {
            return Err(ExecError::Arity {
                routine: code.name.clone(),
                expected: code.params.len(),
                found: args.len(),
            });
        }

        let mut frame = Frame {
            slots: vec![Value::Unit; code.frame_size],
        };
        frame.slots[..args.len()].clone_from_slice(args);
        match run(&code.body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Unit),
        }
    }
}

impl fmt::Debug for CompiledRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoutine")
            .field("name", &self.code.name)
            .field("params", &self.code.params)
            .field("frame_size", &self.code.frame_size)
            .finish_non_exhaustive()
    }
}

fn run(body: &[StmtFn], frame: &mut Frame) -> Result<Flow, ExecError> {
    for stmt in body {
        if let Flow::Return(value) = stmt(frame)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Next)
}

/// Compile `body` as a routine taking `params`. Regions are compiled as plain
/// statement sequences.
pub fn compile_routine(
    name: &str,
    params: &[String],
    body: &[Node],
    scope: &Scope,
) -> Result<CompiledRoutine, CompileError> {
    let mut compiler = Compiler {
        scope,
        locals: vec![Vec::new()],
        next_slot: 0,
    };
    for param in params {
        compiler.declare(param);
    }
    let body = compiler.block(body)?;

    Ok(CompiledRoutine {
        code: Arc::new(RoutineCode {
            name: name.to_string(),
            params: params.to_vec(),
            frame_size: compiler.next_slot,
            body,
        }),
    })
}

struct Compiler<'s> {
    scope: &'s Scope,
    locals: Vec<Vec<(String, usize)>>,
    next_slot: usize,
}

impl Compiler<'_> {
    fn declare(&mut self, name: &str) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        if let Some(innermost) = self.locals.last_mut() {
            innermost.push((name.to_string(), slot));
        }
        slot
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        self.locals.iter().rev().find_map(|frame| {
            frame
                .iter()
                .rev()
                .find(|(local, _)| local == name)
                .map(|(_, slot)| *slot)
        })
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, CompileError>) -> Result<T, CompileError> {
        self.locals.push(Vec::new());
        let result = f(self);
        self.locals.pop();
        result
    }

    fn undefined(&self, name: &str) -> CompileError {
        let locals = self.locals.iter().flatten().map(|(local, _)| local.as_str());
        CompileError::UndefinedVariable {
            name: name.to_string(),
            suggestion: find_best_match(name, locals.chain(self.scope.global_names())),
        }
    }

    fn block(&mut self, nodes: &[Node]) -> Result<Vec<StmtFn>, CompileError> {
        let mut compiled = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Stmt(stmt) => compiled.push(self.stmt(stmt)?),
                Node::Region(region) => compiled.extend(self.block(&region.body)?),
            }
        }
        Ok(compiled)
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<StmtFn, CompileError> {
        Ok(match stmt {
            Stmt::Let { name, expr } => {
                let value = self.expr(expr)?;
                let slot = self.declare(name);
                Box::new(move |frame| {
                    let value = value(frame)?;
                    frame.slots[slot] = value;
                    Ok(Flow::Next)
                })
            }
            Stmt::Assign { name, expr } => {
                let value = self.expr(expr)?;
                let slot = self.resolve(name).ok_or_else(|| self.undefined(name))?;
                Box::new(move |frame| {
                    let value = value(frame)?;
                    frame.slots[slot] = value;
                    Ok(Flow::Next)
                })
            }
            Stmt::Push { target, value } => {
                let item = self.expr(value)?;
                let slot = match self.resolve(target) {
                    Some(slot) => slot,
                    None if self.scope.global(target).is_some() => {
                        return Err(CompileError::PushTargetNotLocal {
                            name: target.clone(),
                        });
                    }
                    None => return Err(self.undefined(target)),
                };
                Box::new(move |frame| {
                    let item = item(frame)?;
                    match &mut frame.slots[slot] {
                        Value::List(items) => {
                            Arc::make_mut(items).push(item);
                            Ok(Flow::Next)
                        }
                        other => Err(ExecError::TypeMismatch {
                            op: "push",
                            expected: "list",
                            found: other.type_name().to_string(),
                        }),
                    }
                })
            }
            Stmt::Expr(expr) => {
                let value = self.expr(expr)?;
                Box::new(move |frame| value(frame).map(|_| Flow::Next))
            }
            Stmt::Return(expr) => {
                let value = self.expr(expr)?;
                Box::new(move |frame| value(frame).map(Flow::Return))
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.expr(cond)?;
                let then_body = self.nested(|compiler| compiler.block(then_body))?;
                let else_body = self.nested(|compiler| compiler.block(else_body))?;
                Box::new(move |frame| {
                    if ops::expect_bool("if", &cond(frame)?)? {
                        run(&then_body, frame)
                    } else {
                        run(&else_body, frame)
                    }
                })
            }
            Stmt::For {
                var,
                iterable,
                body,
            } => {
                let iterable = self.expr(iterable)?;
                let (slot, body) = self.nested(|compiler| {
                    let slot = compiler.declare(var);
                    Ok((slot, compiler.block(body)?))
                })?;
                Box::new(move |frame| {
                    let items = match iterable(frame)? {
                        Value::List(items) => items,
                        other => {
                            return Err(ExecError::TypeMismatch {
                                op: "for",
                                expected: "list",
                                found: other.type_name().to_string(),
                            });
                        }
                    };
                    for item in items.iter() {
                        frame.slots[slot] = item.clone();
                        if let Flow::Return(value) = run(&body, frame)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                    Ok(Flow::Next)
                })
            }
            Stmt::Block(body) => {
                let body = self.nested(|compiler| compiler.block(body))?;
                Box::new(move |frame| run(&body, frame))
            }
        })
    }

    fn expr(&self, expr: &Expr) -> Result<ExprFn, CompileError> {
        Ok(match expr {
            Expr::Literal(value) => constant(value.clone()),
            Expr::Var(name) => match self.resolve(name) {
                Some(slot) => Box::new(move |frame| Ok(frame.slots[slot].clone())),
                None => match self.scope.global(name) {
                    Some(value) => constant(value.clone()),
                    None => return Err(self.undefined(name)),
                },
            },
            Expr::Unary { op, expr } => {
                let (op, inner) = (*op, self.expr(expr)?);
                Box::new(move |frame| ops::unary(op, &inner(frame)?))
            }
            Expr::Binary { op, left, right } => {
                let (op, left, right) = (*op, self.expr(left)?, self.expr(right)?);
                if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    Box::new(move |frame| {
                        let left = left(frame)?;
                        match ops::short_circuit(op, &left)? {
                            Some(decided) => Ok(decided),
                            None => ops::binary(op, &left, &right(frame)?),
                        }
                    })
                } else {
                    Box::new(move |frame| ops::binary(op, &left(frame)?, &right(frame)?))
                }
            }
            Expr::Call { callee, args } => {
                let function = self.scope.function(callee).cloned().ok_or_else(|| {
                    CompileError::UnknownFunction {
                        name: callee.clone(),
                        suggestion: find_best_match(callee, self.scope.function_names()),
                    }
                })?;
                if let Some(expected) = function.arity() {
                    if expected != args.len() {
                        return Err(CompileError::ArityMismatch {
                            name: callee.clone(),
                            expected,
                            found: args.len(),
                        });
                    }
                }
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(move |frame| {
                    let values = args
                        .iter()
                        .map(|arg| arg(frame))
                        .collect::<Result<Vec<_>, _>>()?;
                    function.call(&values)
                })
            }
            Expr::Index { base, index } => {
                let (base, index) = (self.expr(base)?, self.expr(index)?);
                Box::new(move |frame| ops::index(&base(frame)?, &index(frame)?))
            }
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.expr(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(move |frame| {
                    items
                        .iter()
                        .map(|item| item(frame))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::from)
                })
            }
        })
    }
}

fn constant(value: Value) -> ExprFn {
    Box::new(move |_| Ok(value.clone()))
}

#[cfg(test)]
mod tests {
    use fastpath_ast::build::*;

    use super::*;

    fn compile(params: &[&str], body: Vec<Node>, scope: &Scope) -> Result<CompiledRoutine, CompileError> {
        let params: Vec<String> = params.iter().map(ToString::to_string).collect();
        compile_routine("test", &params, &body, scope)
    }

    #[test]
    fn runs_loops_and_pushes() {
        let body = vec![
            let_("evens", list(vec![])),
            for_(
                "n",
                var("items"),
                vec![if_(
                    eq(binary(BinaryOp::Rem, var("n"), int(2)), int(0)),
                    vec![push("evens", var("n"))],
                    vec![],
                )],
            ),
            ret(var("evens")),
        ];
        let routine = compile(&["items"], body, &Scope::new()).unwrap();
        let items = Value::list((1..=6).map(Value::Int));
        assert_eq!(
            routine.call(&[items]),
            Ok(Value::list([Value::Int(2), Value::Int(4), Value::Int(6)]))
        );
    }

    #[test]
    fn block_scopes_and_shadowing() {
        let body = vec![
            let_("x", int(1)),
            block(vec![let_("x", int(2)), assign("x", add(var("x"), int(10)))]),
            ret(var("x")),
        ];
        let routine = compile(&[], body, &Scope::new()).unwrap();
        assert_eq!(routine.call(&[]), Ok(Value::Int(1)));
    }

    #[test]
    fn resolves_functions_and_globals_from_scope() {
        let scope = Scope::with_prelude().with_global("offset", 100_i64);
        let body = vec![ret(add(call("abs", vec![var("x")]), var("offset")))];
        let routine = compile(&["x"], body, &scope).unwrap();
        assert_eq!(routine.call(&[Value::Int(-5)]), Ok(Value::Int(105)));
    }

    #[test]
    fn reports_unknown_names_with_suggestions() {
        let scope = Scope::with_prelude();
        let err = compile(&["limit"], vec![ret(var("limt"))], &scope).unwrap_err();
        assert_eq!(
            err,
            CompileError::UndefinedVariable {
                name: "limt".into(),
                suggestion: Some("limit".into())
            }
        );

        let err = compile(&["x"], vec![ret(call("maxx", vec![var("x"), int(1)]))], &scope).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { ref suggestion, .. } if suggestion.as_deref() == Some("max")));

        let err = compile(&["x"], vec![ret(call("abs", vec![]))], &scope).unwrap_err();
        assert!(matches!(err, CompileError::ArityMismatch { expected: 1, found: 0, .. }));

        let scope = Scope::new().with_global("log", Value::list([]));
        let err = compile(&[], vec![push("log", int(1))], &scope).unwrap_err();
        assert_eq!(err, CompileError::PushTargetNotLocal { name: "log".into() });
    }

    #[test]
    fn short_circuit_skips_the_right_side() {
        let body = vec![ret(binary(
            BinaryOp::Or,
            var("flag"),
            binary(BinaryOp::Div, int(1), int(0)),
        ))];
        let routine = compile(&["flag"], body, &Scope::new()).unwrap();
        assert_eq!(routine.call(&[Value::Bool(true)]), Ok(Value::Bool(true)));
        assert_eq!(
            routine.call(&[Value::Bool(false)]),
            Err(ExecError::DivisionByZero)
        );
    }

    #[test]
    fn falling_off_the_end_returns_unit_and_arity_is_checked() {
        let routine = compile(&["x"], vec![expr(var("x"))], &Scope::new()).unwrap();
        assert_eq!(routine.call(&[Value::Int(1)]), Ok(Value::Unit));
        assert!(matches!(routine.call(&[]), Err(ExecError::Arity { expected: 1, .. })));
    }
}
