use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fastpath_ast::{BinaryOp, UnaryOp, Value};

use crate::errors::ExecError;
use crate::ops;

type NativeFn = dyn Fn(&[Value]) -> Result<Value, ExecError> + Send + Sync;

/// A host function callable from templates and specialized routines.
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    /// `None` accepts any number of arguments.
    arity: Option<usize>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, arity: Option<usize>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, ExecError> {
        if let Some(expected) = self.arity {
            if args.len() != expected {
                return Err(ExecError::Arity {
                    routine: self.name.clone(),
                    expected,
                    found: args.len(),
                });
            }
        }
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Names an original routine can see besides its own locals: sibling
/// functions and module-level bindings. Specialized routines compile against
/// the same scope, so unqualified names resolve identically in both.
///
/// Bindings are read when a routine is compiled; later changes to a cloned
/// scope do not reach routines compiled earlier.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    functions: HashMap<String, NativeFunction>,
    globals: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope preloaded with `len`, `abs`, `min`, `max` and `str`.
    pub fn with_prelude() -> Self {
        Self::new()
            .with_function("len", Some(1), |args| ops::unary(UnaryOp::Len, &args[0]))
            .with_function("abs", Some(1), |args| abs(&args[0]))
            .with_function("min", Some(2), |args| pick(BinaryOp::Le, &args[0], &args[1]))
            .with_function("max", Some(2), |args| pick(BinaryOp::Ge, &args[0], &args[1]))
            .with_function("str", Some(1), |args| {
                Ok(match &args[0] {
                    Value::Str(text) => Value::Str(Arc::clone(text)),
                    other => Value::str(other.to_string()),
                })
            })
    }

    pub fn with_function<F>(mut self, name: &str, arity: Option<usize>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.define_function(NativeFunction::new(name, arity, func));
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    pub fn define_function(&mut self, function: NativeFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn function(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }
}

fn abs(value: &Value) -> Result<Value, ExecError> {
    match value {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or(ExecError::Overflow { op: "abs" }),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(ExecError::TypeMismatch {
            op: "abs",
            expected: "a number",
            found: other.type_name().to_string(),
        }),
    }
}

/// `left` when `left <op> right` holds, else `right`.
fn pick(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    let keep_left = ops::expect_bool(op.symbol(), &ops::binary(op, left, right)?)?;
    Ok(if keep_left { left.clone() } else { right.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_functions_check_arity() {
        let scope = Scope::with_prelude();
        let max = scope.function("max").unwrap();
        assert_eq!(max.call(&[Value::Int(3), Value::Float(4.5)]), Ok(Value::Float(4.5)));
        assert!(matches!(
            max.call(&[Value::Int(3)]),
            Err(ExecError::Arity { expected: 2, found: 1, .. })
        ));
        let str_fn = scope.function("str").unwrap();
        assert_eq!(str_fn.call(&[Value::Int(7)]), Ok(Value::str("7")));
        assert_eq!(str_fn.call(&[Value::str("a")]), Ok(Value::str("a")));
    }

    #[test]
    fn abs_reports_overflow() {
        assert_eq!(abs(&Value::Int(-4)), Ok(Value::Int(4)));
        assert_eq!(abs(&Value::Int(i64::MIN)), Err(ExecError::Overflow { op: "abs" }));
    }
}
