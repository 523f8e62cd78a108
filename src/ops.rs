//! Value semantics shared by constant folding, conversion-time evaluation and
//! compiled routines, so a folded expression always agrees with its runtime
//! counterpart.

use std::cmp::Ordering;
use std::sync::Arc;

use fastpath_ast::{BinaryOp, UnaryOp, Value};

use crate::errors::ExecError;

enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(op: &'static str, left: &Value, right: &Value) -> Result<Numbers, ExecError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(Numbers::Ints(*l, *r)),
        _ => match (left.as_float(), right.as_float()) {
            (Some(l), Some(r)) => Ok(Numbers::Floats(l, r)),
            _ => Err(mismatch(op, "numbers", left, right)),
        },
    }
}

fn mismatch(op: &'static str, expected: &'static str, left: &Value, right: &Value) -> ExecError {
    ExecError::TypeMismatch {
        op,
        expected,
        found: format!("{} and {}", left.type_name(), right.type_name()),
    }
}

pub fn expect_bool(op: &'static str, value: &Value) -> Result<bool, ExecError> {
    value.as_bool().ok_or_else(|| ExecError::TypeMismatch {
        op,
        expected: "bool",
        found: value.type_name().to_string(),
    })
}

pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, ExecError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(ExecError::Overflow { op: "-" }),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Len, Value::Str(s)) => length(s.chars().count()),
        (UnaryOp::Len, Value::List(items)) => length(items.len()),
        (op, other) => Err(ExecError::TypeMismatch {
            op: op.symbol().trim_end(),
            expected: match op {
                UnaryOp::Neg => "a number",
                UnaryOp::Not => "bool",
                UnaryOp::Len => "str or list",
            },
            found: other.type_name().to_string(),
        }),
    }
}

fn length(len: usize) -> Result<Value, ExecError> {
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| ExecError::Overflow { op: "len" })
}

/// Value of `and`/`or` when the left operand alone decides it.
pub fn short_circuit(op: BinaryOp, left: &Value) -> Result<Option<Value>, ExecError> {
    match op {
        BinaryOp::And => Ok((!expect_bool("and", left)?).then_some(Value::Bool(false))),
        BinaryOp::Or => Ok(expect_bool("or", left)?.then_some(Value::Bool(true))),
        _ => Ok(None),
    }
}

/// Strict binary evaluation. `and`/`or` evaluate both sides here; compiled
/// routines short-circuit before calling in.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    let symbol = op.symbol();
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Str(l), Value::Str(r)) => Ok(Value::str(format!("{l}{r}"))),
            (Value::List(l), Value::List(r)) => {
                let mut items = Vec::with_capacity(l.len() + r.len());
                items.extend(l.iter().cloned());
                items.extend(r.iter().cloned());
                Ok(Value::List(Arc::new(items)))
            }
            _ => arithmetic(symbol, left, right, i64::checked_add, |l, r| l + r),
        },
        BinaryOp::Sub => arithmetic(symbol, left, right, i64::checked_sub, |l, r| l - r),
        BinaryOp::Mul => arithmetic(symbol, left, right, i64::checked_mul, |l, r| l * r),
        BinaryOp::Div => {
            guard_zero(right)?;
            arithmetic(symbol, left, right, i64::checked_div, |l, r| l / r)
        }
        BinaryOp::Rem => {
            guard_zero(right)?;
            arithmetic(symbol, left, right, i64::checked_rem, |l, r| l % r)
        }
        BinaryOp::Eq => Ok(Value::Bool(equals(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(left, right))),
        BinaryOp::Lt => compare(symbol, left, right).map(|ord| Value::Bool(ord.is_lt())),
        BinaryOp::Le => compare(symbol, left, right).map(|ord| Value::Bool(ord.is_le())),
        BinaryOp::Gt => compare(symbol, left, right).map(|ord| Value::Bool(ord.is_gt())),
        BinaryOp::Ge => compare(symbol, left, right).map(|ord| Value::Bool(ord.is_ge())),
        BinaryOp::And => Ok(Value::Bool(
            expect_bool(symbol, left)? && expect_bool(symbol, right)?,
        )),
        BinaryOp::Or => Ok(Value::Bool(
            expect_bool(symbol, left)? || expect_bool(symbol, right)?,
        )),
    }
}

fn arithmetic(
    op: &'static str,
    left: &Value,
    right: &Value,
    ints: fn(i64, i64) -> Option<i64>,
    floats: fn(f64, f64) -> f64,
) -> Result<Value, ExecError> {
    match numbers(op, left, right)? {
        Numbers::Ints(l, r) => ints(l, r).map(Value::Int).ok_or(ExecError::Overflow { op }),
        Numbers::Floats(l, r) => Ok(Value::Float(floats(l, r))),
    }
}

fn guard_zero(divisor: &Value) -> Result<(), ExecError> {
    match divisor {
        Value::Int(0) => Err(ExecError::DivisionByZero),
        Value::Float(x) if *x == 0.0 => Err(ExecError::DivisionByZero),
        _ => Ok(()),
    }
}

/// Structural equality, except that an int and a float compare numerically.
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(i), Value::Float(x)) | (Value::Float(x), Value::Int(i)) => (*i as f64) == *x,
        _ => left == right,
    }
}

fn compare(op: &'static str, left: &Value, right: &Value) -> Result<Ordering, ExecError> {
    match (left, right) {
        (Value::Str(l), Value::Str(r)) => Ok(l.cmp(r)),
        _ => match numbers(op, left, right) {
            Ok(Numbers::Ints(l, r)) => Ok(l.cmp(&r)),
            Ok(Numbers::Floats(l, r)) => l
                .partial_cmp(&r)
                .ok_or_else(|| mismatch(op, "ordered numbers", left, right)),
            Err(_) => Err(mismatch(op, "numbers or strings", left, right)),
        },
    }
}

pub fn index(base: &Value, index: &Value) -> Result<Value, ExecError> {
    match (base, index) {
        (Value::List(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|position| items.get(position))
            .cloned()
            .ok_or(ExecError::IndexOutOfBounds {
                index: *i,
                len: items.len(),
            }),
        _ => Err(mismatch("[]", "a list and an int", base, index)),
    }
}
