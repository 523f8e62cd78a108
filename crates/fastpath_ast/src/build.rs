//! Terse constructors for writing templates by hand.
//!
//! ```
//! use fastpath_ast::build::*;
//! use fastpath_ast::BinaryOp;
//!
//! let body = vec![
//!     let_("limit", binary(BinaryOp::Mul, var("threshold"), int(2))),
//!     ret(var("limit")),
//! ];
//! assert_eq!(body.len(), 2);
//! ```

use crate::nodes::{BinaryOp, Expr, Node, Region, Stmt, UnaryOp};
use crate::value::Value;

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

pub fn int(value: i64) -> Expr {
    Expr::Literal(Value::Int(value))
}

pub fn var(name: impl Into<String>) -> Expr {
    Expr::Var(name.into())
}

pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
    Expr::Unary {
        op,
        expr: Box::new(expr),
    }
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Add, left, right)
}

pub fn mul(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Mul, left, right)
}

pub fn gt(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Gt, left, right)
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Eq, left, right)
}

pub fn call<S: Into<String>>(callee: S, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: callee.into(),
        args,
    }
}

pub fn index(base: Expr, index: Expr) -> Expr {
    Expr::Index {
        base: Box::new(base),
        index: Box::new(index),
    }
}

pub fn list(items: Vec<Expr>) -> Expr {
    Expr::List(items)
}

pub fn let_(name: impl Into<String>, expr: Expr) -> Node {
    Node::Stmt(Stmt::Let {
        name: name.into(),
        expr,
    })
}

pub fn assign(name: impl Into<String>, expr: Expr) -> Node {
    Node::Stmt(Stmt::Assign {
        name: name.into(),
        expr,
    })
}

pub fn push(target: impl Into<String>, value: Expr) -> Node {
    Node::Stmt(Stmt::Push {
        target: target.into(),
        value,
    })
}

pub fn expr(expr: Expr) -> Node {
    Node::Stmt(Stmt::Expr(expr))
}

pub fn ret(expr: Expr) -> Node {
    Node::Stmt(Stmt::Return(expr))
}

pub fn if_(cond: Expr, then_body: Vec<Node>, else_body: Vec<Node>) -> Node {
    Node::Stmt(Stmt::If {
        cond,
        then_body,
        else_body,
    })
}

pub fn for_(var: impl Into<String>, iterable: Expr, body: Vec<Node>) -> Node {
    Node::Stmt(Stmt::For {
        var: var.into(),
        iterable,
        body,
    })
}

pub fn block(body: Vec<Node>) -> Node {
    Node::Stmt(Stmt::Block(body))
}

pub fn region(id: u32, body: Vec<Node>) -> Node {
    Node::Region(Region::new(id, body))
}
