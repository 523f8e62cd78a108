use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Call of a sibling function or module-level binding resolved through the
    /// routine's scope.
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
}

impl Expr {
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Visit every variable name referenced by this expression.
    pub fn for_each_var<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => visit(name),
            Expr::Unary { expr, .. } => expr.for_each_var(visit),
            Expr::Binary { left, right, .. } => {
                left.for_each_var(visit);
                right.for_each_var(visit);
            }
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.for_each_var(visit)),
            Expr::Index { base, index } => {
                base.for_each_var(visit);
                index.for_each_var(visit);
            }
            Expr::List(items) => items.iter().for_each(|item| item.for_each_var(visit)),
        }
    }

    /// First function called anywhere in this expression, if any.
    pub fn first_call(&self) -> Option<&str> {
        match self {
            Expr::Literal(_) | Expr::Var(_) => None,
            Expr::Call { callee, .. } => Some(callee),
            Expr::Unary { expr, .. } => expr.first_call(),
            Expr::Binary { left, right, .. } => left.first_call().or_else(|| right.first_call()),
            Expr::Index { base, index } => base.first_call().or_else(|| index.first_call()),
            Expr::List(items) => items.iter().find_map(Expr::first_call),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not ",
            UnaryOp::Len => "len ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        name: String,
        expr: Expr,
    },
    Assign {
        name: String,
        expr: Expr,
    },
    /// Append `value` to the list held by local `target`.
    Push {
        target: String,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    Block(Vec<Node>),
    Return(Expr),
}

impl Stmt {
    /// Name this statement binds or rebinds in its enclosing scope.
    pub fn binds(&self) -> Option<&str> {
        match self {
            Stmt::Let { name, .. } | Stmt::Assign { name, .. } => Some(name),
            Stmt::Push { target, .. } => Some(target),
            Stmt::For { var, .. } => Some(var),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u32);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A tagged group of statements. Regions do not open a variable scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub body: Vec<Node>,
}

impl Region {
    pub fn new(id: u32, body: Vec<Node>) -> Self {
        Self {
            id: RegionId(id),
            label: None,
            body,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Stmt(Stmt),
    Region(Region),
}

impl From<Stmt> for Node {
    fn from(stmt: Stmt) -> Self {
        Node::Stmt(stmt)
    }
}

impl From<Region> for Node {
    fn from(region: Region) -> Self {
        Node::Region(region)
    }
}

/// Walk every region in `body`, including regions nested in statement bodies.
/// `visit` receives the region together with its enclosing regions, outermost
/// first.
pub fn walk_regions<'a>(body: &'a [Node], visit: &mut impl FnMut(&'a Region, &[&'a Region])) {
    fn walk<'a>(
        body: &'a [Node],
        ancestors: &mut Vec<&'a Region>,
        visit: &mut impl FnMut(&'a Region, &[&'a Region]),
    ) {
        for node in body {
            match node {
                Node::Region(region) => {
                    visit(region, ancestors);
                    ancestors.push(region);
                    walk(&region.body, ancestors, visit);
                    ancestors.pop();
                }
                Node::Stmt(stmt) => match stmt {
                    Stmt::If {
                        then_body,
                        else_body,
                        ..
                    } => {
                        walk(then_body, ancestors, visit);
                        walk(else_body, ancestors, visit);
                    }
                    Stmt::For { body, .. } | Stmt::Block(body) => walk(body, ancestors, visit),
                    _ => {}
                },
            }
        }
    }

    walk(body, &mut Vec::new(), visit);
}
