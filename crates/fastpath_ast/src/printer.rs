//! Deterministic pseudo-source rendering of templates and specialized bodies.
//!
//! The output is meant for people (logs, introspection, snapshot tests); it is
//! never parsed back.

use std::fmt::{self, Write as _};

use crate::nodes::{Expr, Node, Stmt};
use crate::template::{Action, AnnotatedTemplate};

const INDENT: &str = "    ";

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Var(name) => f.write_str(name),
            Expr::Unary { op, expr } => write!(f, "{}{expr}", op.symbol()),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Index { base, index } => write!(f, "{base}[{index}]"),
            Expr::List(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (position, item) in items.iter().enumerate() {
        if position > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Line-oriented writer shared by the template and routine renderers.
pub struct Printer<'t> {
    out: String,
    depth: usize,
    template: Option<&'t AnnotatedTemplate>,
}

impl<'t> Printer<'t> {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
            template: None,
        }
    }

    /// Annotate regions with the directive `template` attaches to them.
    pub fn for_template(template: &'t AnnotatedTemplate) -> Self {
        Self {
            template: Some(template),
            ..Self::new()
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    pub fn line(&mut self, text: impl fmt::Display) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        // Writing into a String cannot fail.
        let _ = writeln!(self.out, "{text}");
    }

    pub fn open(&mut self, header: impl fmt::Display) {
        self.line(format_args!("{header} {{"));
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Close the current block and open a sibling on the same line: `} else {`.
    pub fn reopen(&mut self, header: impl fmt::Display) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("}} {header} {{"));
        self.depth += 1;
    }

    pub fn body(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.node(node);
        }
    }

    pub fn node(&mut self, node: &Node) {
        match node {
            Node::Stmt(stmt) => self.stmt(stmt),
            Node::Region(region) => {
                let action = self
                    .template
                    .and_then(|template| template.directive_for(region.id));
                let header = match (action, &region.label) {
                    (Some(Action::DropIf(cond)), _) => {
                        format!("region {} drop_if {cond}", region.id)
                    }
                    (Some(action), _) => format!("region {} @{}", region.id, action.name()),
                    (None, Some(label)) => format!("region {} {label:?}", region.id),
                    (None, None) => format!("region {}", region.id),
                };
                self.open(header);
                self.body(&region.body);
                self.close();
            }
        }
    }

    pub fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, expr } => self.line(format_args!("let {name} = {expr};")),
            Stmt::Assign { name, expr } => self.line(format_args!("{name} = {expr};")),
            Stmt::Push { target, value } => self.line(format_args!("{target}.push({value});")),
            Stmt::Expr(expr) => self.line(format_args!("{expr};")),
            Stmt::Return(expr) => self.line(format_args!("return {expr};")),
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.open(format_args!("if {cond}"));
                self.body(then_body);
                if !else_body.is_empty() {
                    self.reopen("else");
                    self.body(else_body);
                }
                self.close();
            }
            Stmt::For {
                var,
                iterable,
                body,
            } => {
                self.open(format_args!("for {var} in {iterable}"));
                self.body(body);
                self.close();
            }
            Stmt::Block(body) => {
                self.line("{");
                self.depth += 1;
                self.body(body);
                self.close();
            }
        }
    }
}

impl Default for Printer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a routine definition: `fn name(params) { body }`.
pub fn render_routine(name: &str, params: &[String], body: &[Node]) -> String {
    let mut printer = Printer::new();
    printer.open(format_args!("fn {name}({})", params.join(", ")));
    printer.body(body);
    printer.close();
    printer.finish()
}

/// Render an annotated template with its directives inline.
pub fn render_template(template: &AnnotatedTemplate) -> String {
    let mut printer = Printer::for_template(template);
    printer.open(format_args!(
        "template {}({})",
        template.name,
        template.params.join(", ")
    ));
    printer.body(&template.body);
    printer.close();
    printer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;
    use crate::nodes::BinaryOp;

    #[test]
    fn renders_nested_control_flow() {
        let body = vec![
            let_("total", int(0)),
            for_(
                "item",
                var("items"),
                vec![if_(
                    gt(var("item"), int(3)),
                    vec![assign("total", add(var("total"), var("item")))],
                    vec![push("skipped", var("item"))],
                )],
            ),
            ret(binary(BinaryOp::Sub, var("total"), int(1))),
        ];

        let text = render_routine("sum_big", &["items".to_string()], &body);
        let expected = "\
fn sum_big(items) {
    let total = 0;
    for item in items {
        if (item > 3) {
            total = (total + item);
        } else {
            skipped.push(item);
        }
    }
    return (total - 1);
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn template_rendering_shows_directives() {
        let template = AnnotatedTemplate::new(
            "clamp",
            ["threshold", "x"],
            vec![region(1, vec![ret(var("x"))])],
        )
        .with_directive(1, Action::Inline);

        let text = render_template(&template);
        assert!(text.contains("region #1 @inline {"), "{text}");
    }
}
