//! Annotated template model shared by the conversion and generation stages.

pub mod build;
pub mod nodes;
pub mod printer;
pub mod template;
pub mod value;

pub use nodes::{BinaryOp, Expr, Node, Region, RegionId, Stmt, UnaryOp, walk_regions};
pub use printer::{Printer, render_routine, render_template};
pub use template::{Action, AnnotatedTemplate, Directive};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;

    #[test]
    fn template_round_trips_through_json() {
        let template = AnnotatedTemplate::new(
            "scale",
            ["factor", "x"],
            vec![region(1, vec![ret(mul(var("x"), var("factor")))])],
        )
        .with_directive(1, Action::DropIf(eq(var("factor"), int(0))));

        let json = serde_json::to_string(&template).expect("serialize");
        let back: AnnotatedTemplate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, template);
    }
}
