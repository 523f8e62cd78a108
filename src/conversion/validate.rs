//! Load-time checks that need the whole template at once. Checks that depend
//! on the position of an expression run during lowering instead.

use std::collections::{HashMap, HashSet};

use fastpath_ast::{Action, AnnotatedTemplate, Node, RegionId, Stmt, walk_regions};

use crate::errors::TemplateError;
use crate::utils::suggest::find_best_match;

pub(crate) type DirectiveMap<'t> = HashMap<RegionId, &'t Action>;

pub(crate) fn validate<'t>(
    template: &'t AnnotatedTemplate,
    stable: &[String],
) -> Result<DirectiveMap<'t>, TemplateError> {
    check_params(template, stable)?;
    let directives = check_directives(template)?;
    check_bindings(&template.body, stable)?;
    Ok(directives)
}

fn check_params(template: &AnnotatedTemplate, stable: &[String]) -> Result<(), TemplateError> {
    let mut seen = HashSet::new();
    for param in &template.params {
        if !seen.insert(param.as_str()) {
            return Err(TemplateError::DuplicateParam {
                template: template.name.clone(),
                name: param.clone(),
            });
        }
    }

    for name in stable {
        if !seen.contains(name.as_str()) {
            return Err(TemplateError::UnknownStableParam {
                template: template.name.clone(),
                name: name.clone(),
                suggestion: find_best_match(name, template.params.iter().map(String::as_str)),
            });
        }
    }
    Ok(())
}

fn check_directives(template: &AnnotatedTemplate) -> Result<DirectiveMap<'_>, TemplateError> {
    let mut regions = HashSet::new();
    let mut duplicate = None;
    walk_regions(&template.body, &mut |region, _| {
        if !regions.insert(region.id) && duplicate.is_none() {
            duplicate = Some(region.id);
        }
    });
    if let Some(region) = duplicate {
        return Err(TemplateError::DuplicateRegion { region });
    }

    let mut directives: DirectiveMap<'_> = HashMap::new();
    for directive in &template.directives {
        if !regions.contains(&directive.region) {
            return Err(TemplateError::UnknownRegion {
                region: directive.region,
                action: directive.action.name(),
            });
        }
        if let Some(first) = directives.insert(directive.region, &directive.action) {
            return Err(TemplateError::ConflictingDirectives {
                region: directive.region,
                first: first.name(),
                second: directive.action.name(),
            });
        }
    }

    let mut conflict = None;
    walk_regions(&template.body, &mut |region, ancestors| {
        let Some(action) = directives.get(&region.id) else {
            return;
        };
        let killed = ancestors
            .iter()
            .any(|ancestor| matches!(directives.get(&ancestor.id), Some(Action::Kill)));
        if killed && conflict.is_none() {
            conflict = Some(TemplateError::ConflictingDirectives {
                region: region.id,
                first: "kill",
                second: action.name(),
            });
        }
    });
    match conflict {
        Some(err) => Err(err),
        None => Ok(directives),
    }
}

/// Stable inputs become constants in every specialization, so nothing may
/// rebind them.
pub(crate) fn check_bindings(body: &[Node], stable: &[String]) -> Result<(), TemplateError> {
    for node in body {
        match node {
            Node::Region(region) => check_bindings(&region.body, stable)?,
            Node::Stmt(stmt) => {
                if let Some(name) = stmt.binds() {
                    if stable.iter().any(|param| param == name) {
                        return Err(TemplateError::StableAssignment {
                            name: name.to_string(),
                        });
                    }
                }
                match stmt {
                    Stmt::If {
                        then_body,
                        else_body,
                        ..
                    } => {
                        check_bindings(then_body, stable)?;
                        check_bindings(else_body, stable)?;
                    }
                    Stmt::For { body, .. } | Stmt::Block(body) => check_bindings(body, stable)?,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
