//! Reading annotated templates produced by an external directive parser.

use std::path::Path;

use anyhow::{Context, Result, bail};
use fastpath_ast::AnnotatedTemplate;

/// Load a template serialized as JSON (`.json`) or YAML (`.yaml`, `.yml`).
pub fn load_template(path: impl AsRef<Path>) -> Result<AnnotatedTemplate> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;

    let template: AnnotatedTemplate = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("invalid template JSON in {}", path.display()))?,
        Some("yaml" | "yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("invalid template YAML in {}", path.display()))?,
        _ => bail!("unsupported template format: {}", path.display()),
    };

    tracing::debug!(
        template = %template.name,
        path = %path.display(),
        directives = template.directives.len(),
        "loaded template"
    );
    Ok(template)
}

/// Write `template` as JSON or YAML, chosen by extension like
/// [`load_template`].
///
/// YAML is emitted through a JSON value so nested variants come out as
/// single-key maps, which the YAML loader reads back.
pub fn save_template(template: &AnnotatedTemplate, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::to_string_pretty(template).context("failed to serialize template")?,
        Some("yaml" | "yml") => {
            let tree = serde_json::to_value(template).context("failed to serialize template")?;
            serde_yaml::to_string(&tree).context("failed to serialize template")?
        }
        _ => bail!("unsupported template format: {}", path.display()),
    };
    std::fs::write(path, text).with_context(|| format!("failed to write template {}", path.display()))
}
