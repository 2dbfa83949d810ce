//! Manifest rendering
//!
//! Two modes are supported:
//!
//! - [`ManifestRenderer::render`] fills `{{.Field}}` references from a
//!   serializable parameter record. Unknown fields are a render error.
//! - [`substitute_placeholders`] replaces `{{UPPER_SNAKE}}` markers with
//!   same-named environment variables and leaves unresolved markers verbatim.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior};
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::trace;

use crate::{Error, Result};

/// `{{.Field}}` field references, rewritten to plain `{{ Field }}` before rendering
static FIELD_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\{\{-?\s*)\.([A-Za-z_])").expect("field reference pattern is valid")
});

/// `{{UPPER_SNAKE}}` environment placeholders
static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Z0-9_]+)\}\}").expect("placeholder pattern is valid")
});

/// Where a template comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateSource {
    /// Template text held in memory
    Inline(String),
    /// Template read from a file at render time
    File(PathBuf),
}

impl TemplateSource {
    /// Inline template text
    pub fn inline(text: impl Into<String>) -> Self {
        Self::Inline(text.into())
    }

    /// Template file path
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    fn load(&self) -> Result<String> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

/// Renders manifest templates with typed parameters
pub struct ManifestRenderer {
    env: Environment<'static>,
}

impl Default for ManifestRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestRenderer {
    /// Create a renderer that fails on any undefined field
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render `source` with the fields of `params`
    pub fn render<P: Serialize>(&self, source: &TemplateSource, params: &P) -> Result<String> {
        let template = source.load()?;
        self.render_str(&template, params)
    }

    /// Render an inline template
    pub fn render_str<P: Serialize>(&self, template: &str, params: &P) -> Result<String> {
        let normalized = FIELD_REF.replace_all(template, "${1}${2}");
        let rendered = self
            .env
            .render_str(&normalized, params)
            .map_err(|e| Error::template(format!("{:#}", e)))?;
        trace!(bytes = rendered.len(), "rendered manifest");
        Ok(rendered)
    }
}

/// Replace `{{UPPER_SNAKE}}` markers with environment variable values.
///
/// Markers whose variable is unset or empty are left untouched.
pub fn substitute_placeholders(text: &str) -> String {
    substitute_placeholders_with(text, |name| std::env::var(name).ok())
}

/// Replace `{{UPPER_SNAKE}}` markers using `lookup`
pub fn substitute_placeholders_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PLACEHOLDER
        .replace_all(text, |caps: &Captures| match lookup(&caps[1]) {
            Some(value) if !value.is_empty() => value,
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Read a manifest file and substitute environment placeholders
pub fn load_manifest_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)?;
    Ok(substitute_placeholders(&raw))
}
