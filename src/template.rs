//! Template interpolation for job files
//!
//! Handles `{{ variable }}` interpolation in job configuration so secrets and
//! per-environment table names can come from the process environment.
//! Supports `{{ env.NAME }}` and `{{ vars.name }}`.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ scope.name }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\.([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").unwrap()
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Additional variables
    pub vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context over the current process environment
    pub fn from_env() -> Self {
        Self {
            env: std::env::vars().collect(),
            vars: HashMap::new(),
        }
    }

    /// Set an environment value
    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Set an additional variable
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Get a value by scope and name (e.g., "env", "API_KEY")
    pub fn get(&self, scope: &str, name: &str) -> Option<&str> {
        match scope {
            "env" => self.env.get(name),
            "vars" => self.vars.get(name),
            _ => None,
        }
        .map(String::as_str)
    }
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut errors = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        let scope = &cap[1];
        let name = &cap[2];
        if let Some(value) = ctx.get(scope, name) {
            value.to_string()
        } else {
            errors.push(format!("{scope}.{name}"));
            String::new()
        }
    });

    if errors.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract all variable paths from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .map(|cap| format!("{}.{}", &cap[1], &cap[2]))
        .collect()
}

/// Render all string values in a YAML document
pub fn render_yaml(value: &serde_yaml::Value, ctx: &TemplateContext) -> Result<serde_yaml::Value> {
    use serde_yaml::Value;

    match value {
        Value::String(s) if has_templates(s) => Ok(Value::String(render(s, ctx)?)),
        Value::Mapping(map) => {
            let mut rendered = serde_yaml::Mapping::new();
            for (k, v) in map {
                rendered.insert(render_yaml(k, ctx)?, render_yaml(v, ctx)?);
            }
            Ok(Value::Mapping(rendered))
        }
        Value::Sequence(items) => Ok(Value::Sequence(
            items
                .iter()
                .map(|v| render_yaml(v, ctx))
                .collect::<Result<Vec<_>>>()?,
        )),
        Value::Tagged(_) => Err(Error::template("YAML tags are not supported in job files")),
        _ => Ok(value.clone()),
    }
}
