//! Template interpolation
//!
//! Handles `{{ variable }}` interpolation in configuration files and in
//! entity path templates. Supports `{{ env.NAME }}` for environment variables
//! and dotted access into caller-supplied variables, e.g. `{{ entity }}`.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}")
        .expect("template regex is valid")
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Environment variables visible under `env.*`
    env: HashMap<String, String>,
    /// Additional variables resolved at the top level
    vars: Value,
    /// Leave non-`env.*` placeholders untouched instead of failing
    env_only: bool,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context exposing the current process environment under `env.*`
    pub fn from_env() -> Self {
        Self {
            env: std::env::vars().collect(),
            vars: Value::Null,
            env_only: false,
        }
    }

    /// Create a context with top-level variables
    pub fn with_vars(vars: Value) -> Self {
        Self {
            env: HashMap::new(),
            vars,
            env_only: false,
        }
    }

    /// Only resolve `env.*` placeholders; others survive for a later pass
    ///
    /// Config files use this so `{{ entity }}` in path templates is kept
    /// until an entity name is known.
    pub fn env_only(mut self) -> Self {
        self.env_only = true;
        self
    }

    /// Set an environment variable visible to templates
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set additional variables
    pub fn set_vars(&mut self, vars: Value) -> &mut Self {
        self.vars = vars;
        self
    }

    /// Resolve a variable path to its string form
    fn lookup(&self, path: &str) -> Option<String> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            ["env", name] => self.env.get(*name).cloned(),
            _ => get_nested_value(&self.vars, &parts).map(value_to_string),
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        let var_path = &cap[1];
        if ctx.env_only && !var_path.starts_with("env.") {
            return cap[0].to_string();
        }
        ctx.lookup(var_path).unwrap_or_else(|| {
            missing.push(var_path.to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON tree
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) if has_templates(s) => Ok(Value::String(render(s, ctx)?)),
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                new_map.insert(k.clone(), render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let new_arr: Result<Vec<Value>> = arr.iter().map(|v| render_value(v, ctx)).collect();
            Ok(Value::Array(new_arr?))
        }
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_substitution() {
        let ctx = TemplateContext::with_vars(json!({"entity": "inventory"}));
        let result = render("/{{ entity }}/describe/", &ctx).unwrap();
        assert_eq!(result, "/inventory/describe/");
    }

    #[test]
    fn test_env_substitution() {
        let mut ctx = TemplateContext::new();
        ctx.set_env("TAP_PASSWORD", "hunter2");

        let result = render("{{ env.TAP_PASSWORD }}", &ctx).unwrap();
        assert_eq!(result, "hunter2");
    }

    #[test]
    fn test_nested_value() {
        let ctx = TemplateContext::with_vars(json!({
            "account": {"id": 7, "region": "eu"}
        }));

        let result = render("/accounts/{{ account.id }}/{{ account.region }}", &ctx).unwrap();
        assert_eq!(result, "/accounts/7/eu");
    }

    #[test]
    fn test_undefined_variable() {
        let ctx = TemplateContext::new();
        let result = render("{{ env.MISSING_VAR }}", &ctx);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("env.MISSING_VAR"));
    }

    #[test]
    fn test_no_templates() {
        let ctx = TemplateContext::new();
        let result = render("plain string without templates", &ctx).unwrap();
        assert_eq!(result, "plain string without templates");
    }

    #[test]
    fn test_has_templates() {
        assert!(has_templates("{{ env.KEY }}"));
        assert!(has_templates("prefix {{ entity }} suffix"));
        assert!(!has_templates("no templates here"));
        assert!(!has_templates("{ not a template }"));
    }

    #[test]
    fn test_render_value_tree() {
        let mut ctx = TemplateContext::new();
        ctx.set_env("USER", "svc");

        let input = json!({
            "auth": {"type": "basic", "username": "{{ env.USER }}"},
            "list": ["{{ env.USER }}", 3]
        });

        let result = render_value(&input, &ctx).unwrap();
        assert_eq!(
            result,
            json!({
                "auth": {"type": "basic", "username": "svc"},
                "list": ["svc", 3]
            })
        );
    }

    #[test]
    fn test_env_only_keeps_other_placeholders() {
        let mut ctx = TemplateContext::new().env_only();
        ctx.set_env("HOST", "api.local");

        let result = render("https://{{ env.HOST }}/{{ entity }}/", &ctx).unwrap();
        assert_eq!(result, "https://api.local/{{ entity }}/");

        assert!(render("{{ env.NOPE }}", &ctx).is_err());
    }

    #[test]
    fn test_whitespace_in_template() {
        let ctx = TemplateContext::with_vars(json!({"entity": "item"}));

        assert_eq!(render("{{entity}}", &ctx).unwrap(), "item");
        assert_eq!(render("{{ entity }}", &ctx).unwrap(), "item");
        assert_eq!(render("{{  entity  }}", &ctx).unwrap(), "item");
    }
}
