use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

const DEFAULT_REVIEW: &str = include_str!("default_prompts/review.md");

/// Known template variable names for validation.
const KNOWN_VARIABLES: &[&str] = &["files_json", "project_context"];

fn default_template(name: &str) -> Option<&'static str> {
    match name {
        "review" => Some(DEFAULT_REVIEW),
        _ => None,
    }
}

/// Prompt template engine with an embedded default and user overrides.
pub struct PromptEngine {
    override_dir: Option<String>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// Load a prompt template by name. A user override in `override_dir`
    /// takes precedence over the embedded default.
    pub fn load_template(&self, name: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(format!("{name}.md"));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        default_template(name)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown prompt template: {name}")))
    }

    /// Load a template and render it with the given variables.
    pub fn render(&self, name: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(name)?;
        render_template(&template, vars)
    }
}

/// Render a template string by substituting `{{variable}}` placeholders.
/// Errors on unknown variables (strict mode).
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut found_close = false;

            while let Some(c2) = chars.next() {
                if c2 == '}' && chars.peek() == Some(&'}') {
                    chars.next();
                    found_close = true;
                    break;
                }
                var_name.push(c2);
            }

            if !found_close {
                return Err(Error::Prompt(format!(
                    "unclosed template variable: {{{{{var_name}"
                )));
            }

            let var_name = var_name.trim();
            if !KNOWN_VARIABLES.contains(&var_name) {
                return Err(Error::Prompt(format!(
                    "unknown template variable: {var_name}"
                )));
            }

            match vars.get(var_name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(Error::Prompt(format!(
                        "missing value for template variable: {var_name}"
                    )));
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_review() {
        let engine = PromptEngine::new(None);
        let template = engine.load_template("review").unwrap();
        assert!(template.contains("Change-Set Review Agent"));
        assert!(template.contains("{{files_json}}"));
        assert!(template.contains("{{project_context}}"));
    }

    #[test]
    fn test_load_unknown_template() {
        let engine = PromptEngine::new(None);
        let err = engine.load_template("deploy").unwrap_err();
        assert!(err.to_string().contains("unknown prompt template"));
    }

    #[test]
    fn test_override_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("review.md"), "Custom: {{files_json}}").unwrap();

        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        let template = engine.load_template("review").unwrap();
        assert_eq!(template, "Custom: {{files_json}}");
    }

    #[test]
    fn test_override_fallback_to_default() {
        let dir = TempDir::new().unwrap();
        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        let template = engine.load_template("review").unwrap();
        assert!(template.contains("Change-Set Review Agent"));
    }

    #[test]
    fn test_render_basic_substitution() {
        let mut vars = HashMap::new();
        vars.insert("files_json".to_string(), "[]".to_string());
        vars.insert("project_context".to_string(), "a web app".to_string());

        let result =
            render_template("Files: {{files_json}} ({{project_context}})", &vars).unwrap();
        assert_eq!(result, "Files: [] (a web app)");
    }

    #[test]
    fn test_render_with_whitespace_in_braces() {
        let mut vars = HashMap::new();
        vars.insert("files_json".to_string(), "[]".to_string());
        assert_eq!(render_template("{{ files_json }}", &vars).unwrap(), "[]");
    }

    #[test]
    fn test_render_unknown_variable_errors() {
        let err = render_template("{{nope}}", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown template variable"));
    }

    #[test]
    fn test_render_missing_value_errors() {
        let err = render_template("{{files_json}}", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("missing value"));
    }

    #[test]
    fn test_render_unclosed_variable() {
        let err = render_template("{{files_json", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unclosed template variable"));
    }

    #[test]
    fn test_render_single_brace_passthrough() {
        let result = render_template("JSON: {\"key\": 1}", &HashMap::new()).unwrap();
        assert_eq!(result, "JSON: {\"key\": 1}");
    }

    #[test]
    fn test_render_end_to_end() {
        let engine = PromptEngine::new(None);
        let mut vars = HashMap::new();
        vars.insert(
            "files_json".to_string(),
            r#"[{"filename":"a.py"}]"#.to_string(),
        );
        vars.insert("project_context".to_string(), String::new());

        let result = engine.render("review", &vars).unwrap();
        assert!(result.contains(r#"[{"filename":"a.py"}]"#));
        assert!(!result.contains("{{files_json}}"));
    }
}
