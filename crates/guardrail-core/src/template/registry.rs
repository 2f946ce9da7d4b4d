//! Template storage and placeholder substitution.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::defaults::DEFAULT_TEMPLATES;

lazy_static! {
    /// `{identifier}` placeholders, plus the `{{` and `}}` brace escapes.
    static ref PLACEHOLDER_PATTERN: Regex =
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Substitution variables for a template.
pub type Variables = BTreeMap<String, String>;

/// Build a [`Variables`] map from key/value pairs.
///
/// ```
/// use guardrail_core::template::variables;
///
/// let vars = variables([("question", "What is Rust?")]);
/// assert_eq!(vars["question"], "What is Rust?");
/// ```
pub fn variables<I, K, V>(pairs: I) -> Variables
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Errors from template lookup, rendering and loading.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unknown template: '{name}'. Available: {available:?}")]
    UnknownTemplate { name: String, available: Vec<String> },

    #[error("Template '{template}' requires variable '{variable}'")]
    MissingVariable { template: String, variable: String },

    #[error("Failed to read template file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML templates: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON templates: {0}")]
    Json(#[from] serde_json::Error),
}

impl TemplateError {
    /// Whether this error points at the template source rather than the caller's variables.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, TemplateError::MissingVariable { .. })
    }
}

/// Immutable name -> template mapping.
///
/// Built once at startup (defaults, a file, or both merged) and only read
/// afterwards. All builder methods consume `self`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, String>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in templates.
    pub fn with_defaults() -> Self {
        DEFAULT_TEMPLATES
            .iter()
            .fold(Self::new(), |registry, (name, body)| {
                registry.with_template(*name, *body)
            })
    }

    /// Add or replace a template.
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    /// Overlay another registry; its templates win on name clashes.
    pub fn merge(mut self, other: TemplateRegistry) -> Self {
        self.templates.extend(other.templates);
        self
    }

    /// Parse a YAML mapping of template names to bodies.
    pub fn from_yaml(yaml: &str) -> Result<Self, TemplateError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a JSON object of template names to bodies.
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load templates from a file. `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Get a raw template by name.
    pub fn get(&self, name: &str) -> Result<&str, TemplateError> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                name: name.to_string(),
                available: self.names().into_iter().map(str::to_string).collect(),
            })
    }

    /// Whether a template with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Variables the named template needs, in order of first appearance.
    pub fn placeholders(&self, name: &str) -> Result<Vec<String>, TemplateError> {
        Ok(placeholders(self.get(name)?))
    }

    /// Render the named template.
    ///
    /// Fails with [`TemplateError::UnknownTemplate`] if the name is not
    /// registered and with [`TemplateError::MissingVariable`] for the first
    /// placeholder that has no entry in `variables`. Extra variables are
    /// ignored.
    pub fn format(&self, name: &str, variables: &Variables) -> Result<String, TemplateError> {
        render(name, self.get(name)?, variables)
    }
}

/// Placeholder names in `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_PATTERN.captures_iter(template) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Render a template body. `name` is only used for error reporting.
///
/// Substitution is single-pass: text coming from a variable is never
/// scanned for further placeholders.
pub fn render(name: &str, template: &str, variables: &Variables) -> Result<String, TemplateError> {
    if let Some(variable) = placeholders(template)
        .into_iter()
        .find(|p| !variables.contains_key(p))
    {
        return Err(TemplateError::MissingVariable {
            template: name.to_string(),
            variable,
        });
    }

    let rendered = PLACEHOLDER_PATTERN.replace_all(template, |caps: &Captures| match caps.get(1) {
        Some(var) => variables
            .get(var.as_str())
            .cloned()
            .unwrap_or_default(),
        // `{{` -> `{`, `}}` -> `}`
        None => caps[0][..1].to_string(),
    });

    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_qa() {
        let registry = TemplateRegistry::with_defaults();
        let prompt = registry
            .format("qa", &variables([("question", "What is Rust?")]))
            .unwrap();

        assert!(prompt.starts_with("Question: What is Rust?"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_unknown_template_lists_available() {
        let registry = TemplateRegistry::with_defaults();
        let err = registry.format("poem", &Variables::new()).unwrap_err();

        match &err {
            TemplateError::UnknownTemplate { name, available } => {
                assert_eq!(name, "poem");
                assert!(available.contains(&"qa".to_string()));
            }
            other => panic!("Expected UnknownTemplate, got {other:?}"),
        }
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_variable() {
        let registry = TemplateRegistry::with_defaults();
        let err = registry
            .format("classify", &variables([("text", "hello")]))
            .unwrap_err();

        assert!(matches!(
            &err,
            TemplateError::MissingVariable { template, variable }
                if template == "classify" && variable == "categories"
        ));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_extra_variables_ignored() {
        let registry = TemplateRegistry::new().with_template("greet", "Hi {name}");
        let prompt = registry
            .format("greet", &variables([("name", "Ada"), ("unused", "x")]))
            .unwrap();
        assert_eq!(prompt, "Hi Ada");
    }

    #[test]
    fn test_brace_escapes() {
        let registry = TemplateRegistry::new().with_template("json", "Return {{\"k\": \"{value}\"}}");
        let prompt = registry
            .format("json", &variables([("value", "v")]))
            .unwrap();
        assert_eq!(prompt, "Return {\"k\": \"v\"}");
    }

    #[test]
    fn test_substitution_is_single_pass() {
        let registry = TemplateRegistry::new().with_template("echo", "{a}");
        let prompt = registry
            .format("echo", &variables([("a", "{b}")]))
            .unwrap();
        assert_eq!(prompt, "{b}");
    }

    #[test]
    fn test_placeholders_in_order() {
        let registry = TemplateRegistry::with_defaults();
        assert_eq!(
            registry.placeholders("json_extract").unwrap(),
            vec!["required_keys".to_string(), "text".to_string()]
        );
        assert_eq!(placeholders("{x} {y} {x}"), vec!["x", "y"]);
    }

    #[test]
    fn test_non_identifier_braces_are_literal() {
        assert!(placeholders(r#"{"name": 1}"#).is_empty());
        let out = render("t", r#"{"name": 1}"#, &Variables::new()).unwrap();
        assert_eq!(out, r#"{"name": 1}"#);
    }

    #[test]
    fn test_from_yaml_and_merge() {
        let yaml = r#"
qa: "Q: {question}"
summary: "Summarize: {text}"
"#;
        let custom = TemplateRegistry::from_yaml(yaml).unwrap();
        let registry = TemplateRegistry::with_defaults().merge(custom);

        assert!(registry.contains("summary"));
        assert_eq!(registry.get("qa").unwrap(), "Q: {question}");
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_from_json() {
        let registry = TemplateRegistry::from_json(r#"{"hello": "Hello {name}"}"#).unwrap();
        assert_eq!(registry.names(), vec!["hello"]);
    }

    #[test]
    fn test_from_yaml_rejects_non_mapping() {
        let result = TemplateRegistry::from_yaml("- just\n- a list\n");
        assert!(matches!(result, Err(TemplateError::Yaml(_))));
    }
}
