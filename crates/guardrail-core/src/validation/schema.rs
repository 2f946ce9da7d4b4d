//! Required/forbidden key validation for JSON model output.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::extract::{default_strategies, ExtractionStrategy, StrictParse};
use super::result::{ParseResult, INVALID_JSON, MISSING_REQUIRED_KEYS, UNEXPECTED_KEYS};

/// Key constraints for a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Keys that must be present
    #[serde(default)]
    pub required_keys: BTreeSet<String>,

    /// Whether keys outside `required_keys` are tolerated
    #[serde(default)]
    pub allow_extra_keys: bool,
}

impl ObjectSchema {
    /// Strict schema: exactly these keys.
    pub fn new<I, K>(required_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            required_keys: required_keys.into_iter().map(Into::into).collect(),
            allow_extra_keys: false,
        }
    }

    /// Allow or forbid keys beyond the required ones.
    pub fn allow_extra_keys(mut self, allow: bool) -> Self {
        self.allow_extra_keys = allow;
        self
    }
}

/// Validates raw model output against an [`ObjectSchema`].
///
/// # Validation Steps
/// 1. Extract a JSON object (strategies tried in order)
/// 2. Every required key is present
/// 3. No unexpected keys (unless allowed, or no keys are required)
///
/// Every check is appended to `validation_steps`, pass or fail. The
/// validator is pure: the same input always yields the same result,
/// including step order.
pub struct SchemaValidator {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl SchemaValidator {
    /// Validator with lenient extraction (strict parse, then bracket match).
    pub fn new() -> Self {
        Self::with_strategies(default_strategies())
    }

    /// Validator that only accepts text that is entirely one JSON object.
    pub fn strict() -> Self {
        Self::with_strategies(vec![Box::new(StrictParse)])
    }

    /// Validator with a custom extraction chain.
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Names of the configured strategies, in order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Validate against an [`ObjectSchema`].
    pub fn validate_schema(&self, raw_text: &str, schema: &ObjectSchema) -> ParseResult {
        self.validate(raw_text, &schema.required_keys, schema.allow_extra_keys)
    }

    /// Validate `raw_text` against a set of required keys.
    ///
    /// With an empty `required_keys` only the structural parse is checked.
    pub fn validate<I, K>(&self, raw_text: &str, required_keys: I, allow_extra_keys: bool) -> ParseResult
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let required: BTreeSet<String> = required_keys
            .into_iter()
            .map(|k| k.as_ref().to_string())
            .collect();
        let mut steps = Vec::new();

        if raw_text.trim().is_empty() {
            steps.push("parse failed: input is empty".to_string());
            return ParseResult::failed(INVALID_JSON, raw_text, steps);
        }

        let mut parsed = None;
        let mut last_reason = None;
        for strategy in &self.strategies {
            match strategy.extract(raw_text) {
                Ok(extracted) => {
                    steps.push(format!(
                        "{} succeeded (object at char {})",
                        strategy.name(),
                        extracted.offset
                    ));
                    parsed = Some(extracted.object);
                    break;
                }
                Err(reason) => {
                    steps.push(format!("{} failed: {}", strategy.name(), reason));
                    last_reason = Some(reason);
                }
            }
        }

        let Some(object) = parsed else {
            let reason = last_reason.unwrap_or_else(|| "no extraction strategy configured".to_string());
            steps.push(format!("parse failed: {reason}"));
            tracing::debug!(error = INVALID_JSON, "JSON validation failed");
            return ParseResult::failed(INVALID_JSON, raw_text, steps);
        };
        steps.push("parsed successfully".to_string());

        if !required.is_empty() {
            let missing: Vec<&String> = required
                .iter()
                .filter(|k| !object.contains_key(k.as_str()))
                .collect();
            if !missing.is_empty() {
                steps.extend(missing.iter().map(|k| format!("missing key: {k}")));
                tracing::debug!(missing = missing.len(), "JSON validation failed");
                return ParseResult::failed(MISSING_REQUIRED_KEYS, raw_text, steps);
            }
            steps.push(format!("all {} required keys present", required.len()));

            if !allow_extra_keys {
                let extra: Vec<&String> = object
                    .keys()
                    .filter(|k| !required.contains(k.as_str()))
                    .collect();
                if !extra.is_empty() {
                    steps.extend(extra.iter().map(|k| format!("unexpected key: {k}")));
                    tracing::debug!(unexpected = extra.len(), "JSON validation failed");
                    return ParseResult::failed(UNEXPECTED_KEYS, raw_text, steps);
                }
                steps.push("no unexpected keys".to_string());
            }
        }

        steps.push("validation passed".to_string());
        ParseResult::passed(object, raw_text, steps)
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

/// Validate with the default lenient [`SchemaValidator`].
pub fn validate<I, K>(raw_text: &str, required_keys: I, allow_extra_keys: bool) -> ParseResult
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    SchemaValidator::new().validate(raw_text, required_keys, allow_extra_keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NO_KEYS: [&str; 0] = [];

    #[test]
    fn test_exact_keys_pass() {
        let result = validate(
            r#"{"name":"Alice","age":28,"location":"NYC"}"#,
            ["name", "age", "location"],
            false,
        );

        assert!(result.success);
        assert_eq!(result.error, None);
        assert_eq!(
            serde_json::Value::Object(result.data.unwrap()),
            json!({"name": "Alice", "age": 28, "location": "NYC"})
        );
        assert_eq!(result.validation_steps.last().unwrap(), "validation passed");
        assert!(result
            .validation_steps
            .contains(&"parsed successfully".to_string()));
    }

    #[test]
    fn test_missing_key_with_prose() {
        let result = validate(
            r#"I think the answer is {"name":"Bob"}"#,
            ["name", "age"],
            false,
        );

        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error.as_deref(), Some(MISSING_REQUIRED_KEYS));
        assert!(result
            .validation_steps
            .contains(&"missing key: age".to_string()));
        assert!(result
            .validation_steps
            .contains(&"bracket match succeeded (object at char 22)".to_string()));
    }

    #[test]
    fn test_unexpected_keys() {
        let result = validate(r#"{"name":"Ann","age":3,"pet":"cat"}"#, ["name", "age"], false);

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(UNEXPECTED_KEYS));
        assert!(result
            .validation_steps
            .contains(&"unexpected key: pet".to_string()));
    }

    #[test]
    fn test_extra_keys_allowed() {
        let result = validate(r#"{"name":"Ann","pet":"cat"}"#, ["name"], true);
        assert!(result.success);
        assert!(!result
            .validation_steps
            .iter()
            .any(|s| s.starts_with("unexpected key")));
    }

    #[test]
    fn test_invalid_json() {
        let result = validate("Sorry, I can't help with that.", ["name"], false);

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(INVALID_JSON));
        assert!(result
            .validation_steps
            .last()
            .unwrap()
            .starts_with("parse failed: "));
        assert_eq!(result.raw_text, "Sorry, I can't help with that.");
    }

    #[test]
    fn test_empty_input() {
        let result = validate("   \n", ["name"], false);
        assert_eq!(result.error.as_deref(), Some(INVALID_JSON));
        assert_eq!(result.validation_steps, vec!["parse failed: input is empty"]);
    }

    #[test]
    fn test_empty_required_keys_only_parses() {
        let result = validate(r#"{"anything": 1, "else": 2}"#, NO_KEYS, false);
        assert!(result.success);
        assert_eq!(
            result.validation_steps,
            vec![
                "strict parse succeeded (object at char 0)",
                "parsed successfully",
                "validation passed",
            ]
        );
    }

    #[test]
    fn test_required_key_order_is_irrelevant() {
        let a = validate(r#"{"b":1,"a":2}"#, ["a", "b"], false);
        let b = validate(r#"{"a":2,"b":1}"#, ["b", "a"], false);
        assert!(a.success && b.success);
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_missing_keys_reported_in_sorted_order() {
        let result = validate("{}", ["zeta", "alpha"], false);
        let missing: Vec<&String> = result
            .validation_steps
            .iter()
            .filter(|s| s.starts_with("missing key"))
            .collect();
        assert_eq!(missing, vec!["missing key: alpha", "missing key: zeta"]);
    }

    #[test]
    fn test_strict_validator_rejects_prose() {
        let result = SchemaValidator::strict().validate(
            r#"Here: {"name":"Bob"}"#,
            ["name"],
            false,
        );
        assert_eq!(result.error.as_deref(), Some(INVALID_JSON));
        assert!(!result
            .validation_steps
            .iter()
            .any(|s| s.starts_with("bracket match")));
    }

    #[test]
    fn test_no_strategies() {
        let result = SchemaValidator::with_strategies(Vec::new()).validate("{}", NO_KEYS, false);
        assert_eq!(
            result.validation_steps,
            vec!["parse failed: no extraction strategy configured"]
        );
    }

    #[test]
    fn test_top_level_array_is_not_an_object() {
        let result = SchemaValidator::strict().validate("[1,2,3]", NO_KEYS, false);
        assert!(!result.success);
        assert!(result
            .validation_steps
            .contains(&"parse failed: expected a JSON object, found an array".to_string()));
    }

    #[test]
    fn test_validate_schema() {
        let schema = ObjectSchema::new(["name"]).allow_extra_keys(true);
        let result = SchemaValidator::new().validate_schema(r#"{"name":"x","y":1}"#, &schema);
        assert!(result.success);
    }

    #[test]
    fn test_schema_from_yaml() {
        let schema: ObjectSchema =
            serde_yaml::from_str("required_keys: [name, age]\nallow_extra_keys: true\n").unwrap();
        assert_eq!(schema, ObjectSchema::new(["name", "age"]).allow_extra_keys(true));
    }
}
