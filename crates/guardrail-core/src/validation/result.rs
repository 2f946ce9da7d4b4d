//! The traced result of a validation call.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A parsed JSON object.
pub type JsonObject = Map<String, Value>;

/// Error message when no JSON object could be parsed.
pub const INVALID_JSON: &str = "invalid JSON";

/// Error message when required keys are absent.
pub const MISSING_REQUIRED_KEYS: &str = "missing required keys";

/// Error message when keys outside the schema are present.
pub const UNEXPECTED_KEYS: &str = "unexpected keys present";

/// Outcome of validating model output, with the full trace of checks.
///
/// `success` is true exactly when `data` is present. Failures are data,
/// not errors: the caller branches on `success` and can show
/// `validation_steps` to explain what went wrong.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult<T = JsonObject> {
    /// Whether every check passed
    pub success: bool,

    /// Validated value (only on success)
    pub data: Option<T>,

    /// Short failure label (only on failure)
    pub error: Option<String>,

    /// The text that was validated
    pub raw_text: String,

    /// Every check performed, in order
    pub validation_steps: Vec<String>,
}

impl<T> ParseResult<T> {
    pub(crate) fn passed(data: T, raw_text: &str, validation_steps: Vec<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            raw_text: raw_text.to_string(),
            validation_steps,
        }
    }

    pub(crate) fn failed(
        error: impl Into<String>,
        raw_text: &str,
        validation_steps: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            raw_text: raw_text.to_string(),
            validation_steps,
        }
    }

    /// Convert into a `Result` for callers that prefer `?`.
    pub fn into_result(self) -> Result<T, ValidationError> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(ValidationError {
                error: self.error.unwrap_or_else(|| INVALID_JSON.to_string()),
                validation_steps: self.validation_steps,
            }),
        }
    }
}

/// A failed validation, detached from its [`ParseResult`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed: {error}")]
pub struct ValidationError {
    pub error: String,
    pub validation_steps: Vec<String>,
}
