//! Pipeline errors.
//!
//! Only failures that no retry can fix are errors. Transport failures are
//! retried and end up in a [`RetryOutcome`](guardrail_core::RetryOutcome);
//! validation failures are data in a [`ParseResult`](guardrail_core::ParseResult).

use guardrail_core::TemplateError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::providers::ProviderError;

/// Fatal pipeline errors, returned before any model call is made.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing credential, unknown template, unreadable config
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A template placeholder had no variable
    #[error("Format error: {0}")]
    Format(TemplateError),

    /// The blocking runtime could not be started
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<TemplateError> for PipelineError {
    fn from(err: TemplateError) -> Self {
        if err.is_configuration() {
            PipelineError::Configuration(err.to_string())
        } else {
            PipelineError::Format(err)
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_is_format_error() {
        let err: PipelineError = TemplateError::MissingVariable {
            template: "qa".to_string(),
            variable: "question".to_string(),
        }
        .into();

        assert!(matches!(err, PipelineError::Format(_)));
        assert_eq!(
            err.to_string(),
            "Format error: Template 'qa' requires variable 'question'"
        );
    }

    #[test]
    fn test_unknown_template_is_configuration_error() {
        let err: PipelineError = TemplateError::UnknownTemplate {
            name: "poem".to_string(),
            available: vec!["qa".to_string()],
        }
        .into();

        assert!(matches!(err, PipelineError::Configuration(m) if m.contains("poem")));
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let err: PipelineError =
            ProviderError::NotConfigured("Gemini API key not set".to_string()).into();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
