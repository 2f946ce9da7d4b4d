//! Pipeline configuration.
//!
//! ```yaml
//! model: gemini-2.5-flash
//! max_output_tokens: 1024
//! temperature: 0.2
//! timeout: 30s
//! max_attempts: 3
//! backoff:
//!   type: exponential
//!   base: 1s
//!   max_delay: 30s
//! retry_on_invalid: true
//! templates_path: prompts.yaml
//! ```
//!
//! Every field is optional; omitted fields take the defaults shown.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use guardrail_core::{BackoffPolicy, RetryPolicy, TemplateRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::CompletionConfig;

/// Upper bound accepted for `max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 100;

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model identifier
    pub model: String,

    /// Maximum tokens to generate per call
    pub max_output_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-call timeout
    #[serde(with = "guardrail_core::duration")]
    pub timeout: Duration,

    /// Total attempts per request, including the first
    pub max_attempts: u32,

    /// Delay between attempts
    pub backoff: BackoffPolicy,

    /// Treat a response that fails validation as a failed attempt
    pub retry_on_invalid: bool,

    /// YAML/JSON template file merged over the built-in templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        let retry = RetryPolicy::default();
        Self {
            model: completion.model,
            max_output_tokens: completion.max_output_tokens,
            temperature: completion.temperature,
            timeout: completion.timeout,
            max_attempts: retry.max_attempts,
            backoff: retry.backoff,
            retry_on_invalid: true,
            templates_path: None,
        }
    }
}

impl PipelineConfig {
    /// Parse YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file; `.json` is parsed as JSON, anything else as YAML.
    ///
    /// A relative `templates_path` is resolved against the config file's
    /// directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = if path.extension().is_some_and(|e| e == "json") {
            Self::from_json(&text)?
        } else {
            Self::from_yaml(&text)?
        };

        if let (Some(templates), Some(dir)) = (&config.templates_path, path.parent()) {
            if templates.is_relative() {
                config.templates_path = Some(dir.join(templates));
            }
        }
        Ok(config)
    }

    /// Reject values no request could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "max_attempts must be within 1..={MAX_ATTEMPTS_LIMIT}, got {}",
                self.max_attempts
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::Invalid(
                "max_output_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Per-call provider settings.
    pub fn completion(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }

    /// Executor settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff)
    }

    /// Built-in templates, overlaid with `templates_path` if set.
    pub fn templates(&self) -> Result<TemplateRegistry, guardrail_core::TemplateError> {
        let registry = TemplateRegistry::with_defaults();
        match &self.templates_path {
            Some(path) => Ok(registry.merge(TemplateRegistry::from_file(path)?)),
            None => Ok(registry),
        }
    }
}
