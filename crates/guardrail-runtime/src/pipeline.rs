//! Formatter -> Executor(model call) -> Validator, traced into an [`EventLog`].

use std::sync::Arc;

use guardrail_core::{
    validate_choice, EventLog, ObjectSchema, ParseResult, RetryExecutor, RetryOutcome,
    SchemaValidator, Stage, TemplateRegistry, Variables,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::providers::{BlockingClient, ChatMessage, CompletionConfig, LlmProvider, ProviderError};

/// Why one attempt did not produce a usable value.
#[derive(Error, Debug)]
enum AttemptError {
    #[error("transport failure: {0}")]
    Transport(#[from] ProviderError),

    #[error("invalid response: {0}")]
    Invalid(String),
}

/// A configured prompt pipeline.
///
/// Each call renders a template, calls the model with bounded retries,
/// validates the answer and records every stage in the caller's
/// [`EventLog`]. Template problems are returned as [`PipelineError`]
/// before the model is called; everything after that resolves to a value
/// (possibly the fallback).
pub struct Pipeline {
    client: BlockingClient,
    templates: TemplateRegistry,
    validator: SchemaValidator,
    executor: RetryExecutor,
    completion: CompletionConfig,
    system_instruction: Option<String>,
    retry_on_invalid: bool,
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Gemini pipeline using `GEMINI_API_KEY`. Fails fast if the key is
    /// not set.
    #[cfg(feature = "gemini")]
    pub fn gemini_from_env(config: PipelineConfig) -> Result<Self, PipelineError> {
        let provider = crate::providers::GeminiProvider::from_env()?;
        PipelineBuilder::new()
            .provider(Arc::new(provider))
            .config(config)
            .build()
    }

    /// The template set in use.
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Per-call provider settings.
    pub fn completion_config(&self) -> &CompletionConfig {
        &self.completion
    }

    /// Free-text answer. Blank responses count as failed attempts.
    pub fn ask(
        &self,
        template: &str,
        vars: &Variables,
        fallback: &str,
        log: &mut EventLog,
    ) -> Result<RetryOutcome<String>, PipelineError> {
        let prompt = self.prompt(template, vars, log)?;

        let outcome = self.executor.execute(
            |attempt| -> Result<String, AttemptError> {
                let text = self.call(&prompt, attempt.number, attempt.log)?;
                if text.trim().is_empty() {
                    return Err(AttemptError::Invalid("empty response".to_string()));
                }
                Ok(text)
            },
            fallback.to_string(),
            log,
        );

        log.log(
            Stage::Resolved,
            json!({
                "value": outcome.value,
                "via_fallback": outcome.succeeded_via_fallback,
                "attempts_used": outcome.attempts_used,
            }),
        );
        Ok(outcome)
    }

    /// Structured answer checked against `schema`.
    ///
    /// With `retry_on_invalid`, a response that fails validation is a
    /// failed attempt; otherwise the failed [`ParseResult`] is returned as
    /// is. The fallback text goes through the same validation.
    ///
    /// `{required_keys}` is filled from the schema unless `vars` sets it.
    pub fn extract(
        &self,
        template: &str,
        vars: &Variables,
        schema: &ObjectSchema,
        fallback: &str,
        log: &mut EventLog,
    ) -> Result<RetryOutcome<ParseResult>, PipelineError> {
        let vars = with_default(vars, "required_keys", schema.required_keys.iter());
        let prompt = self.prompt(template, &vars, log)?;
        Ok(self.run_validated(
            &prompt,
            |text| self.validator.validate_schema(text, schema),
            fallback,
            log,
        ))
    }

    /// Single-label answer matched against `choices` (case-insensitive).
    /// `{categories}` is filled from `choices` unless `vars` sets it.
    pub fn classify<S: AsRef<str>>(
        &self,
        template: &str,
        vars: &Variables,
        choices: &[S],
        fallback: &str,
        log: &mut EventLog,
    ) -> Result<RetryOutcome<ParseResult<String>>, PipelineError> {
        let vars = with_default(vars, "categories", choices.iter());
        let prompt = self.prompt(template, &vars, log)?;
        Ok(self.run_validated(
            &prompt,
            |text| validate_choice(text, choices),
            fallback,
            log,
        ))
    }

    fn prompt(
        &self,
        template: &str,
        vars: &Variables,
        log: &mut EventLog,
    ) -> Result<String, PipelineError> {
        let prompt = self.templates.format(template, vars)?;
        log.log(Stage::Prompt, json!({"template": template, "prompt": prompt}));
        Ok(prompt)
    }

    fn call(&self, prompt: &str, attempt: u32, log: &mut EventLog) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_instruction {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user(prompt));

        let response = self.client.complete(messages, &self.completion)?;
        log.log(
            Stage::Response,
            json!({
                "attempt": attempt,
                "text": response.content,
                "latency_ms": response.latency.as_millis() as u64,
                "model": response.model,
                "prompt_tokens": response.usage.prompt_tokens,
                "completion_tokens": response.usage.completion_tokens,
            }),
        );
        Ok(response.content)
    }

    fn run_validated<T, V>(
        &self,
        prompt: &str,
        validate: V,
        fallback: &str,
        log: &mut EventLog,
    ) -> RetryOutcome<ParseResult<T>>
    where
        T: Serialize,
        V: Fn(&str) -> ParseResult<T>,
    {
        let fallback_result = validate(fallback);

        let outcome = self.executor.execute(
            |attempt| -> Result<ParseResult<T>, AttemptError> {
                let text = self.call(prompt, attempt.number, attempt.log)?;
                let result = validate(&text);
                log_validation(attempt.log, json!(attempt.number), &result);

                if self.retry_on_invalid {
                    if let Some(error) = &result.error {
                        return Err(AttemptError::Invalid(error.clone()));
                    }
                }
                Ok(result)
            },
            fallback_result,
            log,
        );

        if outcome.succeeded_via_fallback {
            log_validation(log, json!("fallback"), &outcome.value);
        }
        log.log(
            Stage::Resolved,
            json!({
                "success": outcome.value.success,
                "data": outcome.value.data,
                "error": outcome.value.error,
                "via_fallback": outcome.succeeded_via_fallback,
                "attempts_used": outcome.attempts_used,
            }),
        );
        outcome
    }
}

/// Copy of `vars` with `key` set to the comma-joined `values` if absent.
fn with_default<I>(vars: &Variables, key: &str, values: I) -> Variables
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    let mut vars = vars.clone();
    if !vars.contains_key(key) {
        let joined = values.map(|v| v.as_ref().to_string()).collect::<Vec<_>>();
        vars.insert(key.to_string(), joined.join(", "));
    }
    vars
}

fn log_validation<T>(log: &mut EventLog, source: serde_json::Value, result: &ParseResult<T>) {
    log.log(
        Stage::Validation,
        json!({
            "source": source,
            "success": result.success,
            "error": result.error,
            "steps": result.validation_steps,
        }),
    );
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("client", &self.client)
            .field("templates", &self.templates.names())
            .field("executor", &self.executor)
            .field("completion", &self.completion)
            .field("retry_on_invalid", &self.retry_on_invalid)
            .finish()
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: PipelineConfig,
    templates: Option<TemplateRegistry>,
    system_instruction: Option<String>,
}

impl PipelineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            provider: None,
            config: PipelineConfig::default(),
            templates: None,
            system_instruction: Some(guardrail_core::template::SYSTEM_INSTRUCTION.to_string()),
        }
    }

    /// Set the LLM provider.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this template set instead of the one the config describes.
    pub fn templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Replace the system message (`None` sends none).
    pub fn system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let provider = self
            .provider
            .ok_or_else(|| PipelineError::Configuration("No provider set".to_string()))?;
        self.config.validate()?;

        let templates = match self.templates {
            Some(templates) => templates,
            None => self.config.templates()?,
        };

        tracing::debug!(
            provider = provider.name(),
            model = %self.config.model,
            templates = templates.len(),
            "Pipeline ready"
        );

        Ok(Pipeline {
            client: BlockingClient::new(provider)?,
            templates,
            validator: SchemaValidator::new(),
            executor: RetryExecutor::new(self.config.retry_policy()),
            completion: self.config.completion(),
            system_instruction: self.system_instruction,
            retry_on_invalid: self.config.retry_on_invalid,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
