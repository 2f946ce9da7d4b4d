//! # guardrail-core
//!
//! Reliability primitives for calling language models.
//!
//! Model output is treated as untrusted and model calls as unreliable.
//! This crate provides the pieces that sit around a model call:
//!
//! - [`template`]: named prompt templates with strict placeholder substitution
//! - [`validation`]: lenient JSON extraction and exact-key schema checks
//! - [`retry`]: bounded retry with a guaranteed fallback value
//! - [`trace`]: an ordered, per-execution event log
//!
//! Nothing here performs network I/O. Provider clients and the pipeline
//! that ties these pieces together live in `guardrail-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use guardrail_core::{validate, variables, TemplateRegistry};
//!
//! let registry = TemplateRegistry::with_defaults();
//! let prompt = registry.format(
//!     "json_extract",
//!     &variables([("required_keys", "name, age"), ("text", "Ada, 36")]),
//! )?;
//!
//! let result = validate(r#"Sure: {"name": "Ada", "age": 36}"#, ["name", "age"], false);
//! assert!(result.success);
//! ```

pub mod duration;
pub mod retry;
pub mod template;
pub mod trace;
pub mod validation;

// Re-export main types at crate root
pub use retry::{
    execute_with_retry, Attempt, AttemptRecord, BackoffPolicy, RetryExecutor, RetryOutcome,
    RetryPolicy,
};
pub use template::{placeholders, render, variables, TemplateError, TemplateRegistry, Variables};
pub use trace::{EventLog, LogEvent, Stage};
pub use validation::{
    validate, validate_choice, validate_length, JsonObject, ObjectSchema, ParseResult,
    SchemaValidator, ValidationError,
};
