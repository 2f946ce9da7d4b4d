//! # guardrail-runtime
//!
//! Model calls for Guardrail: provider clients and the pipeline that
//! wraps them in templates, retries and validation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use guardrail_core::{variables, EventLog, ObjectSchema};
//! use guardrail_runtime::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::gemini_from_env(PipelineConfig::default())?;
//! let mut log = EventLog::with_context("request-1");
//!
//! let answer = pipeline.ask(
//!     "qa",
//!     &variables([("question", "What is Rust?")]),
//!     "Sorry, I couldn't generate a response.",
//!     &mut log,
//! )?;
//!
//! let person = pipeline.extract(
//!     "json_extract",
//!     &variables([("text", "Alice is 28 and lives in NYC")]),
//!     &ObjectSchema::new(["name", "age", "location"]),
//!     r#"{"name":"unknown","age":0,"location":"unknown"}"#,
//!     &mut log,
//! )?;
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use providers::{
    ApiCredential, BlockingClient, ChatMessage, CompletionConfig, CompletionResponse,
    CredentialSource, LlmProvider, ProviderError, TokenUsage,
};

#[cfg(feature = "gemini")]
pub use providers::{GeminiProvider, GEMINI_API_KEY_ENV};
