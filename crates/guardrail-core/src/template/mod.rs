//! Prompt templates.
//!
//! Prompts are never hardcoded in calling code: callers pass a template
//! name and a set of variables, and the registry renders the final prompt.

mod defaults;
mod registry;

pub use defaults::{
    CLASSIFY_TEMPLATE, DEFAULT_TEMPLATES, JSON_EXTRACT_TEMPLATE, QA_TEMPLATE, SENTIMENT_TEMPLATE,
    STRUCTURED_INFO_TEMPLATE, SYSTEM_INSTRUCTION,
};
pub use registry::{placeholders, render, variables, TemplateError, TemplateRegistry, Variables};
