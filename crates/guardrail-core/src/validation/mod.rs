//! Validation of model output.
//!
//! Model output is untrusted. Every response is checked before the
//! caller uses it, and every check is recorded so a failure can be
//! explained rather than guessed at.

mod extract;
mod result;
mod schema;
mod text;

pub use extract::{default_strategies, BracketMatch, Extracted, ExtractionStrategy, StrictParse};
pub use result::{
    JsonObject, ParseResult, ValidationError, INVALID_JSON, MISSING_REQUIRED_KEYS, UNEXPECTED_KEYS,
};
pub use schema::{validate, ObjectSchema, SchemaValidator};
pub use text::{validate_choice, validate_length};
