//! Retry with fallback for unreliable calls.

mod backoff;
mod executor;

pub use backoff::BackoffPolicy;
pub use executor::{
    execute_with_retry, Attempt, AttemptRecord, RetryExecutor, RetryOutcome, RetryPolicy,
};
