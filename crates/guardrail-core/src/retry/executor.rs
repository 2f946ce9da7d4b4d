//! Bounded retry with fallback substitution.
//!
//! The executor never fails: after the last attempt it returns the
//! caller's fallback value, flagged as such, together with the full
//! attempt history. Callers branch on [`RetryOutcome`] instead of handling
//! an error.
//!
//! Every error from the operation is treated as retryable. There is no
//! distinction between transient faults (timeouts, 5xx) and permanent ones
//! (bad request); a permanent fault simply burns the remaining attempts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::backoff::BackoffPolicy;
use crate::trace::{EventLog, Stage};

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay rule between attempts
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is raised to 1 if zero.
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,

    /// Failure message; `None` if the attempt succeeded
    pub error: Option<String>,

    /// Wait before the next attempt; `None` after a success or the last attempt
    pub delay_before_next: Option<Duration>,
}

impl AttemptRecord {
    /// Whether this attempt produced the returned value.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of [`RetryExecutor::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Operation result, or the fallback
    pub value: T,

    /// Attempts made (the succeeding attempt's number, or `max_attempts`)
    pub attempts_used: u32,

    /// Whether `value` is the fallback
    pub succeeded_via_fallback: bool,

    /// Every attempt, in order
    pub attempts: Vec<AttemptRecord>,
}

impl<T> RetryOutcome<T> {
    /// Error message of the most recent failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }

    /// Transform the value, keeping the attempt history.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RetryOutcome<U> {
        RetryOutcome {
            value: f(self.value),
            attempts_used: self.attempts_used,
            succeeded_via_fallback: self.succeeded_via_fallback,
            attempts: self.attempts,
        }
    }
}

/// Handed to the operation on every attempt.
///
/// The operation can record its own events (request/response details)
/// into the same trace the executor writes attempt events to.
pub struct Attempt<'a> {
    /// 1-based attempt number
    pub number: u32,

    /// The execution's event log
    pub log: &'a mut EventLog,
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Runs an operation with bounded, blocking retries.
///
/// Attempts run sequentially on the calling thread; between attempts the
/// thread sleeps for the backoff delay. There is no cancellation: wrap the
/// whole call if a deadline is needed.
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl RetryExecutor {
    /// Create an executor that sleeps with `std::thread::sleep`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the sleep function (tests, or hosts with their own clock).
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// The configured policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or attempts run out.
    pub fn execute<T, E, F>(&self, operation: F, fallback: T, log: &mut EventLog) -> RetryOutcome<T>
    where
        F: FnMut(Attempt<'_>) -> Result<T, E>,
        E: fmt::Display,
    {
        self.execute_checked(operation, |_| Ok(()), fallback, log)
    }

    /// Like [`execute`](Self::execute), but a value rejected by `check`
    /// counts as a failed attempt.
    pub fn execute_checked<T, E, F, C>(
        &self,
        mut operation: F,
        check: C,
        fallback: T,
        log: &mut EventLog,
    ) -> RetryOutcome<T>
    where
        F: FnMut(Attempt<'_>) -> Result<T, E>,
        E: fmt::Display,
        C: Fn(&T) -> Result<(), String>,
    {
        let max_attempts = self.policy.attempts();
        let mut delays = self.policy.backoff.schedule(max_attempts);
        let mut attempts = Vec::new();

        for number in 1..=max_attempts {
            let result = operation(Attempt {
                number,
                log: &mut *log,
            })
            .map_err(|e| e.to_string())
            .and_then(|value| check(&value).map(|()| value));

            match result {
                Ok(value) => {
                    log.log(
                        Stage::Attempt,
                        json!({
                            "attempt": number,
                            "max_attempts": max_attempts,
                            "success": true,
                        }),
                    );
                    attempts.push(AttemptRecord {
                        attempt: number,
                        error: None,
                        delay_before_next: None,
                    });
                    return RetryOutcome {
                        value,
                        attempts_used: number,
                        succeeded_via_fallback: false,
                        attempts,
                    };
                }
                Err(error) => {
                    let delay = delays.next();
                    log.log(
                        Stage::Attempt,
                        json!({
                            "attempt": number,
                            "max_attempts": max_attempts,
                            "success": false,
                            "error": error,
                            "retry_in_ms": delay.map(|d| d.as_millis() as u64),
                        }),
                    );
                    attempts.push(AttemptRecord {
                        attempt: number,
                        error: Some(error),
                        delay_before_next: delay,
                    });
                    if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                        (self.sleeper)(delay);
                    }
                }
            }
        }

        let outcome = RetryOutcome {
            value: fallback,
            attempts_used: max_attempts,
            succeeded_via_fallback: true,
            attempts,
        };
        log.log(
            Stage::Fallback,
            json!({
                "attempts_used": max_attempts,
                "last_error": outcome.last_error(),
            }),
        );
        outcome
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .finish()
    }
}

/// One-shot form of [`RetryExecutor::execute`].
pub fn execute_with_retry<T, E, F>(
    operation: F,
    fallback: T,
    max_attempts: u32,
    backoff: BackoffPolicy,
    log: &mut EventLog,
) -> RetryOutcome<T>
where
    F: FnMut(Attempt<'_>) -> Result<T, E>,
    E: fmt::Display,
{
    RetryExecutor::new(RetryPolicy::new(max_attempts, backoff)).execute(operation, fallback, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_executor(policy: RetryPolicy) -> (RetryExecutor, Arc<Mutex<Vec<Duration>>>) {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&slept);
        let executor =
            RetryExecutor::new(policy).with_sleeper(move |d| sink.lock().unwrap().push(d));
        (executor, slept)
    }

    #[test]
    fn test_first_attempt_success() {
        let mut log = EventLog::new();
        let outcome = execute_with_retry(
            |_| Ok::<_, String>("hello"),
            "fallback",
            3,
            BackoffPolicy::None,
            &mut log,
        );

        assert_eq!(outcome.value, "hello");
        assert_eq!(outcome.attempts_used, 1);
        assert!(!outcome.succeeded_via_fallback);
        assert_eq!(log.events_for(Stage::Attempt).count(), 1);
        assert_eq!(log.events_for(Stage::Fallback).count(), 0);
    }

    #[test]
    fn test_always_failing_returns_fallback() {
        let mut log = EventLog::new();
        let fallback = r#"{"name":"unknown"}"#.to_string();
        let outcome = execute_with_retry(
            |_| Err::<String, _>("connection reset"),
            fallback.clone(),
            3,
            BackoffPolicy::None,
            &mut log,
        );

        assert_eq!(outcome.value, fallback);
        assert_eq!(outcome.attempts_used, 3);
        assert!(outcome.succeeded_via_fallback);
        assert_eq!(outcome.last_error(), Some("connection reset"));
        assert_eq!(log.events_for(Stage::Attempt).count(), 3);
        assert_eq!(log.events_for(Stage::Fallback).count(), 1);
    }

    #[test]
    fn test_success_on_third_attempt() {
        let mut log = EventLog::new();
        let outcome = execute_with_retry(
            |attempt| {
                if attempt.number < 3 {
                    Err(format!("attempt {} failed", attempt.number))
                } else {
                    Ok(attempt.number * 10)
                }
            },
            0,
            5,
            BackoffPolicy::None,
            &mut log,
        );

        assert_eq!(outcome.value, 30);
        assert_eq!(outcome.attempts_used, 3);
        assert!(!outcome.succeeded_via_fallback);
        assert_eq!(
            outcome.attempts.iter().map(|a| a.succeeded()).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn test_backoff_delays_between_attempts_only() {
        let policy = RetryPolicy::new(
            4,
            BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(3)),
        );
        let (executor, slept) = recording_executor(policy);
        let mut log = EventLog::new();

        let outcome = executor.execute(|_| Err::<(), _>("down"), (), &mut log);

        assert!(outcome.succeeded_via_fallback);
        assert_eq!(
            *slept.lock().unwrap(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
            ]
        );
        assert_eq!(outcome.attempts.last().unwrap().delay_before_next, None);
        assert_eq!(
            log.trace()[0].payload["retry_in_ms"],
            serde_json::json!(1000)
        );
    }

    #[test]
    fn test_no_sleep_after_success() {
        let policy = RetryPolicy::new(3, BackoffPolicy::Fixed { delay: Duration::from_secs(5) });
        let (executor, slept) = recording_executor(policy);
        let mut log = EventLog::new();

        let outcome = executor.execute(
            |a| if a.number == 1 { Err("flaky") } else { Ok("ok") },
            "fallback",
            &mut log,
        );

        assert_eq!(outcome.value, "ok");
        assert_eq!(*slept.lock().unwrap(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_check_rejection_counts_as_failure() {
        let (executor, _) = recording_executor(RetryPolicy::new(3, BackoffPolicy::None));
        let mut log = EventLog::new();
        let mut responses = vec!["", "  ", "answer"].into_iter();

        let outcome = executor.execute_checked(
            |_| responses.next().ok_or("exhausted"),
            |text| {
                if text.trim().is_empty() {
                    Err("empty response".to_string())
                } else {
                    Ok(())
                }
            },
            "fallback",
            &mut log,
        );

        assert_eq!(outcome.value, "answer");
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.attempts[0].error.as_deref(), Some("empty response"));
    }

    #[test]
    fn test_operation_can_write_to_log() {
        let mut log = EventLog::new();
        execute_with_retry(
            |attempt| {
                attempt
                    .log
                    .log(Stage::Response, serde_json::json!({"attempt": attempt.number}));
                Ok::<_, String>(())
            },
            (),
            1,
            BackoffPolicy::None,
            &mut log,
        );

        let stages: Vec<Stage> = log.trace().iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Response, Stage::Attempt]);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let mut log = EventLog::new();
        let mut calls = 0;
        let outcome = execute_with_retry(
            |_| {
                calls += 1;
                Err::<(), _>("nope")
            },
            (),
            0,
            BackoffPolicy::None,
            &mut log,
        );

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts_used, 1);
        assert!(outcome.succeeded_via_fallback);
    }

    #[test]
    fn test_huge_attempt_budget_is_not_preallocated() {
        let mut log = EventLog::new();
        let outcome = execute_with_retry(
            |_| Ok::<_, String>("ok"),
            "fallback",
            u32::MAX,
            BackoffPolicy::default(),
            &mut log,
        );

        assert_eq!(outcome.value, "ok");
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[test]
    fn test_huge_attempt_budget_retries_until_success() {
        let (executor, slept) = recording_executor(RetryPolicy::new(
            u32::MAX,
            BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(2)),
        ));
        let mut log = EventLog::new();

        let outcome = executor.execute(
            |a| if a.number < 4 { Err("busy") } else { Ok(a.number) },
            0,
            &mut log,
        );

        assert_eq!(outcome.value, 4);
        assert_eq!(
            *slept.lock().unwrap(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(2),
            ]
        );
    }

    #[test]
    fn test_policy_from_json_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_outcome_map_keeps_history() {
        let mut log = EventLog::new();
        let outcome = execute_with_retry(
            |_| Err::<i32, _>("x"),
            7,
            2,
            BackoffPolicy::None,
            &mut log,
        )
        .map(|v| v.to_string());

        assert_eq!(outcome.value, "7");
        assert_eq!(outcome.attempts.len(), 2);
    }
}
