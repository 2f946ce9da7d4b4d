//! Per-execution event trace.
//!
//! An [`EventLog`] is owned by one pipeline invocation and passed down
//! explicitly; there is no global log. Concurrent pipelines in the same
//! process therefore never interleave their traces.
//!
//! Every appended event is also emitted through `tracing`, so whatever
//! subscriber the host installs acts as the log sink.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Prompt text sent to the model
    Prompt,

    /// Raw response text and latency
    Response,

    /// Validation steps for a response
    Validation,

    /// One executor attempt and its outcome
    Attempt,

    /// All attempts failed, fallback substituted
    Fallback,

    /// Final value handed to the caller
    Resolved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prompt => "prompt",
            Stage::Response => "response",
            Stage::Validation => "validation",
            Stage::Attempt => "attempt",
            Stage::Fallback => "fallback",
            Stage::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

/// A single trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub payload: Value,
}

/// Append-only, ordered trace for one execution context.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    context: Option<String>,
    events: Vec<LogEvent>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log tagged with a context id (e.g. a request id).
    /// The id is attached to every `tracing` event this log emits.
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            events: Vec::new(),
        }
    }

    /// Context id, if any.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Append an event stamped with the current time.
    pub fn log(&mut self, stage: Stage, payload: Value) {
        let context = self.context.as_deref().unwrap_or("-");
        let failed = payload.get("success").and_then(Value::as_bool) == Some(false);

        match stage {
            Stage::Fallback => {
                tracing::warn!(context, stage = %stage, payload = %payload, "pipeline event");
            }
            Stage::Attempt if failed => {
                tracing::warn!(context, stage = %stage, payload = %payload, "pipeline event");
            }
            Stage::Validation => {
                tracing::debug!(context, stage = %stage, payload = %payload, "pipeline event");
            }
            _ => {
                tracing::info!(context, stage = %stage, payload = %payload, "pipeline event");
            }
        }

        self.events.push(LogEvent {
            timestamp: Utc::now(),
            stage,
            payload,
        });
    }

    /// The full history, oldest first.
    pub fn trace(&self) -> &[LogEvent] {
        &self.events
    }

    /// Events for one stage, oldest first.
    pub fn events_for(&self, stage: Stage) -> impl Iterator<Item = &LogEvent> {
        self.events.iter().filter(move |e| e.stage == stage)
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the log, returning its events.
    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }

    /// Render the trace as JSON Lines (one event per line).
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
