//! Delay policies between retry attempts.

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rule for the delay between successive attempts.
///
/// Exponential: `delay(n) = min(base * 2^(n-1), max_delay)` for the wait
/// after failed attempt `n`, optionally with random jitter of up to one
/// extra `delay(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Retry immediately
    None,

    /// Same delay every time
    Fixed {
        #[serde(with = "crate::duration")]
        delay: Duration,
    },

    /// Doubling delay, capped
    Exponential {
        #[serde(with = "crate::duration")]
        base: Duration,

        #[serde(with = "crate::duration")]
        max_delay: Duration,

        #[serde(default)]
        jitter: bool,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff without jitter.
    pub fn exponential(base: Duration, max_delay: Duration) -> Self {
        Self::Exponential {
            base,
            max_delay,
            jitter: false,
        }
    }

    /// Lazy delay schedule: one entry per failed attempt except the last,
    /// so `max_attempts - 1` entries in total.
    pub fn schedule(&self, max_attempts: u32) -> Box<dyn Iterator<Item = Duration>> {
        let retries = max_attempts.saturating_sub(1) as usize;

        match *self {
            BackoffPolicy::None => Box::new(std::iter::repeat(Duration::ZERO).take(retries)),
            BackoffPolicy::Fixed { delay } => Box::new(
                ConstantBuilder::default()
                    .with_delay(delay)
                    .with_max_times(retries)
                    .build(),
            ),
            BackoffPolicy::Exponential {
                base,
                max_delay,
                jitter,
            } => {
                // backon only caps the steps after the first one.
                let builder = ExponentialBuilder::default()
                    .with_min_delay(base.min(max_delay))
                    .with_max_delay(max_delay)
                    .with_factor(2.0)
                    .with_max_times(retries);
                let builder = if jitter { builder.with_jitter() } else { builder };
                Box::new(builder.build())
            }
        }
    }

    /// The whole [`schedule`](Self::schedule), collected.
    pub fn delays(&self, max_attempts: u32) -> Vec<Duration> {
        self.schedule(max_attempts).collect()
    }
}
