//! # Retry Policy
//!
//! Bounded retry with exponential backoff for transient store failures.
//!
//! The engine itself never retries. Orchestrating code wraps whole operations
//! (opening the store, ingesting one chapter) in a policy; idempotent upserts
//! make re-running a partially applied operation safe.

use crate::GraphError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of attempts, including the first.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default upper bound on a single backoff delay (in milliseconds).
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Retry parameters. Only errors where [`GraphError::is_transient`] holds
/// are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay_ms`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Run `op`, retrying store failures with backoff.
    pub fn run<T>(&self, op: impl FnMut() -> Result<T, GraphError>) -> Result<T, GraphError> {
        self.run_with_sleep(op, std::thread::sleep)
    }

    /// Like [`run`](Self::run) with an injectable sleep, for tests.
    pub fn run_with_sleep<T>(
        &self,
        mut op: impl FnMut() -> Result<T, GraphError>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, GraphError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store failure, retrying after backoff"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn retries_store_failures_until_success() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let mut slept = Vec::new();

        let result = policy.run_with_sleep(
            || {
                calls += 1;
                if calls < 3 {
                    Err(GraphError::StoreUnavailable("locked".into()))
                } else {
                    Ok(calls)
                }
            },
            |d| slept.push(d),
        );

        assert_eq!(result.expect("eventually succeeds"), 3);
        assert_eq!(slept.len(), 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let mut calls = 0;

        let result: Result<(), _> = policy.run_with_sleep(
            || {
                calls += 1;
                Err(GraphError::StoreUnavailable("down".into()))
            },
            |_| {},
        );

        assert!(matches!(result, Err(GraphError::StoreUnavailable(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn per_entity_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::default().run_with_sleep(
            || {
                calls += 1;
                Err(GraphError::InvalidKey("empty".into()))
            },
            |_| {},
        );

        assert!(matches!(result, Err(GraphError::InvalidKey(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn codec_errors_fail_without_backoff() {
        let mut calls = 0;
        let mut slept = Vec::new();
        let result: Result<(), _> = RetryPolicy::default().run_with_sleep(
            || {
                calls += 1;
                Err(GraphError::SerializationError("corrupt record".into()))
            },
            |d| slept.push(d),
        );

        assert!(matches!(result, Err(GraphError::SerializationError(_))));
        assert_eq!(calls, 1);
        assert!(slept.is_empty());
    }
}
