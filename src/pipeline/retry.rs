//! Bounded exponential-backoff retry for external calls.
//!
//! Every provider call the orchestrator makes goes through one
//! [`RetryExecutor`].  The delay before retry *k* (0-based) is
//!
//! ```text
//! delay(k) = min(initial_delay · multiplier^k, max_delay)
//! ```
//!
//! so the default policy (2 retries, 1 s, ×2) waits 1 s then 2 s.
//! Cancellation is checked before each attempt, raced against the attempt
//! itself and against every backoff sleep; it never consumes a retry.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay to wait after the failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

// ---------------------------------------------------------------------------
// RetryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryError<E> {
    /// The token fired before the operation succeeded.
    #[error("operation cancelled")]
    Cancelled,

    /// Every attempt failed; carries the last attempt's error unchanged.
    #[error("{0}")]
    Failed(E),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// RetryExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, the policy is exhausted or `cancel` fires.
    ///
    /// `label` only appears in log lines.
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= self.policy.max_retries {
                log::error!("retry: {label} failed after {attempts} attempt(s): {err}");
                return Err(RetryError::Failed(err));
            }

            let delay = self.policy.delay_for(attempt);
            log::warn!(
                "retry: {label} attempt {}/{attempts} failed ({err}), retrying in {}ms",
                attempt + 1,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delays_grow_then_cap() {
        let p = policy(10);
        assert_eq!(p.delay_for(0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(1), Duration::from_millis(2000));
        assert_eq!(p.delay_for(2), Duration::from_millis(4000));
        assert_eq!(p.delay_for(3), Duration::from_millis(8000));
        assert_eq!(p.delay_for(4), Duration::from_millis(10_000));
        assert_eq!(p.delay_for(40), Duration::from_millis(10_000));
    }

    #[test]
    fn default_policy_matches_config_defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.initial_delay, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_makes_three_attempts_and_returns_last_error() {
        let started = Instant::now();
        let attempts: Arc<Mutex<Vec<Duration>>> = Arc::default();
        let executor = RetryExecutor::new(policy(2));

        let seen = Arc::clone(&attempts);
        let result: Result<(), _> = executor
            .execute("test", &CancellationToken::new(), || {
                let seen = Arc::clone(&seen);
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.push(started.elapsed());
                    Err(format!("failure {}", seen.len()))
                }
            })
            .await;

        assert_eq!(result, Err(RetryError::Failed("failure 3".to_string())));

        let at = attempts.lock().unwrap().clone();
        assert_eq!(at.len(), 3);
        let first_gap = at[1] - at[0];
        let second_gap = at[2] - at[1];
        assert!(first_gap >= Duration::from_millis(1000) && first_gap < Duration::from_millis(1100));
        assert!(second_gap >= Duration::from_millis(2000) && second_gap < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_failure_stops_retrying() {
        let calls = Arc::new(Mutex::new(0));
        let executor = RetryExecutor::new(policy(2));

        let counter = Arc::clone(&calls);
        let result = executor
            .execute("test", &CancellationToken::new(), || {
                let counter = Arc::clone(&counter);
                async move {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    if *n == 1 {
                        Err("flaky")
                    } else {
                        Ok(*n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<(), RetryError<&str>> = RetryExecutor::default()
            .execute("test", &cancel, || {
                let counter = Arc::clone(&counter);
                async move {
                    *counter.lock().unwrap() += 1;
                    Err("unreachable")
                }
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_does_not_consume_a_retry() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(Mutex::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let counter = Arc::clone(&calls);
        let result: Result<(), RetryError<&str>> = RetryExecutor::new(policy(2))
            .execute("test", &cancel, || {
                let counter = Arc::clone(&counter);
                async move {
                    *counter.lock().unwrap() += 1;
                    Err("down")
                }
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_hanging_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result: Result<(), RetryError<&str>> = RetryExecutor::default()
            .execute("test", &cancel, || std::future::pending())
            .await;
        assert_eq!(result, Err(RetryError::Cancelled));
    }

    #[tokio::test]
    async fn no_retry_policy_fails_immediately() {
        let result: Result<(), _> = RetryExecutor::new(RetryPolicy::none())
            .execute("test", &CancellationToken::new(), || async { Err("boom") })
            .await;
        assert_eq!(result, Err(RetryError::Failed("boom")));
    }
}
