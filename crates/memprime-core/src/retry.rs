//! Retry execution with policy-based delays
//!
//! A condensed retry engine: an async operation is attempted up to
//! `max_attempts` times, with delays derived from the policy's strategy.
//! Errors carry the final attempt count so callers can report exhausted
//! budgets precisely.

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{RetryPolicy, RetryStrategy};

/// Error returned when an operation fails through its entire retry budget
#[derive(Error, Debug)]
pub enum RetryError<E: StdError> {
    /// All attempts failed; `source` is the last error observed
    #[error("{label} failed after {attempts} attempts: {source}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E: StdError> RetryError<E> {
    /// Number of attempts that were made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The last underlying error
    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
        }
    }
}

/// Calculate the delay before the next retry attempt.
///
/// `attempt` is 1-indexed; the delay applies between attempt N and N+1.
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => policy
            .initial_delay_ms
            .saturating_mul(1u64 << attempt_index.min(32)),
    };

    Duration::from_millis(base_delay_ms.min(policy.max_delay_ms))
}

/// Execute an async operation with retry logic based on a policy.
///
/// `label` names the operation in logs and in the exhausted error. The
/// operation is attempted at most `policy.max_attempts` times (at least
/// once even for a zero policy).
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }

                let delay = calculate_delay(policy, attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    label, attempt, max_attempts, err
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn io_err(msg: &str) -> io::Error {
        io::Error::other(msg)
    }

    #[tokio::test]
    async fn succeeds_first_try_without_retrying() {
        let calls = AtomicU32::new(0);
        let result = retry_with_policy(&RetryPolicy::immediate(3), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, io::Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_with_policy(&RetryPolicy::immediate(3), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(io_err("transient"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_budget_and_reports_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_policy(&RetryPolicy::immediate(3), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(io_err("permanent")) }
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn zero_attempt_policy_still_runs_once() {
        let calls = AtomicU32::new(0);
        let result = retry_with_policy(&RetryPolicy::immediate(0), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, io::Error>(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_is_zero_for_none_strategy() {
        let policy = RetryPolicy::immediate(3);
        assert!(calculate_delay(&policy, 1).is_zero());
        assert!(calculate_delay(&policy, 2).is_zero());
    }

    #[test]
    fn exponential_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            strategy: RetryStrategy::ExponentialBackoff,
            initial_delay_ms: 100,
            max_delay_ms: 300,
        };
        assert_eq!(calculate_delay(&policy, 1).as_millis(), 100);
        assert_eq!(calculate_delay(&policy, 2).as_millis(), 200);
        // Capped by max_delay_ms
        assert_eq!(calculate_delay(&policy, 3).as_millis(), 300);
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy {
            max_attempts: 3,
            strategy: RetryStrategy::FixedDelay,
            initial_delay_ms: 150,
            max_delay_ms: 5_000,
        };
        assert_eq!(calculate_delay(&policy, 1).as_millis(), 150);
        assert_eq!(calculate_delay(&policy, 2).as_millis(), 150);
    }
}
