//! Bounded exponential backoff for outbound HTTP calls.
//!
//! Discovery and forwarding both wrap their network call in
//! [`RetryPolicy::run`]. The sensor reader does not retry.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use tracing::{error, warn};

use crate::client::ClientError;

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Default ceiling on one retry loop (15 minutes).
const DEFAULT_MAX_ELAPSED_SECS: u64 = 900;

/// Retry settings for one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt, `None` leaves only the
    /// elapsed ceiling
    pub max_retries: Option<u32>,

    /// Delay before the first retry is `base_delay * 2`
    pub base_delay: Duration,

    /// Cap on a single delay
    pub max_delay: Duration,

    /// Give up once the next sleep would push the loop past this
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            max_elapsed: Duration::from_secs(DEFAULT_MAX_ELAPSED_SECS),
        }
    }
}

/// A successful result together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,

    /// 1 when the first attempt succeeded
    pub attempts: u32,
}

impl<T> Attempted<T> {
    /// Retries consumed before success.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the policy is
    /// exhausted.
    ///
    /// Non-retryable errors (see [`ClientError::is_retryable`]) are returned
    /// unchanged after the attempt that produced them. Exhaustion is reported
    /// as `ClientError::RetriesExhausted` carrying the total attempt count.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        mut attempt_fn: F,
    ) -> Result<Attempted<T>, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match attempt_fn().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt + 1,
                    })
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        operation = operation,
                        error = %e,
                        attempts = attempt + 1,
                        "Request failed permanently"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let next = attempt + 1;
                    let delay = self.calculate_backoff_delay(next);
                    let out_of_time = started.elapsed() + delay > self.max_elapsed;
                    let out_of_retries = self.max_retries.is_some_and(|max| attempt >= max);

                    if out_of_retries || out_of_time {
                        error!(
                            operation = operation,
                            error = %e,
                            attempts = next,
                            "Retries exhausted"
                        );
                        return Err(ClientError::RetriesExhausted {
                            attempts: next,
                            last_error: e.to_string(),
                        });
                    }

                    warn!(
                        operation = operation,
                        error = %e,
                        attempt = next,
                        max_retries = ?self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
            }
        }
    }

    /// Calculate the backoff delay for a given retry attempt.
    ///
    /// delay = min(base_delay * 2^attempt + jitter, max_delay), jitter up to 25%
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.base_delay.as_millis() as u64;
        let exponential_delay = base_delay.saturating_mul(1 << attempt.min(10));
        let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);
        let max_delay = self.max_delay.as_millis() as u64;
        let total_delay = exponential_delay.saturating_add(jitter).min(max_delay);

        Duration::from_millis(total_delay)
    }
}
