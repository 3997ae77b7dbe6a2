//! Bounded retry with exponential backoff for rate-limited requests.
//!
//! [`retry_with_backoff`] wraps any repeatable async operation (usually one
//! routed through the [`RequestDispatcher`](crate::dispatcher::RequestDispatcher)).
//! Rate-limit failures back off exponentially with jitter; any other
//! failure gets a single quick retry before it is surfaced.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Classification hook for errors seen by [`retry_with_backoff`].
pub trait Retryable {
    /// Whether the failure means "slow down" (HTTP 429 or equivalent).
    fn is_rate_limited(&self) -> bool;
}

/// Tunable parameters for the retry strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (4 means at most 5 attempts).
    pub max_retries: u32,
    /// Base delay for rate-limit backoff.
    pub base_delay: Duration,
    /// Fixed delay before the single retry of a non-rate-limit failure.
    pub transient_delay: Duration,
    /// Multiplier applied on top of the exponential term.
    pub backoff_factor: f64,
    /// Upper bound of the random jitter, as a fraction of the delay.
    pub max_jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(1000),
            transient_delay: Duration::from_millis(500),
            backoff_factor: 1.5,
            max_jitter: 0.3,
        }
    }
}

/// Rate-limit backoff before jitter: `base * 2^attempt * backoff_factor`,
/// where `attempt` is the 0-based index of the attempt that just failed.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2f64.powi(attempt.min(30) as i32);
    config.base_delay.mul_f64(exp * config.backoff_factor.max(0.0))
}

/// Add uniform random jitter in `[0, max_fraction]` of `delay`.
pub fn jittered(delay: Duration, max_fraction: f64) -> Duration {
    let fraction = rand::rng().random_range(0.0..=max_fraction.max(0.0));
    delay + delay.mul_f64(fraction)
}

/// Run `work` until it succeeds or the retry budget is spent.
///
/// - A rate-limited failure is retried after [`backoff_delay`] plus jitter,
///   up to `max_retries` times.
/// - A non-rate-limited failure is retried once after `transient_delay`; a
///   second consecutive one is returned immediately.
/// - Every retry counts toward `max_retries`; when it is spent the last
///   error is returned.
///
/// Attempts never overlap: each one settles before the next starts.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut work: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0u32;
    let mut transient_retried = false;

    loop {
        let err = match work().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= config.max_retries {
            tracing::error!(
                attempts = attempt + 1,
                error = %err,
                "Request failed, retries exhausted",
            );
            return Err(err);
        }

        let delay = if err.is_rate_limited() {
            transient_retried = false;
            jittered(backoff_delay(config, attempt), config.max_jitter)
        } else if transient_retried {
            tracing::warn!(
                attempt = attempt + 1,
                error = %err,
                "Request failed twice in a row, giving up",
            );
            return Err(err);
        } else {
            transient_retried = true;
            config.transient_delay
        };

        tracing::warn!(
            attempt = attempt + 1,
            rate_limited = err.is_rate_limited(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Request failed, retrying",
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
