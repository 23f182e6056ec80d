//! Bounded retry with exponential backoff.
//!
//! Retries transport-classified failures (connection, protocol, data
//! processing, timeouts, HTTP 429/5xx) up to the request's attempt budget.
//! The first backoff is `max(retry_delay, 2s)` and doubles after each failed
//! attempt. There is no jitter and no cap. Every wait and every in-flight
//! attempt races the request's cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult, TransportError};
use crate::request::Request;

/// Floor for the first backoff delay.
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Retry budget and backoff for one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum physical attempts (values below 1 are treated as 1).
    pub max_attempts: u32,
    /// Requested initial delay before the floor is applied.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_RETRY_COUNT,
            initial_delay: MIN_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Policy taken from a request's retry count and delay.
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.retry_count(), request.retry_delay())
    }

    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.max(MIN_RETRY_DELAY);
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        base.saturating_mul(factor)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// A retry about to be scheduled.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a TransportError,
}

/// Run `attempt` until it succeeds, fails terminally, runs out of
/// attempts, or `cancel` fires.
///
/// Returns the value and the number of physical attempts used.
///
/// # Errors
///
/// [`ClientError::Cancelled`] on cancellation, otherwise
/// [`ClientError::RequestFailed`] carrying the last transport failure.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_retry: impl FnMut(&RetryNotice<'_>),
    mut attempt: F,
) -> ClientResult<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = policy.attempts();
    let mut number = 0;

    loop {
        number += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = attempt() => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if number > 1 {
                    debug!("Succeeded on attempt {number}/{max_attempts}");
                }
                return Ok((value, number));
            }
            Err(TransportError::Cancelled) => return Err(ClientError::Cancelled),
            Err(error) => error,
        };

        if !error.is_retryable() || number >= max_attempts {
            return Err(ClientError::RequestFailed {
                attempts: number,
                source: error,
            });
        }

        let delay = policy.delay_for_attempt(number - 1);
        warn!(
            "Attempt {number}/{max_attempts} failed: {error}. Retrying in {:.1}s",
            delay.as_secs_f64()
        );
        on_retry(&RetryNotice {
            attempt: number,
            max_attempts,
            delay,
            error: &error,
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
