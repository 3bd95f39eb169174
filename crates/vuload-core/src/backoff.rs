//! Retry with exponential backoff for transport-level failures
//!
//! Only transient failures are retried: no response at all, or a response
//! with status `0`. Application errors (any real HTTP status, including
//! `>= 400`) are returned to the caller on the first attempt.
//!
//! Delay before retry `i` (0-indexed) is `base_delay * 2^i`. No delay follows
//! the final attempt.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Classifies an action result as a transport-level failure.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl<T: Transient> Transient for Option<T> {
    fn is_transient(&self) -> bool {
        self.as_ref().map_or(true, Transient::is_transient)
    }
}

impl<T: Transient, E> Transient for Result<T, E> {
    fn is_transient(&self) -> bool {
        self.as_ref().map_or(true, Transient::is_transient)
    }
}

/// Result of a retried action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<R> {
    /// A non-transient response, returned after `attempts` calls.
    Response { response: R, attempts: u32 },

    /// Every attempt failed transiently. There is no usable response.
    Exhausted { attempts: u32 },
}

impl<R> RetryOutcome<R> {
    pub fn response(&self) -> Option<&R> {
        match self {
            Self::Response { response, .. } => Some(response),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn into_response(self) -> Option<R> {
        match self {
            Self::Response { response, .. } => Some(response),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Number of times the action was called.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Response { attempts, .. } | Self::Exhausted { attempts } => *attempts,
        }
    }
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Maximum calls to the action (values below 1 behave as 1)
    pub max_attempts: u32,

    /// Delay after the first transient failure; doubles on each retry
    pub base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed).
    ///
    /// The exponent is clamped to 30 and the multiplication saturates.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        const MAX_EXPONENT: u32 = 30;
        let factor = 2u32.saturating_pow(attempt.min(MAX_EXPONENT));
        self.base_delay.saturating_mul(factor)
    }

    /// Worst-case time spent sleeping: `base_delay * (2^(max_attempts-1) - 1)`
    /// since no delay follows the last attempt.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_attempts.max(1) - 1)
            .map(|attempt| self.delay_for_attempt(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Run `action` until it yields a non-transient result or the attempt
    /// budget is spent.
    pub async fn execute<F, Fut, R>(&self, mut action: F) -> RetryOutcome<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = R>,
        R: Transient,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let result = action().await;
            if !result.is_transient() {
                return RetryOutcome::Response {
                    response: result,
                    attempts: attempt + 1,
                };
            }

            if attempt + 1 < max_attempts {
                let delay = self.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(attempts = max_attempts, "retries exhausted");
        RetryOutcome::Exhausted {
            attempts: max_attempts,
        }
    }
}
