// Bounded retry with exponential backoff for the HTTP clients.
// Transience is decided by the error type, not by where the call happens.

#[cfg(test)]
mod tests;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Classifies an error as worth retrying or not.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ureq::Error {
    #[inline]
    fn is_transient(&self) -> bool {
        match self {
            // Rate limiting and server-side failures are expected to clear
            ureq::Error::StatusCode(status) => *status == 429 || *status >= 500,
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => true,
            _ => false,
        }
    }
}

/// Named retry configuration: attempt count and base backoff delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[inline]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the retry following `attempt` (1-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("{0}")]
    Permanent(#[source] E),

    #[error("giving up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Run `op` until it succeeds, a permanent error occurs, or the policy's
/// attempt budget is spent. Sleeps between attempts with exponential
/// backoff, so callers are expected to be on a blocking-friendly thread.
#[inline]
pub fn with_backoff<T, E, F>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> std::result::Result<T, RetryError<E>>
where
    E: Transient + std::error::Error + Send + Sync + 'static,
    F: FnMut() -> std::result::Result<T, E>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        debug!("{} attempt {}/{}", label, attempt, policy.max_attempts);

        match op() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_transient() {
                    warn!("{} failed with non-retryable error: {}", label, error);
                    return Err(RetryError::Permanent(error));
                }

                warn!(
                    "{} failed (attempt {}/{}): {}",
                    label, attempt, policy.max_attempts, error
                );
                last_error = Some(error);

                if attempt < policy.max_attempts {
                    let delay = policy.backoff_delay(attempt);
                    debug!("waiting {:?} before retrying {}", delay, label);
                    std::thread::sleep(delay);
                }
            }
        }
    }

    let source = last_error.expect("at least one attempt is always made");
    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
        source,
    })
}
