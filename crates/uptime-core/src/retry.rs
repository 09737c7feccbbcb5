//! Bounded retry helper shared by the health checker and the notifier.
//!
//! Every attempt runs under its own timeout. Failed attempts are retried up to
//! `max_retries` more times unless the error reports itself as permanent.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    /// Base backoff before a retry, doubled on every further attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_retries,
            attempt_timeout,
            backoff: Duration::ZERO,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before the given (1-based) retry.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry - 1))
    }

    /// Upper bound on the wall time of one full retry sequence.
    pub fn budget(&self) -> Duration {
        let attempts = self.attempt_timeout.saturating_mul(self.max_attempts());
        let backoff = self
            .backoff
            .saturating_mul(2u32.saturating_pow(self.max_retries).saturating_sub(1));
        attempts.saturating_add(backoff)
    }
}

/// Whole milliseconds in `d`, clamped to `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Whether an error may go away on a later attempt.
pub trait Transient {
    fn is_transient(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: Transient> Transient for AttemptError<E> {
    fn is_transient(&self) -> bool {
        match self {
            Self::TimedOut(_) => true,
            Self::Failed(e) => e.is_transient(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut(after) => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Outcome of a retried operation together with the number of attempts made.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub outcome: Result<T, AttemptError<E>>,
    pub attempts: u32,
}

impl<T, E> Retried<T, E> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run `op` until it succeeds, returns a permanent error, or the policy is exhausted.
///
/// `op` receives the zero-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Retried<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient,
{
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let backoff = policy.backoff_for(attempt);
            if !backoff.is_zero() {
                debug!(attempt, backoff_ms = millis(backoff), "Backing off before retry");
                tokio::time::sleep(backoff).await;
            }
        }

        let error = match tokio::time::timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(Ok(value)) => {
                return Retried {
                    outcome: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut(policy.attempt_timeout),
        };

        let attempts = attempt + 1;
        if attempts >= policy.max_attempts() || !error.is_transient() {
            return Retried {
                outcome: Err(error),
                attempts,
            };
        }
        attempt += 1;
    }
}
