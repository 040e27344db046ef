// Retry-with-backoff shared by the HTTP pollers and the scheduled posters.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial * factor^(attempt - 1)`
    Exponential { factor: u32 },
    /// `initial * attempt`
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff: Backoff,
}

/// Outcome of a single attempt that did not succeed.
#[derive(Debug)]
pub enum Failure<E> {
    /// Worth another attempt.
    Transient(E),
    /// Retrying cannot help; stop immediately.
    Permanent(E),
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("cancelled")]
    Cancelled,
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("{0}")]
    Aborted(E),
}

impl RetryPolicy {
    /// Three attempts, waiting 1s then 2s.
    pub const HTTP: RetryPolicy = RetryPolicy::exponential(3, Duration::from_secs(1), 2);

    pub const fn exponential(max_attempts: u32, initial_backoff: Duration, factor: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            backoff: Backoff::Exponential { factor },
        }
    }

    pub const fn linear(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            backoff: Backoff::Linear,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Exponential { factor } => self
                .initial_backoff
                .saturating_mul(factor.saturating_pow(attempt - 1)),
            Backoff::Linear => self.initial_backoff.saturating_mul(attempt),
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget is
    /// spent. Cancellation is observed both while an attempt is in flight and
    /// while backing off.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = op(attempt) => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(Failure::Permanent(e)) => return Err(RetryError::Aborted(e)),
                Err(Failure::Transient(e)) => {
                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted { attempts: attempt, last: e });
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(self.delay_after(attempt)) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
