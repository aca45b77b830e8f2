use std::{future::Future, time::Duration};

use tokio::time::sleep;

use super::BrowserError;

/// Delay inserted after a failed attempt, before the next one.
#[derive(Clone, Debug, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * attempt`, the attempt number starting at 1.
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Linear(base) => *base * attempt,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Backoff) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            backoff,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FailureKind<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("aborted: {0}")]
    Aborted(E),
}

/// Errors that can tell whether another attempt is pointless.
pub trait Retryable {
    fn is_fatal(&self) -> bool {
        false
    }
}

impl Retryable for BrowserError {
    fn is_fatal(&self) -> bool {
        BrowserError::is_fatal(self)
    }
}

/// Failure of one step inside a bounded retry: either the browser faulted or
/// the page simply is not in the expected shape yet.
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("not ready: {0}")]
    NotReady(String),
}

impl StepError {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        StepError::NotReady(reason.into())
    }
}

impl Retryable for StepError {
    fn is_fatal(&self) -> bool {
        matches!(self, StepError::Browser(e) if e.is_fatal())
    }
}

impl FailureKind<StepError> {
    /// Surfaces a fatal session fault and swallows everything else.
    pub fn fatal(self) -> Result<(), BrowserError> {
        match self {
            FailureKind::Aborted(StepError::Browser(e)) => Err(e),
            FailureKind::Exhausted { attempts, last } => {
                log::debug!("Retry exhausted after {} attempts: {}", attempts, last);
                Ok(())
            }
            FailureKind::Aborted(e) => {
                log::debug!("Retry aborted: {}", e);
                Ok(())
            }
        }
    }
}

/// Runs `operation` until it succeeds, a fatal error occurs, or the attempt
/// budget runs out. The closure receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, FailureKind<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() => return Err(FailureKind::Aborted(e)),
            Err(e) if attempt >= policy.attempts => {
                return Err(FailureKind::Exhausted {
                    attempts: attempt,
                    last: e,
                })
            }
            Err(e) => {
                let delay = policy.backoff.delay(attempt);
                log::debug!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
