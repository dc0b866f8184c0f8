//! Bounded Retry
//!
//! Retry policy as plain data plus a combinator that applies it. The policy
//! decides from `(attempt, is_transient)` alone, so it can be tested without
//! any I/O; [`RetryPolicy::run`] only adds sleeping and cancellation.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::cancel::CancelToken;

/// Errors that know whether trying again can help
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

/// Successful result together with the attempt that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Why a retried operation ultimately failed
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error is not transient and was not retried
    #[error("{error} (attempt {attempts}, not retried)")]
    Permanent { attempts: u32, error: E },

    /// Every allowed attempt failed with a transient error
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// Cancellation was requested between attempts
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last_error: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Permanent { error, .. } => Some(error),
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Permanent { error, .. } => Some(error),
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`, without jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }

    /// Decide after `attempt` (1-based) failed
    pub fn decide(&self, attempt: u32, transient: bool) -> RetryDecision {
        if !transient || attempt >= self.max_attempts.max(1) {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay_for(attempt))
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4);
        delay + Duration::from_millis(extra_ms)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts or
    /// `cancel` fires. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        E: Transient,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        let mut last_error: Option<E> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt, last_error });
            }

            attempt += 1;
            let err = match op(attempt).await {
                Ok(value) => return Ok(Attempted { value, attempts: attempt }),
                Err(e) => e,
            };

            match self.decide(attempt, err.is_transient()) {
                RetryDecision::GiveUp if !err.is_transient() => {
                    return Err(RetryError::Permanent { attempts: attempt, error: err });
                }
                RetryDecision::GiveUp => {
                    return Err(RetryError::Exhausted { attempts: attempt, last_error: err });
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                    last_error = Some(err);
                    tokio::select! {
                        _ = tokio::time::sleep(self.jittered(delay)) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            jitter: false,
        };
        assert_eq!(policy.decide(1, true), RetryDecision::RetryAfter(Duration::from_millis(100)));
        assert_eq!(policy.decide(2, true), RetryDecision::RetryAfter(Duration::from_millis(200)));
        assert_eq!(policy.decide(3, true), RetryDecision::GiveUp);
        assert_eq!(policy.decide(1, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            jitter: false,
        };
        assert_eq!(policy.delay_for(5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run(&CancelToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError::Flaky)
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast_policy(3)
            .run(&CancelToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::Fatal) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::Permanent { attempts: 1, error: TestError::Fatal }));
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_error() {
        let err = fast_policy(3)
            .run(&CancelToken::new(), |_| async { Err::<(), _>(TestError::Flaky) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_error(), Some(&TestError::Flaky));
        assert!(err.to_string().contains("gave up after 3 attempts"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = fast_policy(3)
            .run(&cancel, |_| async { Ok::<_, TestError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled { attempts: 0, last_error: None }));
    }
}
