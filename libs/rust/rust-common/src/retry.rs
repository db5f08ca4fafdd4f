//! Retry policy implementation with exponential backoff.
//!
//! Operations report failures as either [`Backoff::Transient`], which is
//! retried after a growing delay, or [`Backoff::Permanent`], which stops the
//! loop immediately. The loop also stops once the next delay would carry the
//! total elapsed time past the configured budget, or when the supplied
//! cancellation token fires.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay before jitter
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Jitter spread: a delay `d` becomes a value in `d * (1 ± factor)`
    pub randomization_factor: f64,
    /// Total time budget across all attempts and delays
    pub max_elapsed_time: Duration,
    /// Optional cap on the number of retries after the first attempt
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_elapsed_time: Duration::from_secs(15 * 60),
            max_retries: None,
        }
    }
}

impl RetryConfig {
    /// Set the total elapsed-time budget.
    #[must_use]
    pub const fn with_max_elapsed_time(mut self, budget: Duration) -> Self {
        self.max_elapsed_time = budget;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between attempts.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Cap the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }
}

/// Failure classification returned by a retried operation.
#[derive(Debug)]
pub enum Backoff<E> {
    /// Retry after a delay.
    Transient(E),
    /// Stop immediately and surface the error.
    Permanent(E),
}

impl<E> Backoff<E> {
    /// Wrap a retryable error.
    pub const fn transient(error: E) -> Self {
        Self::Transient(error)
    }

    /// Wrap an error that must not be retried.
    pub const fn permanent(error: E) -> Self {
        Self::Permanent(error)
    }

    /// Whether this failure ends the retry loop.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Unwrap the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation reported a permanent failure.
    #[error("permanent failure: {0}")]
    Permanent(E),

    /// The elapsed-time budget (or retry cap) ran out.
    #[error("retry budget exhausted after {attempts} attempts in {elapsed:?}: {last}")]
    Exhausted {
        /// Error from the final attempt
        last: E,
        /// Attempts made
        attempts: u32,
        /// Time spent before giving up
        elapsed: Duration,
    },

    /// The cancellation token fired.
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts started before cancellation
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Whether the loop stopped because of cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Retry policy for executing operations with automatic retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Calculate the delay that follows the given (zero-based) attempt.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let base_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let factor = self.config.randomization_factor.clamp(0.0, 1.0);
        let delay_ms = if factor > 0.0 {
            let delta = base_ms * factor;
            (base_ms - delta) + rand::random::<f64>() * (2.0 * delta)
        } else {
            base_ms
        };

        Duration::from_millis(delay_ms as u64)
    }

    /// Execute an async operation with retries and no external cancellation.
    ///
    /// # Errors
    ///
    /// See [`RetryPolicy::execute_cancellable`].
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Backoff<E>>>,
    {
        self.execute_cancellable(&CancellationToken::new(), operation).await
    }

    /// Execute an async operation with retries until it succeeds, fails
    /// permanently, runs out of budget, or `cancel` fires.
    ///
    /// Cancellation interrupts both an in-flight attempt and a pending
    /// backoff sleep.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Permanent`] on the first permanent failure,
    /// [`RetryError::Exhausted`] when the budget runs out, and
    /// [`RetryError::Cancelled`] when `cancel` fires.
    pub async fn execute_cancellable<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Backoff<E>>>,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts });
            }

            attempts += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
                outcome = operation() => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(Backoff::Permanent(error)) => return Err(RetryError::Permanent(error)),
                Err(Backoff::Transient(error)) => error,
            };

            let elapsed = started.elapsed();
            let delay = self.delay_for_attempt(attempts - 1);
            let out_of_retries = self.config.max_retries.is_some_and(|max| attempts > max);

            if out_of_retries || elapsed + delay > self.config.max_elapsed_time {
                return Err(RetryError::Exhausted {
                    last: error,
                    attempts,
                    elapsed,
                });
            }

            debug!(attempt = attempts, delay = ?delay, "Retrying after transient failure");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Get the elapsed-time budget.
    #[must_use]
    pub const fn max_elapsed_time(&self) -> Duration {
        self.config.max_elapsed_time
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}
