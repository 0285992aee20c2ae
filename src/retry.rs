//! Retry logic for transfer attempts
//!
//! Transfers are retried a bounded number of times with a (by default fixed) pause between
//! attempts. Cancellation is checked after every failed attempt and interrupts the pause, so a
//! shutdown never waits out a backoff.
//!
//! # Example
//!
//! ```no_run
//! use chat_media_dl::config::RetryConfig;
//! use chat_media_dl::error::Error;
//! use chat_media_dl::retry::retry_with_cancel;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let result = retry_with_cancel(&config, &cancel, |_attempt| async {
//!     Ok::<_, Error>(())
//! })
//! .await;
//! assert!(result.is_ok());
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Remote failures (timeouts, flood waits, dropped connections) are worth another go
            Error::Source(_) => true,
            // Local write errors during a transfer may clear up (e.g. interrupted syscalls)
            Error::Io(_) => true,
            Error::Other(_) => true,
            Error::Serialization(_) => false,
            Error::Config { .. } => false,
            Error::InvalidMessage { .. } => false,
            Error::Cancelled => false,
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// Cancellation was observed after a failed attempt or during the pause
    Cancelled {
        /// Attempts made before stopping
        attempts: u32,
        /// Error of the last attempt
        last_error: E,
    },
    /// Every attempt failed
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last_error: E,
    },
    /// The operation failed with an error that retrying cannot fix
    Permanent {
        /// Attempt that produced the error
        attempts: u32,
        /// The error
        error: E,
    },
}

impl<E> RetryFailure<E> {
    /// Error of the final attempt
    pub fn last_error(&self) -> &E {
        match self {
            RetryFailure::Cancelled { last_error, .. } => last_error,
            RetryFailure::Exhausted { last_error, .. } => last_error,
            RetryFailure::Permanent { error, .. } => error,
        }
    }

    /// Number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryFailure::Cancelled { attempts, .. }
            | RetryFailure::Exhausted { attempts, .. }
            | RetryFailure::Permanent { attempts, .. } => *attempts,
        }
    }

    /// Whether the retry loop stopped because of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryFailure::Cancelled { .. })
    }
}

/// Execute an async operation up to `config.max_attempts` times.
///
/// `operation` receives the 1-based attempt number. After a failed attempt the loop stops
/// immediately if `cancel` has fired; otherwise it sleeps for the current delay (interruptible
/// by `cancel`) before trying again.
pub async fn retry_with_cancel<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            tracing::debug!(attempt, error = %error, "Cancelled after failed attempt");
            return Err(RetryFailure::Cancelled {
                attempts: attempt,
                last_error: error,
            });
        }

        if !error.is_retryable() {
            tracing::error!(error = %error, "Operation failed with non-retryable error");
            return Err(RetryFailure::Permanent {
                attempts: attempt,
                error,
            });
        }

        if attempt >= max_attempts {
            tracing::error!(
                error = %error,
                attempts = attempt,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(RetryFailure::Exhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        let wait = if config.jitter {
            add_jitter(delay)
        } else {
            delay
        };

        tracing::warn!(
            error = %error,
            attempt,
            max_attempts,
            delay_ms = wait.as_millis(),
            "Operation failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryFailure::Cancelled {
                    attempts: attempt,
                    last_error: error,
                });
            }
            _ = tokio::time::sleep(wait) => {}
        }

        delay = next_delay(delay, config);
    }
}

/// Delay before the attempt after one that waited `delay`, capped at `max_delay`.
///
/// Products that are not representable (negative, NaN, overflowing) fall back to the cap.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}
