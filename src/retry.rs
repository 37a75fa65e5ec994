//! Bounded retry with exponential backoff and jitter around a single
//! logical request.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(30);
const JITTER_FRACTION: f64 = 0.25;

/// `delay = min(cap, base * 2^attempt) * (1 + U[-jitter, +jitter])`
fn backoff_duration(attempt: u32) -> Duration {
    let exp = BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(CAP);

    let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let factor = (1.0 + jitter).max(0.0);
    capped.mul_f64(factor)
}

/// Wraps a fallible, retriable async operation in the sync's bounded retry
/// budget. `max_retries` is the configured ceiling (default 5); the total
/// attempt budget is `1 + max_retries`.
pub struct Retrier {
    max_retries: u32,
}

impl Retrier {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Runs `operation` up to `1 + max_retries` times, sleeping between
    /// retriable failures per the backoff policy. Returns the last error
    /// once the budget is exhausted, or immediately on a non-retriable
    /// error or cancellation.
    ///
    /// # Errors
    ///
    /// Returns the final [`TransportError`] once retries are exhausted, or
    /// propagates a non-retriable error immediately.
    pub async fn call<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let outcome = operation().await;

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(TransportError::Cancelled) => return Err(TransportError::Cancelled),
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.max_retries {
                warn!(attempts = attempt + 1, error = %err, "retry budget exhausted");
                return Err(err);
            }

            let delay = match &err {
                TransportError::RateLimited { retry_after_secs } => {
                    backoff_duration(attempt).max(Duration::from_secs(*retry_after_secs))
                }
                _ => backoff_duration(attempt),
            };

            debug!(attempt, ?delay, error = %err, "retrying after backoff");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
