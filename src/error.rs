//! Error taxonomy for the sync adapter.
//!
//! Kinds, not types, per the design: callers match on `SyncError` to decide
//! what to log or surface, not to recover program flow (retry has already
//! happened by the time an error reaches this level).

use thiserror::Error;

/// Errors that can surface from a single request/response exchange, before
/// the [`crate::retry::Retrier`] has had a chance to retry it.
///
/// `ForecastFailure` and config-file parsing are deliberately absent here:
/// forecast errors are folded into a warning log by the orchestrator and
/// never returned (spec.md §4.5 step 7, §7), and config parsing is out of
/// scope (spec.md §1).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// HTTP 429, with the vendor's retry-after duration in seconds.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// HTTP 500/502/503/504.
    #[error("transient vendor failure: HTTP {status}")]
    Transient { status: u16 },

    /// HTTP 401 or 403.
    #[error("authentication rejected: {message}")]
    AuthRejected { message: String },

    /// HTTP 404.
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// Any other non-2xx, non-429 status (400, 422, ...). Not retried.
    #[error("vendor rejected request: HTTP {status} - {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not parse as the expected page shape.
    #[error("failed to decode response body: {0}")]
    DecodeFailed(String),

    /// Connection-level failure (DNS, TLS, reset, timeout that isn't cancellation).
    #[error("network error: {0}")]
    Network(String),

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether the [`crate::retry::Retrier`] should attempt this request again.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. } | TransportError::Transient { .. } | TransportError::Network(_)
        )
    }
}

/// Top-level error returned by [`crate::orchestrator::Orchestrator::sync`].
///
/// This is the taxonomy named in the design: `ConfigInvalid`, `AuthRejected`,
/// `NotFound`, `RateLimited`, `Transient`, `DecodeFailed`, `Cancelled`,
/// `SinkFailure`. `ForecastFailure` is intentionally not a variant — forecast
/// failures are logged as warnings and never returned.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The supplied `SyncConfig` failed validation before any network call was made.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// HTTP 401/403 from the vendor.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// HTTP 404 from the vendor.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Vendor rejected the request with a non-retriable 4xx other than 401/403/404.
    #[error("vendor rejected request: {0}")]
    Rejected(String),

    /// Vendor rate limit exceeded and the retry budget was exhausted.
    #[error("rate limited after {attempts} attempt(s): {message}")]
    RateLimited { attempts: u32, message: String },

    /// Transient failure (5xx or network) whose retry budget was exhausted.
    #[error("transient failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// Response body failed to parse as the expected shape.
    #[error("failed to decode response body: {0}")]
    DecodeFailed(String),

    /// The caller's cancellation token fired while waiting on I/O or a backoff sleep.
    #[error("sync cancelled")]
    Cancelled,

    /// The sink rejected a write, or both bookmark read attempts failed in a way
    /// that must abort (writes only — bookmark *write* failures are warned, not returned).
    #[error("sink operation failed: {0}")]
    SinkFailure(String),
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AuthRejected { message } => SyncError::AuthRejected(message),
            TransportError::NotFound { message } => SyncError::NotFound(message),
            TransportError::Rejected { status, message } => {
                SyncError::Rejected(format!("HTTP {status} - {message}"))
            }
            TransportError::DecodeFailed(msg) => SyncError::DecodeFailed(msg),
            TransportError::Cancelled => SyncError::Cancelled,
            TransportError::RateLimited { retry_after_secs } => SyncError::RateLimited {
                attempts: 1,
                message: format!("retry-after {retry_after_secs}s"),
            },
            TransportError::Transient { status } => SyncError::Transient {
                attempts: 1,
                message: format!("HTTP {status}"),
            },
            TransportError::Network(msg) => SyncError::Transient {
                attempts: 1,
                message: msg,
            },
        }
    }
}
