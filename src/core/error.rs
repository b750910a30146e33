//! Error types for admission, storage, and orchestration.

use thiserror::Error;

use crate::core::model::SyncRun;
use crate::core::rate_limit::RateLimitHeaders;

/// Outcome classification for a single call to the external data API.
///
/// The admission queue pattern-matches on these variants to decide whether a
/// failed call is retried.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The API signalled quota exhaustion (HTTP 429 or equivalent).
    #[error("throttled by upstream API{}: {message}", retry_label(.retry_after_secs))]
    Throttled {
        /// Error detail.
        message: String,
        /// Server-provided retry hint in seconds, if any.
        retry_after_secs: Option<u64>,
        /// Rate-limit metadata attached to the response.
        rate_limit: Option<RateLimitHeaders>,
    },
    /// Server-side or network failure that may succeed on retry.
    #[error("transient upstream error{}: {message}", status_label(.status))]
    Transient {
        /// HTTP-like status code, absent for network-level failures.
        status: Option<u16>,
        /// Error detail.
        message: String,
        /// Rate-limit metadata attached to the response.
        rate_limit: Option<RateLimitHeaders>,
    },
    /// The call did not complete in time.
    #[error("upstream request timed out")]
    Timeout,
    /// Any other unsuccessful response. Never retried.
    #[error("upstream request failed{}: {message}", status_label(.status))]
    Permanent {
        /// HTTP-like status code, if known.
        status: Option<u16>,
        /// Error detail.
        message: String,
        /// Rate-limit metadata attached to the response.
        rate_limit: Option<RateLimitHeaders>,
    },
}

impl ApiError {
    /// Classify an unsuccessful HTTP-like status code.
    ///
    /// `429` is throttling, `408` and `5xx` are transient, everything else is
    /// permanent.
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        rate_limit: Option<RateLimitHeaders>,
    ) -> Self {
        let message = message.into();
        match status {
            429 => Self::Throttled {
                message,
                retry_after_secs: None,
                rate_limit,
            },
            408 | 500..=599 => Self::Transient {
                status: Some(status),
                message,
                rate_limit,
            },
            _ => Self::Permanent {
                status: Some(status),
                message,
                rate_limit,
            },
        }
    }

    /// Throttling error carrying the server's Retry-After hint.
    pub fn throttled(retry_after_secs: Option<u64>, rate_limit: Option<RateLimitHeaders>) -> Self {
        Self::Throttled {
            message: "rate limit exceeded".to_string(),
            retry_after_secs,
            rate_limit,
        }
    }

    /// Attach a Retry-After hint. Only throttling errors carry one.
    #[must_use]
    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        if let Self::Throttled {
            retry_after_secs, ..
        } = &mut self
        {
            *retry_after_secs = secs;
        }
        self
    }

    /// Shorthand for a permanent error without a status code.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            status: None,
            message: message.into(),
            rate_limit: None,
        }
    }

    /// Shorthand for a transient network-level error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
            rate_limit: None,
        }
    }

    /// Whether the admission queue may retry this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Transient { .. } | Self::Timeout
        )
    }

    /// Rate-limit metadata carried by the failed response.
    #[must_use]
    pub const fn rate_limit(&self) -> Option<RateLimitHeaders> {
        match self {
            Self::Throttled { rate_limit, .. }
            | Self::Transient { rate_limit, .. }
            | Self::Permanent { rate_limit, .. } => *rate_limit,
            Self::Timeout => None,
        }
    }

    /// Server retry hint, only present on throttling errors.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Throttled {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |code| format!(" ({code})"))
}

fn retry_label(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs.map_or_else(String::new, |secs| format!(" (retry after {secs}s)"))
}

/// Errors settled on an admission handle.
#[derive(Debug, Clone, Error)]
pub enum AdmissionError {
    /// The unit of work failed permanently or exhausted its retry budget.
    #[error("request failed after {attempts} attempt(s): {source}")]
    Api {
        /// Total invocations made, including the first.
        attempts: u32,
        /// Last error returned by the unit of work.
        #[source]
        source: ApiError,
    },
    /// The request was still pending when the queue was cleared.
    #[error("request cancelled before dispatch")]
    Cancelled,
    /// The queue dropped the request without settling it.
    #[error("admission queue closed")]
    Closed,
}

/// Errors produced by durable state stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    /// Value could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Orchestration-level failures signalled to the scheduler.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The run failed before any account was processed. The recorded
    /// catastrophic run is attached.
    #[error("sync run failed: {message}")]
    Fatal {
        /// Failure detail.
        message: String,
        /// The catastrophic run record that was persisted.
        run: Box<SyncRun>,
    },
    /// Manual runs are refused in production configurations.
    #[error("manual sync trigger is disabled in production")]
    ManualTriggerDisabled,
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
