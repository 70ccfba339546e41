//! Typed request error taxonomy.
//!
//! Every failure a caller can observe is one of these variants, so retry
//! classification and user feedback can match on structure instead of
//! string-sniffing transport errors. Cloneable so merged queue waiters and
//! shared cache fetches can all receive the same failure.

use std::time::Duration;

use thiserror::Error;

/// Error surfaced by the request pipeline.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Transport-level failure, no HTTP response was received.
    /// `connect: true` means the request never reached the server
    /// (connection refused, DNS failure) and is safe to repeat for any
    /// method; `connect: false` means the failure happened mid-exchange
    /// and the server may have processed the request.
    #[error("network error: {message}")]
    Network { message: String, connect: bool },

    /// The transport gave up waiting for a response.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Server responded with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Server-directed retry delay (`Retry-After`), already parsed.
        retry_after: Option<Duration>,
    },

    /// Transport-level success (2xx) carrying an application-level failure
    /// code in the payload. Never retried automatically.
    #[error("business error {code}: {message}")]
    Business { code: i64, message: String },

    /// The request was cancelled before completion (e.g. `cancel_all`).
    #[error("request cancelled")]
    Cancelled,

    /// The request expired while waiting for a scheduler slot.
    #[error("timed out waiting in the request queue")]
    QueueTimeout,

    /// The descriptor could not be turned into a request, or a response
    /// body could not be decoded as requested.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status code, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-directed retry delay, if one was sent.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// True when no HTTP response was received (network failure or timeout).
    pub fn is_no_response(&self) -> bool {
        matches!(self, ApiError::Network { .. } | ApiError::Timeout { .. })
    }

    /// True when the request is known to have never reached the server.
    pub fn never_sent(&self) -> bool {
        matches!(self, ApiError::Network { connect: true, .. })
    }
}
