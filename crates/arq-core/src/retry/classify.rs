//! Decide whether a failure is worth repeating, and parse server hints.

use std::time::Duration;

use crate::error::ApiError;
use crate::transport::Method;

/// Default retryability rule.
///
/// Transport failures where the request never reached the server are safe
/// to repeat for any method. Ambiguous failures (timeouts, connections
/// dropped mid-exchange) are repeated only for idempotent methods, since
/// the server may already have processed a POST/PATCH. Of the HTTP
/// statuses, 408/429/5xx are transient; 401 is retryable (after the host
/// refreshes credentials) unless the failing request is itself the
/// token-refresh call, which would loop forever.
pub fn is_retryable(error: &ApiError, method: Method, is_refresh_call: bool) -> bool {
    match error {
        ApiError::Network { connect: true, .. } => true,
        ApiError::Network { connect: false, .. } | ApiError::Timeout { .. } => {
            method.is_idempotent()
        }
        ApiError::Http { status, .. } => match status {
            408 | 429 => true,
            500..=599 => true,
            401 => !is_refresh_call,
            _ => false,
        },
        ApiError::Business { .. }
        | ApiError::Cancelled
        | ApiError::QueueTimeout
        | ApiError::InvalidRequest(_) => false,
    }
}

/// Parse a `Retry-After` header value: either delta-seconds or an HTTP
/// date (RFC 2822). A date in the past yields a zero delay.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
