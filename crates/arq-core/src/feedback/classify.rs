//! Map failures onto user-facing error records.

use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;
use crate::monitor::{NetworkState, NetworkStatus};
use crate::transport::RequestDescriptor;

use super::Severity;

/// Category of a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Http,
    Business,
    Cancelled,
    QueueTimeout,
    Invalid,
}

/// A classified failure: everything the feedback pipeline and reporting
/// need, derived once and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    /// User-facing message.
    pub message: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
    /// Structured context for logs and telemetry.
    pub details: serde_json::Value,
}

/// Classifies a failure. The monitor's current state disambiguates
/// no-response errors (offline vs. unreachable server); the request, when
/// given, enriches the structured details.
pub fn classify(
    error: &ApiError,
    state: &NetworkState,
    request: Option<&RequestDescriptor>,
) -> ErrorRecord {
    let (kind, severity, message, retryable) = match error {
        ApiError::Http { status, .. } => {
            let (message, severity, retryable) = http_entry(*status);
            (ErrorKind::Http, severity, message, retryable)
        }
        ApiError::Network { .. } => {
            let message = if state.status == NetworkStatus::Offline {
                "You are offline. Check your connection and try again."
            } else {
                "Unable to reach the server. Check your connection."
            };
            (ErrorKind::Network, Severity::Warning, message.to_string(), true)
        }
        ApiError::Timeout { .. } => {
            let message = if state.status == NetworkStatus::Slow {
                "The request timed out on a slow connection. Try again."
            } else {
                "The request timed out. Try again."
            };
            (ErrorKind::Timeout, Severity::Warning, message.to_string(), true)
        }
        ApiError::Business { message, .. } => (
            ErrorKind::Business,
            Severity::Error,
            message.clone(),
            false,
        ),
        ApiError::Cancelled => (
            ErrorKind::Cancelled,
            Severity::Info,
            "The request was cancelled.".to_string(),
            false,
        ),
        ApiError::QueueTimeout => (
            ErrorKind::QueueTimeout,
            Severity::Warning,
            "The request expired while waiting to be sent. Try again.".to_string(),
            true,
        ),
        ApiError::InvalidRequest(_) => (
            ErrorKind::Invalid,
            Severity::Error,
            "The request could not be issued.".to_string(),
            false,
        ),
    };

    let details = json!({
        "error": error.to_string(),
        "url": request.map(|r| r.url.clone()),
        "method": request.map(|r| r.method.as_str()),
        "network_status": format!("{:?}", state.status),
        "business_code": match error {
            ApiError::Business { code, .. } => Some(*code),
            _ => None,
        },
    });

    ErrorRecord {
        kind,
        severity,
        message,
        retryable,
        http_status: error.status(),
        details,
    }
}

/// Status table: user message, severity, and whether a retry can help.
fn http_entry(status: u16) -> (String, Severity, bool) {
    let entry: (&str, Severity, bool) = match status {
        400 => ("Invalid request parameters.", Severity::Warning, false),
        401 => (
            "Your session has expired. Please sign in again.",
            Severity::Error,
            false,
        ),
        403 => (
            "You do not have permission to access this resource.",
            Severity::Error,
            false,
        ),
        404 => (
            "The requested resource was not found.",
            Severity::Warning,
            false,
        ),
        405 => ("Request method not allowed.", Severity::Warning, false),
        408 => ("The server timed out on the request.", Severity::Warning, true),
        409 => (
            "The resource was modified by someone else. Reload and retry.",
            Severity::Warning,
            false,
        ),
        429 => (
            "Too many requests. Please wait a moment and try again.",
            Severity::Warning,
            true,
        ),
        500 => (
            "The server encountered an internal error.",
            Severity::Error,
            true,
        ),
        501 => (
            "The server does not support this operation.",
            Severity::Error,
            false,
        ),
        502 => ("Bad gateway. Please try again later.", Severity::Error, true),
        503 => (
            "The service is temporarily unavailable.",
            Severity::Error,
            true,
        ),
        504 => (
            "The gateway timed out. Please try again later.",
            Severity::Error,
            true,
        ),
        other if other >= 500 => {
            return (
                format!("The server failed to handle the request (HTTP {other})."),
                Severity::Error,
                true,
            )
        }
        other => {
            return (
                format!("The request failed (HTTP {other})."),
                Severity::Warning,
                false,
            )
        }
    };
    (entry.0.to_string(), entry.1, entry.2)
}
