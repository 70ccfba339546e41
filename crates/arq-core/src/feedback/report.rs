//! Fire-and-forget error reporting to a telemetry endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::transport::{RequestDescriptor, Transport};

use super::ErrorRecord;

/// Delivery timeout for a report; reporting must never hold anything up.
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts classified failures to a collection endpoint. Delivery runs on a
/// spawned task and failures are swallowed: telemetry must never become a
/// second failure the caller sees.
pub struct ErrorReporter {
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl ErrorReporter {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    pub fn report(&self, record: &ErrorRecord) {
        let payload = json!({
            "kind": record.kind,
            "severity": record.severity,
            "message": record.message,
            "http_status": record.http_status,
            "retryable": record.retryable,
            "details": record.details,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let request = match RequestDescriptor::post(self.endpoint.as_str())
            .with_timeout(REPORT_TIMEOUT)
            .with_json_body(&payload)
        {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "error report serialization failed");
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        // No runtime (e.g. handle() called from sync teardown): drop the
        // report rather than fail.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = transport.execute(&request).await {
                    tracing::debug!(error = %err, "error report delivery failed");
                }
            });
        }
    }
}
