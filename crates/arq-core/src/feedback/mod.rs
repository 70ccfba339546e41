//! Error feedback: user notification, global error state, reporting.
//!
//! [`classify`] turns an [`ApiError`](crate::error::ApiError) into an
//! [`ErrorRecord`]; [`Feedback::handle`] performs the configured side
//! effects for it. Side effects are best-effort: a failure in the feedback
//! path never masks the original error.

mod classify;
mod report;

pub use classify::{classify, ErrorKind, ErrorRecord};
pub use report::ErrorReporter;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How loud a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

/// User-facing message handed to the host's notification surface.
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    /// How long to show the message; zero means sticky.
    pub duration: Duration,
}

/// Host-provided notification surface (toast, status bar, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Host-provided credential store used by the 401 recovery flow.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn clear(&self);
}

/// Which side effects [`Feedback::handle`] performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPolicy {
    pub notify_user: bool,
    pub update_global_error: bool,
    pub report_errors: bool,
    pub log_details: bool,
}

impl Default for FeedbackPolicy {
    fn default() -> Self {
        Self {
            notify_user: true,
            update_global_error: false,
            report_errors: false,
            log_details: true,
        }
    }
}

/// How long user notifications stay visible.
const NOTIFY_DURATION: Duration = Duration::from_secs(5);
/// How long the global error state holds a message before auto-clearing.
const GLOBAL_ERROR_WINDOW: Duration = Duration::from_secs(5);
/// Bounded diagnostic history.
const MAX_HISTORY: usize = 50;

/// Process-wide "last error" cell with timed auto-clear. A newer error
/// restarts the window; a stale clear never wipes a newer message.
#[derive(Clone, Default)]
pub struct GlobalErrorState {
    inner: Arc<Mutex<(u64, Option<String>)>>,
}

impl GlobalErrorState {
    pub fn set(&self, message: String) {
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            inner.0 += 1;
            inner.1 = Some(message);
            inner.0
        };
        // Auto-clear needs a runtime; without one the message simply stays
        // until overwritten.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let state = self.clone();
            handle.spawn(async move {
                tokio::time::sleep(GLOBAL_ERROR_WINDOW).await;
                let mut inner = state.inner.lock().unwrap();
                if inner.0 == generation {
                    inner.1 = None;
                }
            });
        }
    }

    pub fn current(&self) -> Option<String> {
        self.inner.lock().unwrap().1.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().1 = None;
    }
}

/// The feedback sink: owns the notifier, reporter, global error cell, and
/// a bounded record history for diagnostics surfaces.
pub struct Feedback {
    notifier: Option<Arc<dyn Notifier>>,
    reporter: Option<ErrorReporter>,
    global: GlobalErrorState,
    history: Mutex<VecDeque<ErrorRecord>>,
}

impl Feedback {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, reporter: Option<ErrorReporter>) -> Self {
        Self {
            notifier,
            reporter,
            global: GlobalErrorState::default(),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Performs the configured side effects for one classified failure.
    pub fn handle(&self, record: &ErrorRecord, policy: &FeedbackPolicy) {
        self.remember(record);

        if policy.log_details {
            match record.severity {
                Severity::Error | Severity::Fatal => tracing::error!(
                    kind = ?record.kind,
                    status = record.http_status,
                    retryable = record.retryable,
                    details = %record.details,
                    "{}",
                    record.message
                ),
                _ => tracing::warn!(
                    kind = ?record.kind,
                    status = record.http_status,
                    retryable = record.retryable,
                    "{}",
                    record.message
                ),
            }
        }

        if policy.notify_user {
            let duration = match record.severity {
                Severity::Fatal => Duration::ZERO,
                _ => NOTIFY_DURATION,
            };
            self.notify(Notification {
                message: record.message.clone(),
                severity: record.severity,
                duration,
            });
        }

        if policy.update_global_error {
            self.global.set(record.message.clone());
        }

        if policy.report_errors {
            if let Some(reporter) = &self.reporter {
                reporter.report(record);
            }
        }
    }

    /// Informational notice shown on first entry into a retry sequence.
    /// Intermediate retries stay silent so one logical failure produces at
    /// most one progress notice plus one final outcome.
    pub fn notify_retrying(&self, attempt: u32, max_retries: u32) {
        self.notify(Notification {
            message: format!("Request failed, retrying ({attempt}/{max_retries})..."),
            severity: Severity::Info,
            duration: Duration::from_secs(2),
        });
    }

    /// Notice shown when a request is parked in the offline queue.
    pub fn notify_offline_capture(&self) {
        self.notify(Notification {
            message: "You are offline; the request will be sent when the connection returns."
                .to_string(),
            severity: Severity::Warning,
            duration: Duration::from_secs(3),
        });
    }

    fn notify(&self, notification: Notification) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(&notification);
        }
    }

    fn remember(&self, record: &ErrorRecord) {
        let mut history = self.history.lock().unwrap();
        history.push_back(record.clone());
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<ErrorRecord> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    pub fn global_error(&self) -> Option<String> {
        self.global.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::monitor::{ConnectionType, NetworkState, NetworkStatus};

    struct RecordingNotifier(Mutex<Vec<Notification>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.clone());
        }
    }

    fn online_state() -> NetworkState {
        NetworkState {
            status: NetworkStatus::Online,
            conn_type: ConnectionType::Unknown,
            last_ping: None,
        }
    }

    fn record_for(status: u16) -> ErrorRecord {
        classify(
            &ApiError::Http {
                status,
                message: format!("HTTP {status}"),
                retry_after: None,
            },
            &online_state(),
            None,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn handle_notifies_and_updates_global_state() {
        let notifier = Arc::new(RecordingNotifier(Mutex::new(Vec::new())));
        let feedback = Feedback::new(Some(Arc::clone(&notifier) as Arc<dyn Notifier>), None);
        let policy = FeedbackPolicy {
            update_global_error: true,
            ..FeedbackPolicy::default()
        };

        feedback.handle(&record_for(503), &policy);
        assert_eq!(notifier.0.lock().unwrap().len(), 1);
        assert!(feedback.global_error().is_some());
        assert_eq!(feedback.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn global_error_auto_clears_after_the_window() {
        let state = GlobalErrorState::default();
        state.set("boom".into());
        assert_eq!(state.current().as_deref(), Some("boom"));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(state.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_global_error_survives_older_clear_timer() {
        let state = GlobalErrorState::default();
        state.set("first".into());
        tokio::time::sleep(Duration::from_secs(3)).await;
        state.set("second".into());
        // First timer fires at t=5s; the newer message must survive it.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(state.current().as_deref(), Some("second"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(state.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn muted_policy_produces_no_notifications() {
        let notifier = Arc::new(RecordingNotifier(Mutex::new(Vec::new())));
        let feedback = Feedback::new(Some(Arc::clone(&notifier) as Arc<dyn Notifier>), None);
        let policy = FeedbackPolicy {
            notify_user: false,
            update_global_error: false,
            report_errors: false,
            log_details: false,
        };
        feedback.handle(&record_for(500), &policy);
        assert!(notifier.0.lock().unwrap().is_empty());
        assert!(feedback.global_error().is_none());
        // The record is still remembered for diagnostics.
        assert_eq!(feedback.history().len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let feedback = Feedback::new(None, None);
        let policy = FeedbackPolicy {
            notify_user: false,
            update_global_error: false,
            report_errors: false,
            log_details: false,
        };
        for _ in 0..60 {
            feedback.handle(&record_for(500), &policy);
        }
        assert_eq!(feedback.history().len(), MAX_HISTORY);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_notifications_are_sticky() {
        let notifier = Arc::new(RecordingNotifier(Mutex::new(Vec::new())));
        let feedback = Feedback::new(Some(Arc::clone(&notifier) as Arc<dyn Notifier>), None);
        let mut record = record_for(500);
        record.severity = Severity::Fatal;
        feedback.handle(&record, &FeedbackPolicy::default());
        let seen = notifier.0.lock().unwrap();
        assert_eq!(seen[0].duration, Duration::ZERO);
    }
}
