//! Retry loop: run an async operation until success or the policy says stop.

use std::future::Future;

use crate::error::ApiError;

use super::policy::RetryPolicy;

/// Callback fired before each backoff wait: `(attempt, error, delay)`.
/// `attempt` is the 1-based retry about to be made.
pub type OnRetry = Box<dyn Fn(u32, &ApiError, std::time::Duration) + Send + Sync>;

/// Policy plus hooks for one retry sequence.
pub struct RetryOptions {
    pub policy: RetryPolicy,
    pub on_retry: Option<OnRetry>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            on_retry: None,
        }
    }
}

impl From<RetryPolicy> for RetryOptions {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }
}

/// Runs `execute` until it succeeds, the error is not retryable per
/// `condition`, or `max_retries` is exhausted. Attempt 0 runs immediately;
/// each retry waits out the computed backoff (server `Retry-After` taking
/// precedence). The final error propagates unchanged.
pub async fn with_retry<T, F, Fut, C>(
    options: &RetryOptions,
    condition: C,
    mut execute: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    C: Fn(&ApiError) -> bool,
{
    let policy = &options.policy;
    let mut attempt: u32 = 0;
    loop {
        match execute().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !condition(&err) {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_with_hint(attempt, err.retry_after());
                tracing::debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after backoff"
                );
                if let Some(on_retry) = &options.on_retry {
                    on_retry(attempt, &err, delay);
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn options(max_retries: u32) -> RetryOptions {
        RetryOptions::from(RetryPolicy {
            max_retries,
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        })
    }

    fn network_error() -> ApiError {
        ApiError::Network {
            message: "connection refused".into(),
            connect: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_attempts_exactly_n_plus_one_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&options(3), |_| true, move || {
            counted.fetch_add(1, Ordering::SeqCst);
            async { Err(network_error()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let result = with_retry(&options(3), |_| true, move || {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(network_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let result: Result<(), _> = with_retry(&options(5), |_| false, move || {
            counted.fetch_add(1, Ordering::SeqCst);
            async { Err(network_error()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn on_retry_observes_attempts_and_backoff_delays() {
        let seen: Arc<Mutex<Vec<(u32, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut opts = options(3);
        opts.on_retry = Some(Box::new(move |attempt, _err, delay| {
            sink.lock().unwrap().push((attempt, delay.as_millis() as u64));
        }));

        let result: Result<(), _> =
            with_retry(&opts, |_| true, || async { Err(network_error()) }).await;
        assert!(result.is_err());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(1, 1000), (2, 2000), (3, 4000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn server_retry_after_overrides_backoff() {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut opts = options(1);
        opts.on_retry = Some(Box::new(move |_attempt, _err, delay| {
            sink.lock().unwrap().push(delay.as_millis() as u64);
        }));

        let throttled = ApiError::Http {
            status: 429,
            message: "Too Many Requests".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        let result: Result<(), _> = with_retry(&opts, |_| true, move || {
            let err = throttled.clone();
            async move { Err(err) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(seen.lock().unwrap().as_slice(), &[5000]);
    }
}
