//! The unified client: one `request` entry point composing scheduler,
//! cache, offline capture, retry, transport, and error feedback.
//!
//! Control flow per request: scheduler (priority + merge) → cache (serve
//! if fresh) → retry loop → transport, with the offline gate checked up
//! front so a request issued while disconnected parks in the offline
//! queue instead of burning a scheduler slot. Terminal failures pass
//! through the classifier and feedback exactly once per execution.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::cache::{CacheStats, RequestCache};
use crate::config::ArqConfig;
use crate::error::ApiError;
use crate::feedback::{
    classify, ErrorRecord, ErrorReporter, Feedback, FeedbackPolicy, Notifier, TokenStore,
};
use crate::monitor::{ConnectionType, NetworkMonitor, NetworkState, NetworkStatus, Subscription};
use crate::offline::OfflineQueue;
use crate::queue::{Priority, QueueStatus, Scheduler};
use crate::retry::{self, RetryOptions};
use crate::transport::{Method, RequestDescriptor, Response, Transport};

/// Host hook for refreshing expired credentials. Invoked at most once per
/// failing request; a refresh failure forces re-authentication instead of
/// looping.
pub trait AuthProvider: Send + Sync {
    fn refresh<'a>(&'a self) -> BoxFuture<'a, Result<String, ApiError>>;
}

/// Per-request knobs layered over the client configuration.
#[derive(Clone)]
pub struct RequestOptions {
    pub use_cache: bool,
    /// Cache TTL override; the configured default applies when absent.
    pub cache_ttl: Option<Duration>,
    /// Allow a non-blocking refresh when a cached value is past half its
    /// TTL. Only meaningful together with `use_cache`.
    pub background_refresh: bool,
    pub use_retry: bool,
    pub max_retries: Option<u32>,
    /// Priority override; the descriptor's own priority applies when absent.
    pub priority: Option<Priority>,
    /// Merge/cache key override; derived from the request when absent.
    pub merge_key: Option<String>,
    pub timeout: Option<Duration>,
    /// Feedback override; the configured policy applies when absent.
    pub feedback: Option<FeedbackPolicy>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self {
            use_cache: false,
            cache_ttl: None,
            background_refresh: true,
            use_retry: true,
            max_retries: None,
            priority: None,
            merge_key: None,
            timeout: None,
            feedback: None,
        }
    }

    pub fn cached(mut self) -> Self {
        self.use_cache = true;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.use_cache = true;
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.use_retry = false;
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn merge_key(mut self, key: impl Into<String>) -> Self {
        self.merge_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Suppress every feedback side effect for this request.
    pub fn quiet(mut self) -> Self {
        self.feedback = Some(FeedbackPolicy {
            notify_user: false,
            update_global_error: false,
            report_errors: false,
            log_details: true,
        });
        self
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    monitor: NetworkMonitor,
    cache: RequestCache,
    scheduler: Scheduler,
    offline: OfflineQueue,
    feedback: Feedback,
    auth: Option<Arc<dyn AuthProvider>>,
    tokens: Option<Arc<dyn TokenStore>>,
    on_auth_failure: Option<Arc<dyn Fn() + Send + Sync>>,
    config: ArqConfig,
    // Keeps the reconnect listener alive for the client's lifetime.
    _reconnect: Subscription,
}

/// The resilient request client. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ArqClient {
    inner: Arc<ClientInner>,
}

/// Builder for [`ArqClient`]. `build` wires the background tasks (cache
/// sweeper, offline drain), so call it from within a tokio runtime.
pub struct ArqClientBuilder {
    transport: Arc<dyn Transport>,
    config: ArqConfig,
    notifier: Option<Arc<dyn Notifier>>,
    auth: Option<Arc<dyn AuthProvider>>,
    tokens: Option<Arc<dyn TokenStore>>,
    on_auth_failure: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ArqClientBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: ArqConfig::default(),
            notifier: None,
            auth: None,
            tokens: None,
            on_auth_failure: None,
        }
    }

    pub fn config(mut self, config: ArqConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn auth_provider(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Called when a token refresh fails; the host navigates to its
    /// re-authentication flow here.
    pub fn on_auth_failure(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_auth_failure = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> ArqClient {
        let monitor = NetworkMonitor::new();
        let cache = RequestCache::new();
        let scheduler = Scheduler::new(self.config.queue.scheduler());
        let offline = OfflineQueue::new(self.config.offline.pacing());

        let reporter = self
            .config
            .feedback
            .report_endpoint
            .as_deref()
            .map(|endpoint| ErrorReporter::new(Arc::clone(&self.transport), endpoint));
        let feedback = Feedback::new(self.notifier, reporter);

        cache.start_sweeper(self.config.cache.sweep_interval());
        offline.start_drain();
        let reconnect = {
            let offline = offline.clone();
            monitor.add_listener(move |state| {
                if state.status.is_online() {
                    offline.trigger();
                }
            })
        };

        ArqClient {
            inner: Arc::new(ClientInner {
                transport: self.transport,
                monitor,
                cache,
                scheduler,
                offline,
                feedback,
                auth: self.auth,
                tokens: self.tokens,
                on_auth_failure: self.on_auth_failure,
                config: self.config,
                _reconnect: reconnect,
            }),
        }
    }
}

impl ArqClient {
    pub fn builder<T: Transport + 'static>(transport: T) -> ArqClientBuilder {
        ArqClientBuilder::new(Arc::new(transport))
    }

    /// Issues a request through the full pipeline and resolves with the
    /// response or a classified error.
    ///
    /// Returns a boxed future with a concrete `Send` type. This is what the
    /// offline replay path (`capture_offline`) re-enters recursively;
    /// declaring the future concretely here breaks the otherwise
    /// self-referential `Send` inference cycle between the two.
    pub fn request(
        &self,
        request: RequestDescriptor,
        options: RequestOptions,
    ) -> BoxFuture<'_, Result<Response, ApiError>> {
        self.request_inner(request, options).boxed()
    }

    async fn request_inner(
        &self,
        request: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<Response, ApiError> {
        let key = options
            .merge_key
            .clone()
            .unwrap_or_else(|| request.request_id());

        if !self.is_online() {
            return self.capture_offline(request, options, key).await;
        }

        let mut request = request;
        if let Some(timeout) = options.timeout {
            request.timeout = timeout;
        }
        self.adapt_request(&mut request);

        let priority = options.priority.unwrap_or(request.priority);
        let this = self.clone();
        let exec_request = request.clone();
        let exec_options = options.clone();
        let exec_key = key.clone();
        let result = self
            .inner
            .scheduler
            .enqueue(key, priority, None, move || async move {
                this.fetch_cached(exec_request, exec_options, exec_key).await
            })
            .await;

        // Transport-level failures were already fed back inside the
        // execution (once, however many callers merged onto it). Scheduler
        // rejections never executed, so they are handled here; cancellation
        // is caller-initiated and stays silent.
        if let Err(err @ ApiError::QueueTimeout) = &result {
            let record = classify(err, &self.state(), Some(&request));
            self.inner.feedback.handle(&record, &self.effective_policy(&options));
        }
        result
    }

    /// Offline gate: serve a fresh cached value if one exists, otherwise
    /// park the request for replay after reconnect.
    async fn capture_offline(
        &self,
        request: RequestDescriptor,
        options: RequestOptions,
        key: String,
    ) -> Result<Response, ApiError> {
        if options.use_cache && matches!(request.method, Method::Get | Method::Head) {
            if let Some(hit) = self.inner.cache.peek(&key) {
                return Ok(hit);
            }
        }
        if self.effective_policy(&options).notify_user {
            self.inner.feedback.notify_offline_capture();
        }
        let this = self.clone();
        let label = request.label();
        self.inner
            .offline
            .capture(
                label,
                Box::new(move || {
                    // Replay goes back through the normal pipeline, so it
                    // can merge, cache, retry, or re-park if still offline.
                    async move { this.request(request, options).await }.boxed()
                }),
            )
            .await
    }

    async fn fetch_cached(
        &self,
        request: RequestDescriptor,
        options: RequestOptions,
        key: String,
    ) -> Result<Response, ApiError> {
        let cacheable = options.use_cache && matches!(request.method, Method::Get | Method::Head);
        if !cacheable {
            return self.fetch_resilient(request, options).await;
        }

        let ttl = self.effective_ttl(&options);
        let this = self.clone();
        let background_refresh = options.background_refresh;
        self.inner
            .cache
            .with_cache(&key, ttl, background_refresh, move |background| {
                let this = this.clone();
                let request = request.clone();
                let mut options = options.clone();
                if background {
                    // No caller is waiting on a background refresh; its
                    // failures must not surface anywhere.
                    options.feedback = Some(FeedbackPolicy {
                        notify_user: false,
                        update_global_error: false,
                        report_errors: false,
                        log_details: false,
                    });
                }
                async move { this.fetch_resilient(request, options).await }
            })
            .await
    }

    /// Retry loop around the transport, with the 401 refresh-once flow and
    /// per-execution feedback on terminal failure.
    async fn fetch_resilient(
        &self,
        request: RequestDescriptor,
        options: RequestOptions,
    ) -> Result<Response, ApiError> {
        let mut policy = self.inner.config.retry.policy();
        if let Some(max) = options.max_retries {
            policy.max_retries = max;
        }
        if !options.use_retry {
            policy.max_retries = 0;
        }

        let effective = self.effective_policy(&options);
        let retry_options = RetryOptions {
            policy,
            on_retry: {
                let this = self.clone();
                let notify = effective.notify_user;
                let max_retries = policy.max_retries;
                Some(Box::new(move |attempt, _err, _delay| {
                    if notify && attempt == 1 {
                        this.inner.feedback.notify_retrying(attempt, max_retries);
                    }
                }))
            },
        };

        let method = request.method;
        let auth_configured = self.inner.auth.is_some();
        let condition = move |err: &ApiError| {
            // With an auth provider wired in, 401 goes through the
            // refresh-once flow below instead of blind retries.
            if auth_configured && err.status() == Some(401) {
                return false;
            }
            retry::is_retryable(err, method, false)
        };

        let this = self.clone();
        let attempt_request = request.clone();
        let mut result = retry::with_retry(&retry_options, condition, move || {
            let this = this.clone();
            let request = attempt_request.clone();
            async move { this.dispatch(request).await }
        })
        .await;

        if let Err(err) = &result {
            if err.status() == Some(401) && auth_configured {
                result = self.recover_auth(&request, err.clone()).await;
            }
        }

        if let Err(err) = &result {
            let record = classify(err, &self.state(), Some(&request));
            self.inner.feedback.handle(&record, &effective);
        }
        result
    }

    /// 401 recovery: one token refresh, one replay. A refresh failure
    /// clears stored credentials and hands control to the host's
    /// re-authentication hook; the original error is surfaced.
    async fn recover_auth(
        &self,
        request: &RequestDescriptor,
        original: ApiError,
    ) -> Result<Response, ApiError> {
        let Some(auth) = &self.inner.auth else {
            return Err(original);
        };
        tracing::debug!(request = %request.label(), "unauthorized, attempting token refresh");
        match auth.refresh().await {
            Ok(token) => {
                if let Some(tokens) = &self.inner.tokens {
                    tokens.set_token(&token);
                }
                self.dispatch(request.clone()).await
            }
            Err(refresh_err) => {
                tracing::warn!(error = %refresh_err, "token refresh failed, forcing re-authentication");
                if let Some(tokens) = &self.inner.tokens {
                    tokens.clear();
                }
                if let Some(hook) = &self.inner.on_auth_failure {
                    hook();
                }
                Err(original)
            }
        }
    }

    /// One transport round trip: credentials and correlation id attached,
    /// payload-level failure codes surfaced as business errors.
    async fn dispatch(&self, mut request: RequestDescriptor) -> Result<Response, ApiError> {
        let request_id = request.request_id();
        if let Some(tokens) = &self.inner.tokens {
            if let Some(token) = tokens.token() {
                request
                    .headers
                    .entry("authorization".into())
                    .or_insert_with(|| format!("Bearer {token}"));
            }
        }
        request.headers.insert("x-request-id".into(), request_id);

        let response = self.inner.transport.execute(&request).await?;
        self.check_business(&response)?;
        Ok(response)
    }

    /// Payload-level failure detection per the configured convention:
    /// a JSON object with a numeric `code` outside the success set is a
    /// business error, regardless of the 2xx transport status.
    fn check_business(&self, response: &Response) -> Result<(), ApiError> {
        let policy = &self.inner.config.business;
        if !policy.enabled {
            return Ok(());
        }
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) else {
            return Ok(());
        };
        let Some(code) = value.get("code").and_then(|c| c.as_i64()) else {
            return Ok(());
        };
        if policy.success_codes.contains(&code) {
            return Ok(());
        }
        let message = value
            .get("message")
            .or_else(|| value.get("msg"))
            .and_then(|m| m.as_str())
            .unwrap_or("request rejected by the server")
            .to_string();
        Err(ApiError::Business { code, message })
    }

    /// Stretch or tighten the request for current network conditions:
    /// slow connections double the timeout, constrained cellular types
    /// stretch it further, fast local networks keep a sane floor.
    fn adapt_request(&self, request: &mut RequestDescriptor) {
        let state = self.state();
        if state.status == NetworkStatus::Slow {
            request.timeout *= 2;
        }
        if state.conn_type.is_constrained() {
            request.timeout = request.timeout * 3 / 2;
        } else if matches!(
            state.conn_type,
            ConnectionType::Wifi | ConnectionType::Ethernet
        ) {
            request.timeout = request.timeout.max(Duration::from_secs(5));
        }
    }

    /// Cache lifetime for this request; constrained connections cache
    /// twice as long to spare the link.
    fn effective_ttl(&self, options: &RequestOptions) -> Duration {
        let base = options
            .cache_ttl
            .unwrap_or_else(|| self.inner.config.cache.default_ttl());
        if self.state().conn_type.is_constrained() {
            base * 2
        } else {
            base
        }
    }

    fn effective_policy(&self, options: &RequestOptions) -> FeedbackPolicy {
        options
            .feedback
            .clone()
            .unwrap_or_else(|| self.inner.config.feedback.policy())
    }

    // Cache surface.

    pub fn invalidate_cache(&self, key: &str) {
        self.inner.cache.invalidate(key);
    }

    pub fn invalidate_cache_prefix(&self, prefix: &str) {
        self.inner.cache.invalidate_prefix(prefix);
    }

    pub fn clear_all_caches(&self) {
        self.inner.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // Network surface.

    /// The monitor, for wiring host connectivity events
    /// (`set_online`/`set_offline`/`set_connection_type`).
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.inner.monitor
    }

    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    pub fn state(&self) -> NetworkState {
        self.inner.monitor.state()
    }

    pub fn on_network_change(
        &self,
        listener: impl Fn(&NetworkState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.monitor.add_listener(listener)
    }

    /// Starts periodic quality probes using this client's transport and
    /// the configured ping URL.
    pub fn start_monitoring(&self) {
        let cfg = &self.inner.config.monitor;
        self.inner.monitor.start_monitoring(
            Arc::clone(&self.inner.transport),
            &cfg.ping_url,
            cfg.ping_frequency(),
            cfg.ping_timeout(),
        );
    }

    pub fn stop_monitoring(&self) {
        self.inner.monitor.stop_monitoring();
    }

    // Queue surface.

    pub fn queue_status(&self) -> QueueStatus {
        self.inner.scheduler.status()
    }

    /// Rejects every queued and merging request (e.g. on navigation away).
    pub fn cancel_all(&self) {
        self.inner.scheduler.cancel_all();
    }

    pub fn offline_queue_len(&self) -> usize {
        self.inner.offline.len()
    }

    // Diagnostics surface.

    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.inner.feedback.history()
    }

    pub fn global_error(&self) -> Option<String> {
        self.inner.feedback.global_error()
    }

    /// Fire-and-forget HEAD warm-ups, e.g. for resources a view is about
    /// to need. Failures are ignored.
    pub fn preload<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            let transport = Arc::clone(&self.inner.transport);
            let request = RequestDescriptor::head(url.into());
            tokio::spawn(async move {
                let _ = transport.execute(&request).await;
            });
        }
    }
}
