//! Offline request capture and batched replay.
//!
//! Requests issued while the network is down are parked here with their
//! caller still awaiting. When connectivity returns (signalled via
//! [`OfflineQueue::trigger`], typically from a monitor listener), entries
//! are replayed in FIFO order in small batches, with a short pause between
//! batches so a freshly recovered connection is not flooded. Replay goes
//! back through the normal pipeline, so a replayed request can still retry
//! or fail; either way the original caller settles exactly once.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ApiError;
use crate::transport::Response;

type FetchResult = Result<Response, ApiError>;
type ReplayFn = Box<dyn FnOnce() -> BoxFuture<'static, FetchResult> + Send>;

/// Replay pacing.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Entries replayed concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_pause: Duration,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause: Duration::from_millis(300),
        }
    }
}

struct OfflineEntry {
    label: String,
    replay: ReplayFn,
    tx: oneshot::Sender<FetchResult>,
    #[allow(dead_code)]
    enqueued_at: Instant,
}

/// The queue. Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct OfflineQueue {
    entries: Arc<Mutex<VecDeque<OfflineEntry>>>,
    notify: Arc<Notify>,
    drain_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    config: Arc<OfflineConfig>,
}

impl OfflineQueue {
    pub fn new(config: OfflineConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            drain_task: Arc::new(Mutex::new(None)),
            config: Arc::new(config),
        }
    }

    /// Parks the caller until its request is replayed after reconnect.
    /// `replay` re-submits the request through the normal pipeline.
    pub async fn capture(&self, label: impl Into<String>, replay: ReplayFn) -> FetchResult {
        let label = label.into();
        let (tx, rx) = oneshot::channel();
        {
            let mut entries = self.entries.lock().unwrap();
            entries.push_back(OfflineEntry {
                label: label.clone(),
                replay,
                tx,
                enqueued_at: Instant::now(),
            });
            tracing::debug!(request = %label, queued = entries.len(), "captured offline request");
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Cancelled),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Signals that connectivity is back and queued requests may drain.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Starts the background drain loop. Restarting replaces the old task.
    pub fn start_drain(&self) {
        let queue = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                queue.notify.notified().await;
                queue.drain_once().await;
            }
        });
        if let Some(old) = self.drain_task.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    pub fn stop_drain(&self) {
        if let Some(handle) = self.drain_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Replays everything currently queued, batch by batch. Batches run
    /// sequentially; entries within one batch run concurrently.
    async fn drain_once(&self) {
        let total = self.len();
        if total == 0 {
            return;
        }
        tracing::info!(queued = total, "connection restored, replaying offline requests");
        loop {
            let batch: Vec<OfflineEntry> = {
                let mut entries = self.entries.lock().unwrap();
                let take = self.config.batch_size.min(entries.len());
                entries.drain(..take).collect()
            };
            if batch.is_empty() {
                return;
            }
            join_all(batch.into_iter().map(|entry| async move {
                let result = (entry.replay)().await;
                if let Err(err) = &result {
                    tracing::debug!(request = %entry.label, error = %err, "offline replay failed");
                }
                let _ = entry.tx.send(result);
            }))
            .await;

            if self.is_empty() {
                return;
            }
            tokio::time::sleep(self.config.batch_pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_response() -> Response {
        Response {
            status: 200,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    fn replay_ok(calls: Arc<AtomicU32>) -> ReplayFn {
        Box::new(move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ok_response())
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn captured_request_waits_for_trigger() {
        let queue = OfflineQueue::new(OfflineConfig::default());
        queue.start_drain();
        let calls = Arc::new(AtomicU32::new(0));

        let caller = {
            let queue = queue.clone();
            let replay = replay_ok(Arc::clone(&calls));
            tokio::spawn(async move { queue.capture("GET /items", replay).await })
        };
        while queue.is_empty() {
            tokio::task::yield_now().await;
        }

        // Still offline: nothing replayed.
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        queue.trigger();
        let result = caller.await.unwrap();
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_failure_rejects_the_original_caller() {
        let queue = OfflineQueue::new(OfflineConfig::default());
        queue.start_drain();

        let caller = {
            let queue = queue.clone();
            let replay: ReplayFn = Box::new(|| {
                async {
                    Err(ApiError::Http {
                        status: 500,
                        message: "Internal Server Error".into(),
                        retry_after: None,
                    })
                }
                .boxed()
            });
            tokio::spawn(async move { queue.capture("POST /items", replay).await })
        };
        while queue.is_empty() {
            tokio::task::yield_now().await;
        }

        queue.trigger();
        let result = caller.await.unwrap();
        assert!(matches!(result, Err(ApiError::Http { status: 500, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn drains_in_fifo_batches() {
        let config = OfflineConfig {
            batch_size: 2,
            batch_pause: Duration::from_millis(300),
        };
        let queue = OfflineQueue::new(config);
        queue.start_drain();

        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let mut callers = Vec::new();
        for n in 0..5u32 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            let replay: ReplayFn = Box::new(move || {
                async move {
                    order.lock().unwrap().push(n);
                    Ok(ok_response())
                }
                .boxed()
            });
            let spawn_queue = queue.clone();
            callers.push(tokio::spawn(async move {
                spawn_queue.capture(format!("req {n}"), replay).await
            }));
            while queue.len() < (n + 1) as usize {
                tokio::task::yield_now().await;
            }
        }

        queue.trigger();
        for caller in callers {
            caller.await.unwrap().unwrap();
        }
        // Batch boundaries at 2: [0,1] [2,3] [4]; order preserved.
        assert_eq!(order.lock().unwrap().as_slice(), &[0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }
}
