//! Bounded-concurrency priority scheduler with request merging.
//!
//! Requests wait in a single queue ordered by priority then arrival.
//! Identical requests (same merge key) arriving within a short window are
//! collapsed onto one execution: every caller is attached as a waiter and
//! all of them settle together. At most `max_concurrent` items execute at
//! once; a started item is never aborted here (aborting, if wanted, is the
//! transport's business).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::ApiError;
use crate::transport::Response;

/// Dispatch priority; declared best-first so the derived order sorts
/// high-priority items to the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum simultaneously-executing items.
    pub max_concurrent: usize,
    /// Queue-wait timeout applied when the caller does not pass one.
    pub default_timeout: Duration,
    /// How long an item accumulates merge partners before queueing.
    pub merge_window: Duration,
    pub enable_merging: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 6,
            default_timeout: Duration::from_secs(30),
            merge_window: Duration::from_millis(50),
            enable_merging: true,
        }
    }
}

/// Observability snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub active_count: usize,
    pub merge_count: usize,
}

type ExecFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<Response, ApiError>> + Send>;
type Waiter = oneshot::Sender<Result<Response, ApiError>>;

struct QueueItem {
    id: u64,
    priority: Priority,
    enqueued_at: Instant,
    execute: ExecFn,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct SchedulerInner {
    queue: Vec<QueueItem>,
    merging: HashMap<String, QueueItem>,
    active: usize,
    next_id: u64,
}

impl SchedulerInner {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// The scheduler. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    config: Arc<SchedulerConfig>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner::default())),
            config: Arc::new(config),
        }
    }

    /// Submits `execute` under `merge_key` and waits for the outcome.
    ///
    /// If an item with the same key is still accumulating in its merge
    /// window, this caller is attached to it and no second execution
    /// happens. The timeout covers the whole queued phase (merge window
    /// included); it does not cut short an execution that already started.
    pub async fn enqueue<F, Fut>(
        &self,
        merge_key: impl Into<String>,
        priority: Priority,
        timeout: Option<Duration>,
        execute: F,
    ) -> Result<Response, ApiError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        let merge_key = merge_key.into();
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let (tx, rx) = oneshot::channel();
        let execute: ExecFn = Box::new(move || execute().boxed());
        self.submit(merge_key, priority, timeout, execute, tx);
        match rx.await {
            Ok(result) => result,
            // The sender side only disappears wholesale (scheduler dropped),
            // which callers observe as cancellation.
            Err(_) => Err(ApiError::Cancelled),
        }
    }

    fn submit(
        &self,
        merge_key: String,
        priority: Priority,
        timeout: Duration,
        execute: ExecFn,
        tx: Waiter,
    ) {
        let placed = {
            let mut inner = self.inner.lock().unwrap();
            if self.config.enable_merging {
                if let Some(item) = inner.merging.get_mut(&merge_key) {
                    item.waiters.push(tx);
                    None
                } else {
                    let id = inner.alloc_id();
                    let item = QueueItem {
                        id,
                        priority,
                        enqueued_at: Instant::now(),
                        execute,
                        waiters: vec![tx],
                    };
                    inner.merging.insert(merge_key.clone(), item);
                    Some((id, true))
                }
            } else {
                let id = inner.alloc_id();
                push_sorted(
                    &mut inner.queue,
                    QueueItem {
                        id,
                        priority,
                        enqueued_at: Instant::now(),
                        execute,
                        waiters: vec![tx],
                    },
                );
                Some((id, false))
            }
        };

        let Some((id, accumulating)) = placed else {
            return;
        };

        if accumulating {
            let sched = self.clone();
            let window = self.config.merge_window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                sched.promote(&merge_key);
            });
        } else {
            self.dispatch();
        }

        // Independent timeout: rejects the item only while it is still
        // waiting (merging or queued), never once started.
        let sched = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            sched.expire(id);
        });
    }

    /// Moves an accumulated item into the dispatch queue once its merge
    /// window closes. A no-op if the item timed out or was cancelled.
    fn promote(&self, merge_key: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            let Some(item) = inner.merging.remove(merge_key) else {
                return;
            };
            push_sorted(&mut inner.queue, item);
        }
        self.dispatch();
    }

    fn dispatch(&self) {
        loop {
            let item = {
                let mut inner = self.inner.lock().unwrap();
                if inner.active >= self.config.max_concurrent || inner.queue.is_empty() {
                    return;
                }
                inner.active += 1;
                inner.queue.remove(0)
            };
            let sched = self.clone();
            tokio::spawn(async move {
                let result = (item.execute)().await;
                for tx in item.waiters {
                    let _ = tx.send(result.clone());
                }
                sched.inner.lock().unwrap().active -= 1;
                sched.dispatch();
            });
        }
    }

    fn expire(&self, id: u64) {
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(pos) = inner.queue.iter().position(|i| i.id == id) {
                Some(inner.queue.remove(pos).waiters)
            } else if let Some(key) = inner
                .merging
                .iter()
                .find(|(_, item)| item.id == id)
                .map(|(key, _)| key.clone())
            {
                inner.merging.remove(&key).map(|item| item.waiters)
            } else {
                None
            }
        };
        if let Some(waiters) = waiters {
            tracing::debug!(item = id, "queued request timed out before dispatch");
            for tx in waiters {
                let _ = tx.send(Err(ApiError::QueueTimeout));
            }
        }
    }

    /// Rejects every queued and merging item with a cancellation error.
    /// Items already executing run to completion.
    pub fn cancel_all(&self) {
        let items: Vec<QueueItem> = {
            let mut inner = self.inner.lock().unwrap();
            let merging: Vec<QueueItem> = inner.merging.drain().map(|(_, item)| item).collect();
            merging.into_iter().chain(inner.queue.drain(..)).collect()
        };
        for item in items {
            for tx in item.waiters {
                let _ = tx.send(Err(ApiError::Cancelled));
            }
        }
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.inner.lock().unwrap();
        QueueStatus {
            queue_length: inner.queue.len(),
            active_count: inner.active,
            merge_count: inner.merging.len(),
        }
    }
}

fn push_sorted(queue: &mut Vec<QueueItem>, item: QueueItem) {
    queue.push(item);
    queue.sort_by_key(|i| (i.priority, i.enqueued_at, i.id));
}
