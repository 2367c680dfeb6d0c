//! Admission control and deduplication for outbound calls.
//!
//! A [`RequestManager`] is a cheap, cloneable handle onto a single scheduling
//! worker task that owns every piece of mutable state (pending map, priority
//! queue, running count). Callers never touch that state directly: they send
//! commands over an unbounded channel and wait on a oneshot for the outcome.
//!
//! Commands are handled in the order they were sent. The worker drains its
//! whole inbox before admitting anything, so requests submitted back to back
//! compete on priority rather than on who called first.

use futures::FutureExt;
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};

use crate::error::RequestError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::{Command, Outcome, QueueStatus, QueuedRequest, StatusCounters, Thunk};
use crate::throttle::RefreshThrottle;
use crate::worker::{Scheduler, scheduler_worker};

/// One entry of [`RequestManager::batch_requests`].
pub struct BatchItem<T> {
    pub key: String,
    pub priority: i32,
    thunk: Thunk<T>,
}

impl<T: Send + 'static> BatchItem<T> {
    pub fn new<F, Fut>(key: impl Into<String>, thunk: F, priority: i32) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            priority,
            thunk: Box::new(move || thunk().boxed()),
        }
    }
}

struct Inner<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    status: Arc<StatusCounters>,
    max_concurrent: usize,
    refresh: RefreshThrottle,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // lets the worker exit once in-flight work has settled
        let _ = self.tx.send(Command::Shutdown);
    }
}

pub struct RequestManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RequestManager<T>
where
    T: Clone + Send + 'static,
{
    /// Spawns the scheduling worker; must be called inside a tokio runtime.
    ///
    /// Requests submitted back to back from one task are ranked by priority
    /// only on a `current_thread` runtime. On a multi-thread runtime the
    /// worker may wake between two submissions and admit the first one
    /// before the second arrives.
    pub fn new(max_concurrent: usize, refresh_window: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(StatusCounters::default());
        let scheduler = Scheduler::new(max_concurrent, Arc::clone(&status), tx.clone());

        tokio::spawn(scheduler_worker(rx, scheduler));

        Self {
            inner: Arc::new(Inner {
                tx,
                status,
                max_concurrent,
                refresh: RefreshThrottle::new(refresh_window),
            }),
        }
    }

    /// Queues `thunk` under `key`.
    ///
    /// The request is registered before this returns. If an unsettled request
    /// with the same key exists, the returned future resolves with that
    /// request's outcome and `thunk` is never invoked.
    pub fn queue_request<F, Fut>(
        &self,
        key: impl Into<String>,
        thunk: F,
        priority: i32,
    ) -> impl Future<Output = Outcome<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.submit(key.into(), Box::new(move || thunk().boxed()), priority)
    }

    fn submit(
        &self,
        key: String,
        thunk: Thunk<T>,
        priority: i32,
    ) -> impl Future<Output = Outcome<T>> + Send + 'static {
        REQUEST_TOTAL.inc();
        let (response_tx, response_rx) = oneshot::channel();
        let sent = self
            .inner
            .tx
            .send(Command::Enqueue(QueuedRequest {
                key,
                priority,
                thunk,
                response_tx,
            }))
            .is_ok();

        async move {
            if !sent {
                return Err(RequestError::ManagerClosed);
            }
            response_rx
                .await
                .unwrap_or(Err(RequestError::ManagerClosed))
        }
    }

    /// Runs every item through the queue and returns outcomes in input order.
    ///
    /// `concurrency` caps how many of this batch may be queued at once, on top
    /// of the global bound. The first failure fails the whole batch.
    pub async fn batch_requests(
        &self,
        items: Vec<BatchItem<T>>,
        concurrency: Option<usize>,
    ) -> Result<Vec<T>, RequestError> {
        match concurrency {
            None => {
                let pending: Vec<_> = items
                    .into_iter()
                    .map(|item| self.submit(item.key, item.thunk, item.priority))
                    .collect();
                try_join_all(pending).await
            }
            Some(limit) => {
                let permits = Arc::new(Semaphore::new(limit.max(1)));
                let pending = items.into_iter().map(|item| {
                    let permits = Arc::clone(&permits);
                    let manager = self.clone();
                    async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|_| RequestError::ManagerClosed)?;
                        manager.submit(item.key, item.thunk, item.priority).await
                    }
                });
                try_join_all(pending).await
            }
        }
    }

    /// Coalesces refreshes requested within one trailing window into a single run.
    pub fn throttled_global_refresh<F, Fut>(&self, refresh: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.refresh.call(Box::new(move || refresh().boxed()));
    }

    /// Stops deduplicating against entries whose key starts with `prefix`
    /// (all entries when `None`). In-flight work still completes and still
    /// resolves its existing callers.
    pub fn clear_cache(&self, prefix: Option<&str>) {
        let _ = self.inner.tx.send(Command::ClearCache {
            prefix: prefix.map(str::to_string),
        });
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.inner.status.snapshot(self.inner.max_concurrent)
    }
}
