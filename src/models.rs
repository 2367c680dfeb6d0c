use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

use crate::error::RequestError;

pub type Outcome<T> = Result<T, RequestError>;

// Deferred unit of work, invoked at most once when admitted
pub type Thunk<T> = Box<dyn FnOnce() -> BoxFuture<'static, Outcome<T>> + Send>;

// Queued request - holds the work + channel back to the caller
pub struct QueuedRequest<T> {
    pub key: String,
    pub priority: i32,
    pub thunk: Thunk<T>,
    pub response_tx: oneshot::Sender<Outcome<T>>,
}

// Messages understood by the scheduling worker
pub enum Command<T> {
    Enqueue(QueuedRequest<T>),
    Completed { id: u64, outcome: Outcome<T> },
    ClearCache { prefix: Option<String> },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub pending_keys: usize,
}

// Counters published by the worker after each scheduling round
#[derive(Debug, Default)]
pub struct StatusCounters {
    pub queued: AtomicUsize,
    pub running: AtomicUsize,
    pub pending_keys: AtomicUsize,
}

impl StatusCounters {
    pub fn snapshot(&self, max_concurrent: usize) -> QueueStatus {
        QueueStatus {
            queued: self.queued.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            max_concurrent,
            pending_keys: self.pending_keys.load(Ordering::Relaxed),
        }
    }
}
