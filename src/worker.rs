use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::RequestError;
use crate::metrics::{DEDUP_HITS, QUEUE_DEPTH, RUNNING_REQUESTS};
use crate::models::{Command, Outcome, QueuedRequest, StatusCounters, Thunk};

// Unsettled request and everyone waiting on it
struct Entry<T> {
    key: String,
    waiters: Vec<oneshot::Sender<Outcome<T>>>,
}

// Admission candidate. Higher priority first, then lower sequence number.
struct Ready<T> {
    priority: i32,
    seq: u64,
    id: u64,
    thunk: Thunk<T>,
}

impl<T> PartialEq for Ready<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Ready<T> {}

impl<T> PartialOrd for Ready<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ready<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// Sole owner of the pending map, the priority queue and the running count.
pub struct Scheduler<T> {
    max_concurrent: usize,
    running: usize,
    next_id: u64,
    entries: HashMap<u64, Entry<T>>,
    by_key: HashMap<String, u64>,
    queue: BinaryHeap<Ready<T>>,
    status: Arc<StatusCounters>,
    completions: mpsc::UnboundedSender<Command<T>>,
    closing: bool,
}

impl<T> Scheduler<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(
        max_concurrent: usize,
        status: Arc<StatusCounters>,
        completions: mpsc::UnboundedSender<Command<T>>,
    ) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            running: 0,
            next_id: 0,
            entries: HashMap::new(),
            by_key: HashMap::new(),
            queue: BinaryHeap::new(),
            status,
            completions,
            closing: false,
        }
    }

    fn handle(&mut self, command: Command<T>) {
        match command {
            Command::Enqueue(request) => self.enqueue(request),
            Command::Completed { id, outcome } => self.complete(id, outcome),
            Command::ClearCache { prefix } => self.clear(prefix.as_deref()),
            Command::Shutdown => self.closing = true,
        }
    }

    fn enqueue(&mut self, request: QueuedRequest<T>) {
        let QueuedRequest {
            key,
            priority,
            thunk,
            response_tx,
        } = request;

        if let Some(id) = self.by_key.get(&key) {
            if let Some(entry) = self.entries.get_mut(id) {
                DEDUP_HITS.inc();
                debug!(key = %key, "joined pending request");
                entry.waiters.push(response_tx);
                return;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.by_key.insert(key.clone(), id);
        self.entries.insert(
            id,
            Entry {
                key,
                waiters: vec![response_tx],
            },
        );
        self.queue.push(Ready {
            priority,
            seq: id,
            id,
            thunk,
        });
    }

    fn complete(&mut self, id: u64, outcome: Outcome<T>) {
        self.running = self.running.saturating_sub(1);

        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        // a cleared key may already point at a newer request
        if self.by_key.get(&entry.key) == Some(&id) {
            self.by_key.remove(&entry.key);
        }
        trace!(key = %entry.key, ok = outcome.is_ok(), waiters = entry.waiters.len(), "request settled");
        for waiter in entry.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn clear(&mut self, prefix: Option<&str>) {
        let before = self.by_key.len();
        match prefix {
            Some(prefix) => self.by_key.retain(|key, _| !key.starts_with(prefix)),
            None => self.by_key.clear(),
        }
        debug!(
            prefix = prefix.unwrap_or("*"),
            cleared = before - self.by_key.len(),
            "cleared request cache"
        );
    }

    fn admit(&mut self) {
        while self.running < self.max_concurrent {
            let Some(ready) = self.queue.pop() else {
                break;
            };
            self.running += 1;
            trace!(id = ready.id, priority = ready.priority, "admitted request");

            let id = ready.id;
            let thunk = ready.thunk;
            let completions = self.completions.clone();
            tokio::spawn(async move {
                // the thunk runs in its own task so a panic settles the request
                let outcome = match tokio::spawn(async move { thunk().await }).await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(RequestError::Aborted(err.to_string())),
                };
                let _ = completions.send(Command::Completed { id, outcome });
            });
        }
    }

    fn publish_status(&self) {
        self.status.queued.store(self.queue.len(), Ordering::Relaxed);
        self.status.running.store(self.running, Ordering::Relaxed);
        self.status
            .pending_keys
            .store(self.by_key.len(), Ordering::Relaxed);
        QUEUE_DEPTH.set(self.queue.len() as f64);
        RUNNING_REQUESTS.set(self.running as f64);
    }

    fn finished(&self) -> bool {
        self.closing && self.entries.is_empty()
    }
}

// Background worker -> owns all scheduling state, handles commands in arrival order
pub async fn scheduler_worker<T>(mut rx: mpsc::UnboundedReceiver<Command<T>>, mut scheduler: Scheduler<T>)
where
    T: Clone + Send + 'static,
{
    debug!(max_concurrent = scheduler.max_concurrent, "request scheduler started");

    while let Some(command) = rx.recv().await {
        scheduler.handle(command);
        // drain everything already sent so admission sees the whole batch
        while let Ok(command) = rx.try_recv() {
            scheduler.handle(command);
        }
        scheduler.admit();
        scheduler.publish_status();

        if scheduler.finished() {
            break;
        }
    }

    debug!("request scheduler stopped");
}
