//! Per-bucket concurrency admission
//!
//! Calls whose target endpoint shares a bucket name contend for a fixed
//! number of permits, preventing connection-pool starvation when many
//! transfers hit the same bucket while leaving distinct buckets fully
//! concurrent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Per-bucket queue state. An entry exists only while the bucket has active
/// holders or waiters.
#[derive(Default)]
struct BucketQueue {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl std::fmt::Debug for BucketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketQueue")
            .field("active", &self.active)
            .field("waiters", &self.waiters.len())
            .finish()
    }
}

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    queues: Mutex<HashMap<String, BucketQueue>>,
}

/// Bounded, strictly FIFO admission gate keyed by bucket name
///
/// A permit is acquired before every object-store call and released when the
/// returned [`BucketPermit`] drops, so release happens on success, failure,
/// and cancellation paths alike. Permits are non-reentrant. Cloning the
/// limiter yields another handle to the same shared state.
#[derive(Debug, Clone)]
pub struct BucketLimiter {
    state: Arc<LimiterState>,
}

impl BucketLimiter {
    /// Create a limiter allowing `limit` concurrent calls per bucket
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "bucket limit must be at least 1");
        Self {
            state: Arc::new(LimiterState {
                limit,
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Maximum concurrent calls per bucket
    pub fn limit(&self) -> usize {
        self.state.limit
    }

    /// Acquire a permit for `bucket`, waiting in FIFO order when the bucket
    /// is saturated.
    pub async fn acquire(&self, bucket: &str) -> BucketPermit {
        let waiter = {
            let mut queues = self.state.queues.lock().unwrap();
            let queue = queues.entry(bucket.to_string()).or_default();
            if queue.active < self.state.limit {
                queue.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // The releasing side transfers its slot before signalling, so a
            // successful recv means the permit is already ours.
            rx.await.expect("release side never drops a claimed waiter");
        }

        BucketPermit {
            limiter: self.clone(),
            bucket: bucket.to_string(),
        }
    }

    /// Current number of active permit holders for `bucket`
    pub fn active(&self, bucket: &str) -> usize {
        let queues = self.state.queues.lock().unwrap();
        queues.get(bucket).map(|q| q.active).unwrap_or(0)
    }

    /// True when no bucket has active holders or waiters
    pub fn is_idle(&self) -> bool {
        self.state.queues.lock().unwrap().is_empty()
    }

    fn release(&self, bucket: &str) {
        let mut queues = self.state.queues.lock().unwrap();
        let Some(queue) = queues.get_mut(bucket) else {
            return;
        };

        // Hand the slot to the oldest live waiter. A send failure means that
        // waiter was cancelled while queued; skip it and try the next.
        while let Some(tx) = queue.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }

        queue.active -= 1;
        if queue.active == 0 && queue.waiters.is_empty() {
            queues.remove(bucket);
        }
    }
}

/// Permission to run one in-flight call against a bucket. Released on drop.
#[derive(Debug)]
pub struct BucketPermit {
    limiter: BucketLimiter,
    bucket: String,
}

impl Drop for BucketPermit {
    fn drop(&mut self) {
        self.limiter.release(&self.bucket);
    }
}
