//! Progress tracking and listener callbacks
//!
//! Each operation owns one tracker. Byte updates and listener invocation are
//! serialized so `bytes_transferred` callbacks observe a monotonically
//! non-decreasing counter. Listeners run synchronously on the worker's
//! context and must be fast and non-blocking; a listener that needs to do
//! real work should forward events through [`ChannelListener`] instead.
//! Listener panics are logged and never propagated.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::TransferError;

/// Point-in-time progress of a single object transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Bytes transferred so far
    pub transferred_bytes: u64,
    /// Total bytes, unknown for downloads until triage completes
    pub total_bytes: Option<u64>,
}

/// Point-in-time progress of a directory operation. `total_files` grows as
/// discovery streams in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryProgressSnapshot {
    /// Files transferred successfully so far
    pub transferred_files: u64,
    /// Files with a terminal outcome so far (succeeded plus failed)
    pub total_files: u64,
}

/// Hooks invoked as a single-object transfer progresses
///
/// `on_initiated` fires once before the first byte moves; exactly one of
/// `on_complete` or `on_failed` fires at the end.
pub trait TransferListener: Send + Sync {
    /// The operation has started
    fn on_initiated(&self, _snapshot: ProgressSnapshot) {}

    /// Bytes were transferred; may fire many times
    fn on_bytes_transferred(&self, _snapshot: ProgressSnapshot) {}

    /// The operation finished successfully
    fn on_complete(&self, _snapshot: ProgressSnapshot) {}

    /// The operation failed
    fn on_failed(&self, _snapshot: ProgressSnapshot, _error: &TransferError) {}
}

/// Hook invoked as a directory operation's tally changes
pub trait DirectoryListener: Send + Sync {
    /// A child operation reached a terminal state
    fn on_progress(&self, _snapshot: DirectoryProgressSnapshot) {}
}

struct CounterState {
    transferred: u64,
    total: Option<u64>,
}

/// Per-operation progress accumulator shared by all of its tasks
pub(crate) struct ProgressTracker {
    state: Mutex<CounterState>,
    finished: AtomicBool,
    listeners: Vec<Arc<dyn TransferListener>>,
}

impl ProgressTracker {
    pub(crate) fn new(listeners: Vec<Arc<dyn TransferListener>>, total: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CounterState {
                transferred: 0,
                total,
            }),
            finished: AtomicBool::new(false),
            listeners,
        })
    }

    /// Set the total once it is discovered
    pub(crate) fn set_total(&self, total: u64) {
        self.state.lock().unwrap().total = Some(total);
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().unwrap();
        ProgressSnapshot {
            transferred_bytes: state.transferred,
            total_bytes: state.total,
        }
    }

    pub(crate) fn initiated(&self) {
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            invoke(|| listener.on_initiated(snapshot));
        }
    }

    /// Add `bytes` to the counter and notify listeners. Returns the updated
    /// count. The lock spans update and callbacks so observed values are
    /// monotonic.
    pub(crate) fn record(&self, bytes: u64) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.transferred += bytes;
        let snapshot = ProgressSnapshot {
            transferred_bytes: state.transferred,
            total_bytes: state.total,
        };
        for listener in &self.listeners {
            invoke(|| listener.on_bytes_transferred(snapshot));
        }
        snapshot.transferred_bytes
    }

    /// Fire the success hook. At most one terminal hook fires per operation.
    pub(crate) fn complete(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            invoke(|| listener.on_complete(snapshot));
        }
    }

    /// Fire the failure hook. At most one terminal hook fires per operation.
    pub(crate) fn failed(&self, error: &TransferError) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            invoke(|| listener.on_failed(snapshot, error));
        }
    }
}

fn invoke<F: FnOnce()>(f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("transfer listener panicked; continuing");
    }
}

/// Typed progress events carried by [`ChannelListener`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// The operation has started
    Initiated {
        /// Progress at start
        snapshot: ProgressSnapshot,
    },
    /// Bytes were transferred
    BytesTransferred {
        /// Progress after the update
        snapshot: ProgressSnapshot,
    },
    /// The operation finished successfully
    Completed {
        /// Final progress
        snapshot: ProgressSnapshot,
    },
    /// The operation failed
    Failed {
        /// Progress at failure
        snapshot: ProgressSnapshot,
        /// Rendered error message
        message: String,
    },
}

/// A listener that forwards events into an unbounded channel, letting the
/// receiver do heavy work off the transfer's critical path
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelListener {
    /// Create the listener and its receiving end
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    fn push(&self, event: ProgressEvent) {
        // A dropped receiver is not an error; progress just goes unobserved.
        let _ = self.sender.send(event);
    }
}

impl TransferListener for ChannelListener {
    fn on_initiated(&self, snapshot: ProgressSnapshot) {
        self.push(ProgressEvent::Initiated { snapshot });
    }

    fn on_bytes_transferred(&self, snapshot: ProgressSnapshot) {
        self.push(ProgressEvent::BytesTransferred { snapshot });
    }

    fn on_complete(&self, snapshot: ProgressSnapshot) {
        self.push(ProgressEvent::Completed { snapshot });
    }

    fn on_failed(&self, snapshot: ProgressSnapshot, error: &TransferError) {
        self.push(ProgressEvent::Failed {
            snapshot,
            message: error.to_string(),
        });
    }
}
