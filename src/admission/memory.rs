//! Global memory admission
//!
//! Bounds the total bytes of part and segment data buffered in memory
//! across all concurrent transfers. Without this, N simultaneous downloads
//! of P-byte batches would consume N*P bytes of RAM unboundedly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct LedgerState {
    in_use: u64,
    waiters: VecDeque<(oneshot::Sender<()>, u64)>,
}

#[derive(Debug)]
struct LimiterState {
    budget: u64,
    ledger: Mutex<LedgerState>,
}

/// Byte-budget ledger with strictly FIFO waiters
///
/// `reserve` and `release` are infallible and never time out. A reservation
/// larger than the whole budget is admitted only while the ledger is empty;
/// otherwise it would wait forever behind a budget it can never fit.
/// Cloning the limiter yields another handle to the same shared state.
#[derive(Debug, Clone)]
pub struct MemoryLimiter {
    state: Arc<LimiterState>,
}

impl MemoryLimiter {
    /// Create a ledger with the given byte budget
    pub fn new(budget: u64) -> Self {
        assert!(budget > 0, "memory budget must be greater than zero");
        Self {
            state: Arc::new(LimiterState {
                budget,
                ledger: Mutex::new(LedgerState::default()),
            }),
        }
    }

    /// Total byte budget
    pub fn budget(&self) -> u64 {
        self.state.budget
    }

    /// Bytes currently reserved
    pub fn in_use(&self) -> u64 {
        self.state.ledger.lock().unwrap().in_use
    }

    /// Reserve `bytes`, waiting until they fit within the budget. The
    /// reservation is released when the returned guard drops.
    pub async fn reserve(&self, bytes: u64) -> MemoryReservation {
        let waiter = {
            let mut ledger = self.state.ledger.lock().unwrap();
            if fits(ledger.in_use, bytes, self.state.budget) && ledger.waiters.is_empty() {
                ledger.in_use += bytes;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                ledger.waiters.push_back((tx, bytes));
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // The releasing side charges the ledger before signalling.
            rx.await.expect("release side never drops a claimed waiter");
        }

        MemoryReservation {
            limiter: self.clone(),
            bytes,
        }
    }

    fn release(&self, bytes: u64) {
        let mut ledger = self.state.ledger.lock().unwrap();
        ledger.in_use = ledger.in_use.saturating_sub(bytes);

        // Wake waiters strictly in arrival order; stop at the first one that
        // does not fit. A send failure means the waiter was cancelled while
        // queued; undo its charge and move on.
        while let Some((_, request)) = ledger.waiters.front() {
            if !fits(ledger.in_use, *request, self.state.budget) {
                break;
            }
            let (tx, request) = ledger.waiters.pop_front().unwrap();
            ledger.in_use += request;
            if tx.send(()).is_err() {
                ledger.in_use -= request;
            }
        }
    }
}

fn fits(in_use: u64, request: u64, budget: u64) -> bool {
    in_use == 0 || in_use.saturating_add(request) <= budget
}

/// A scoped byte reservation. Released exactly once, on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    limiter: MemoryLimiter,
    bytes: u64,
}

impl MemoryReservation {
    /// Bytes held by this reservation
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.limiter.release(self.bytes);
    }
}
