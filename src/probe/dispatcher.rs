//! Bounded-concurrency work dispatch.
//!
//! Items are consumed strictly in input order and handed to at most `W`
//! concurrent workers; completion order is whatever the network makes it.
//! One item's panic or failure never touches another. A fired cancel
//! signal stops intake and lets in-flight work drain.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Progress report cadence, in completed items.
const PROGRESS_EVERY: usize = 10;

/// Clone-able cancellation signal.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Sending half of the cancellation signal.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    /// Create a signal and its trigger.
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// Signal that never fires, for callers without a cancel path.
    pub fn never() -> CancelSignal {
        let (handle, signal) = Self::new();
        // Keep the sender alive for the life of the receiver.
        std::mem::forget(handle);
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the signal fires.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Bounded worker pool.
pub struct Dispatcher {
    concurrency: usize,
}

impl Dispatcher {
    /// Bound is clamped into the supported [50, 500] range.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.clamp(50, 500),
        }
    }

    /// Exact bound, for tests that need small pools.
    pub fn with_exact_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `task` over every item with at most `concurrency` in flight.
    ///
    /// Returns `(index, result)` pairs in completion order. When the
    /// cancel signal fires, unspawned items are dropped and in-flight
    /// tasks drain to completion.
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancelSignal,
        task: F,
    ) -> Vec<(usize, R)>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut join_set: JoinSet<(usize, R)> = JoinSet::new();
        let mut results = Vec::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(spawned = index, total, "sweep cancelled; draining in-flight work");
                break;
            }

            // Intake order is the input order; the permit gate is what
            // bounds concurrency.
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => {
                    tracing::warn!(spawned = index, total, "sweep cancelled while waiting for a worker slot");
                    break;
                }
            };

            let future = task(index, item);
            let completed = completed.clone();
            join_set.spawn(async move {
                let result = future.await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_EVERY == 0 {
                    tracing::info!(done, total, "progress");
                }
                drop(permit);
                (index, result)
            });

            // Reap finished tasks opportunistically so the join set stays
            // small on large sweeps.
            while let Some(finished) = join_set.try_join_next() {
                if let Ok(pair) = finished {
                    results.push(pair);
                }
            }
        }

        while let Some(finished) = join_set.join_next().await {
            if let Ok(pair) = finished {
                results.push(pair);
            }
        }

        let done = completed.load(Ordering::Relaxed);
        tracing::info!(done, total, "dispatch complete");
        results
    }
}
