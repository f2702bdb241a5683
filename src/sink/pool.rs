use crossbeam_channel::Receiver;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::completion::CompletionQueue;
use crate::error::Result;
use crate::event::Event;

const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Work bound to the pool. Runs on a worker thread, once per dispatched event.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Adapter so plain closures can be bound as handlers.
pub struct FnHandler<F>(pub F);

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnHandler(f)
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Counters shared by the producer and every worker.
#[derive(Debug, Default)]
pub struct PoolCounters {
    created: AtomicU64,
    completed: AtomicU64,
    running: AtomicU64,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl PoolCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo a `record_created` for an event that never reached the queue.
    pub fn revoke_created(&self) {
        self.created.fetch_sub(1, Ordering::AcqRel);
    }

    fn mark_completed(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        let _guard = self.idle_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.idle.notify_all();
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn running(&self) -> u64 {
        self.running.load(Ordering::Acquire)
    }

    /// Events created but not yet completed.
    pub fn in_flight(&self) -> u64 {
        self.created().saturating_sub(self.completed())
    }

    /// Blocks until every created event has completed. `on_poll` runs on each
    /// pass so the caller can keep draining completions meanwhile.
    pub fn wait_idle(&self, mut on_poll: impl FnMut()) {
        loop {
            on_poll();
            if self.created() == self.completed() {
                // completions are reported before the count moves; pick up the tail
                on_poll();
                return;
            }
            let guard = self.idle_lock.lock().unwrap_or_else(|p| p.into_inner());
            if self.created() != self.completed() {
                let _ = self.idle.wait_timeout(guard, DRAIN_POLL);
            }
        }
    }
}

/// Fixed set of threads pulling events off the dispatch queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        size: usize,
        queue: Receiver<Event>,
        handler: Arc<dyn EventHandler>,
        counters: Arc<PoolCounters>,
        completions: Arc<CompletionQueue>,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let counters = Arc::clone(&counters);
            let completions = Arc::clone(&completions);

            let handle = std::thread::Builder::new()
                .name(format!("eventsink-worker-{id}"))
                .spawn(move || worker_loop(id, queue, handler, counters, completions))?;
            workers.push(handle);
        }
        info!("Worker pool started. Threads: {}", size);
        Ok(Self { workers })
    }

    /// Waits for every worker to exit. Workers exit once the dispatch queue's
    /// producer side is gone and the queue is empty.
    pub fn join(self) {
        for handle in self.workers {
            if handle.join().is_err() {
                warn!("worker thread panicked outside a handler");
            }
        }
        info!("Worker pool stopped.");
    }
}

fn worker_loop(
    id: usize,
    queue: Receiver<Event>,
    handler: Arc<dyn EventHandler>,
    counters: Arc<PoolCounters>,
    completions: Arc<CompletionQueue>,
) {
    while let Ok(event) = queue.recv() {
        counters.running.fetch_add(1, Ordering::AcqRel);

        match catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(worker = id, event = ?event.id(), "handler failed: {:#}", err),
            Err(_) => warn!(worker = id, event = ?event.id(), "handler panicked"),
        }

        counters.running.fetch_sub(1, Ordering::AcqRel);
        completions.report(event.anchor());
        counters.mark_completed();
    }
    debug!(worker = id, "dispatch queue closed, worker exiting");
}
