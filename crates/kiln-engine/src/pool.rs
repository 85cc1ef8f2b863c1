//! Fixed-size worker pool.
//!
//! Workers consume job ids from an unbounded FIFO protected by one mutex
//! and one condition variable. FIFO order is a preference, not a guarantee:
//! any worker may take any id. Claim exclusivity comes from the processor's
//! rename, not from this queue, so duplicate submissions are harmless.
//!
//! `start` must only be called after per-worker inference contexts exist;
//! each worker's stable index selects its context for the life of the pool.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use kiln_core::JobId;

/// Per-job callback: `(id, worker_id)`.
pub type ProcessorFn = Arc<dyn Fn(JobId, usize) + Send + Sync>;

/// Valid worker counts.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 64;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<JobId>,
    running: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    // A worker can only poison the lock by panicking between push/pop and
    // release; the queue state is still coherent, so take it back.
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct WorkerPool {
    workers: usize,
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        debug_assert!((MIN_WORKERS..=MAX_WORKERS).contains(&workers));
        Self {
            workers,
            shared: Arc::new(Shared::default()),
            handles: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Spawn the worker threads. Returns false if already started or if a
    /// thread could not be spawned (any workers already up are joined
    /// again before returning).
    pub fn start(&mut self, processor: ProcessorFn) -> bool {
        if !self.handles.is_empty() {
            tracing::warn!("pool already running");
            return false;
        }
        {
            let mut state = self.shared.lock();
            state.running = true;
            state.shutdown = false;
        }

        for worker_id in 0..self.workers {
            let shared = self.shared.clone();
            let processor = processor.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || worker_loop(shared, worker_id, processor));
            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "failed to spawn worker thread");
                    self.halt();
                    return false;
                }
            }
        }

        tracing::info!(workers = self.workers, "worker pool started");
        true
    }

    /// Enqueue an id. Thread-safe; dropped with a log if the pool is not
    /// accepting work.
    pub fn submit(&self, id: JobId) {
        submit_shared(&self.shared, id);
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// A cheap cloneable submission handle for other threads (the scan
    /// loop). Outliving the pool is fine: submissions after stop are
    /// dropped.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: self.shared.clone(),
        }
    }

    /// Signal shutdown, wake all workers, join them, drop undispatched ids.
    /// Idempotent.
    pub fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.halt();
        tracing::info!("worker pool stopped");
    }

    fn halt(&mut self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            state.shutdown = true;
        }
        self.shared.available.notify_all();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.shared.lock().queue.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Submission-only view of a pool's queue.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    pub fn submit(&self, id: JobId) {
        submit_shared(&self.shared, id);
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

fn submit_shared(shared: &Shared, id: JobId) {
    let mut state = shared.lock();
    if !state.running || state.shutdown {
        tracing::debug!(job = %id, "pool not running, dropping submission");
        return;
    }
    state.queue.push_back(id);
    drop(state);
    shared.available.notify_one();
}

fn worker_loop(shared: Arc<Shared>, worker_id: usize, processor: ProcessorFn) {
    tracing::debug!(worker_id, "worker started");

    loop {
        let id = {
            let mut state = shared.lock();
            loop {
                if state.shutdown {
                    tracing::debug!(worker_id, "worker stopping");
                    return;
                }
                if let Some(id) = state.queue.pop_front() {
                    break id;
                }
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        // Process outside the lock. A panicking processor must not take the
        // worker down with it.
        let result = catch_unwind(AssertUnwindSafe(|| processor(id.clone(), worker_id)));
        if result.is_err() {
            tracing::error!(worker_id, job = %id, "processor panicked");
        }
    }
}
