//! Daemon assembly and lifecycle.
//!
//! Startup order is load-bearing: workspace skeleton (with the same-device
//! check), then recovery of orphaned jobs, then backend context
//! pre-initialization on this thread, then the worker pool, and only then
//! the scanner loop. Shutdown reverses it: the scanner stops feeding, the
//! pool drains its current jobs and joins, anything mid-inference at exit
//! is left in `processing/` for the next start.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use kiln_core::config::KilnConfig;
use kiln_core::{JobId, WorkspaceLayout, WorkspaceError};

use crate::backend::{Backend, BackendError};
use crate::pool::{PoolHandle, WorkerPool, MAX_WORKERS, MIN_WORKERS};
use crate::processor::Processor;
use crate::recovery;
use crate::scanner::Scanner;

/// Granularity of interruptible sleeps in the scan loop.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("worker count {0} outside supported range {MIN_WORKERS}..={MAX_WORKERS}")]
    InvalidWorkers(usize),
    #[error("failed to start worker pool")]
    PoolStart,
    #[error("failed to spawn scanner thread: {0}")]
    ScannerSpawn(std::io::Error),
    #[error("server already running")]
    AlreadyRunning,
}

pub struct Server {
    layout: WorkspaceLayout,
    config: KilnConfig,
    backend: Option<Box<dyn Backend>>,
    pool: Option<WorkerPool>,
    scan_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    running: bool,
}

impl Server {
    pub fn new(layout: WorkspaceLayout, config: KilnConfig, backend: Box<dyn Backend>) -> Self {
        Self {
            layout,
            config,
            backend: Some(backend),
            pool: None,
            scan_thread: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.running {
            return Err(ServerError::AlreadyRunning);
        }
        let workers = self.config.scheduler.workers;
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(ServerError::InvalidWorkers(workers));
        }

        self.layout.ensure()?;
        self.layout.verify_same_device()?;

        // Orphans first, so the scanner sees them as ordinary ready jobs.
        recovery::recover(&self.layout);

        let backend = self.backend.take().ok_or(ServerError::AlreadyRunning)?;

        // Contexts before threads: backend bring-up happens here, on the
        // main thread, exactly once per worker slot.
        let mut processor = Processor::new(self.layout.clone(), backend);
        processor.init_contexts(workers)?;
        let processor = Arc::new(processor);

        let mut pool = WorkerPool::new(workers);
        let started = pool.start(Arc::new(move |id, worker_id| {
            let _ = processor.process(&id, worker_id);
        }));
        if !started {
            return Err(ServerError::PoolStart);
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let scan_thread = match spawn_scan_loop(
            Scanner::new(&self.layout),
            pool.handle(),
            self.shutdown.clone(),
            self.config.scheduler.scan_interval(),
            self.config.scheduler.dispatched_ceiling,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                pool.stop();
                return Err(ServerError::ScannerSpawn(e));
            }
        };

        self.pool = Some(pool);
        self.scan_thread = Some(scan_thread);
        self.running = true;

        tracing::info!(
            workspace = %self.layout.root().display(),
            workers,
            "server started"
        );
        Ok(())
    }

    /// Stop feeding, drain current jobs, join everything. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        tracing::info!("shutting down server");
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.scan_thread.take() {
            let _ = handle.join();
        }
        if let Some(mut pool) = self.pool.take() {
            pool.stop();
        }
        self.running = false;
        tracing::info!("server shutdown complete");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_scan_loop(
    scanner: Scanner,
    pool: PoolHandle,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
    dispatched_ceiling: usize,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("scanner".to_string())
        .spawn(move || {
            tracing::debug!("scanner loop started");
            // Ids handed to the pool. Purely an optimization against
            // re-submission; claim exclusivity does not depend on it.
            let mut dispatched: HashSet<JobId> = HashSet::new();

            while !shutdown.load(Ordering::SeqCst) {
                let jobs = scanner.scan();

                let mut submitted = 0;
                for id in &jobs {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if dispatched.insert(id.clone()) {
                        pool.submit(id.clone());
                        submitted += 1;
                    }
                }
                if submitted > 0 {
                    tracing::debug!(count = submitted, "submitted new jobs to pool");
                }

                // Compact the set once it grows past the ceiling: keep only
                // ids still sitting in ready/.
                if dispatched.len() > dispatched_ceiling {
                    let current: HashSet<JobId> = jobs.into_iter().collect();
                    dispatched.retain(|id| current.contains(id));
                }

                let deadline = Instant::now() + interval;
                while Instant::now() < deadline && !shutdown.load(Ordering::SeqCst) {
                    std::thread::sleep(SHUTDOWN_POLL);
                }
            }
            tracing::debug!("scanner loop stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError as BErr, Context};
    use std::path::PathBuf;

    struct NullBackend;
    struct NullContext;

    impl Backend for NullBackend {
        fn create_context(&self, _worker_id: usize) -> Result<Box<dyn Context>, BErr> {
            Ok(Box::new(NullContext))
        }
    }

    impl Context for NullContext {
        fn run_text(&mut self, prompt: &str) -> Result<String, BErr> {
            Ok(prompt.to_string())
        }
        fn run_vision(&mut self, prompt: &str, _images: &[PathBuf]) -> Result<String, BErr> {
            Ok(prompt.to_string())
        }
        fn embed(&mut self, _text: &str) -> Result<Vec<f32>, BErr> {
            Ok(vec![0.0])
        }
    }

    fn test_config() -> KilnConfig {
        let mut config = KilnConfig::default();
        config.scheduler.workers = 2;
        config.scheduler.scan_interval_secs = 1;
        config
    }

    #[test]
    fn start_then_shutdown_is_clean_and_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        let mut server = Server::new(layout, test_config(), Box::new(NullBackend));

        server.start().unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));

        server.shutdown();
        assert!(!server.is_running());
        server.shutdown();
    }

    #[test]
    fn invalid_worker_count_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        let mut config = test_config();
        config.scheduler.workers = 0;
        let mut server = Server::new(layout, config, Box::new(NullBackend));

        assert!(matches!(server.start(), Err(ServerError::InvalidWorkers(0))));
        assert!(!server.is_running());
    }

    #[test]
    fn startup_materializes_the_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path().join("fresh"));
        let mut server = Server::new(layout.clone(), test_config(), Box::new(NullBackend));

        server.start().unwrap();
        assert!(layout.ready().is_dir());
        assert!(layout.processing().is_dir());
        server.shutdown();
    }
}
