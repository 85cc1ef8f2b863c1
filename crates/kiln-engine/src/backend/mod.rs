//! Inference backend interface.
//!
//! The scheduler treats inference as an opaque collaborator: a [`Backend`]
//! builds one [`Context`] per worker slot on the main thread before any
//! worker starts, and each context is then driven only from its owning
//! worker thread. Operations a backend cannot run reentrantly (vision
//! encoding in llama.cpp shares compute-graph state across contexts) take
//! the process-wide [`vision_gate`] for their duration.

pub mod llama;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

pub use llama::LlamaBackend;

/// Inference failure, surfaced into the job's `error.txt`.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
    #[error("{tool} failed ({status}): {stderr}")]
    Tool {
        tool: String,
        status: i32,
        stderr: String,
    },
    #[error("{0}")]
    Model(String),
    #[error("invalid backend output: {0}")]
    InvalidOutput(String),
}

/// Factory for per-worker inference contexts.
///
/// `create_context` is called once per worker slot, from the main thread,
/// before the pool starts. Any process-global bring-up the backend needs
/// happens inside these calls, serialized by construction.
pub trait Backend: Send + Sync {
    fn create_context(&self, worker_id: usize) -> Result<Box<dyn Context>, BackendError>;
}

/// A worker-bound inference context.
///
/// Exactly one worker thread drives a given context; contexts are created
/// before the worker starts and dropped after it joins.
pub trait Context: Send {
    fn run_text(&mut self, prompt: &str) -> Result<String, BackendError>;
    fn run_vision(&mut self, prompt: &str, images: &[PathBuf]) -> Result<String, BackendError>;
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, BackendError>;
}

static VISION_GATE: Mutex<()> = Mutex::new(());

/// Process-wide gate serializing backend operations that are declared
/// non-reentrant. Held for the duration of the guarded call.
pub fn vision_gate() -> MutexGuard<'static, ()> {
    VISION_GATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
