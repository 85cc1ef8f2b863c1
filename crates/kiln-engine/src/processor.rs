//! Per-job state machine.
//!
//! Owns the transitions `ready -> processing -> {output, failed}`. The claim
//! rename is the linearization point: the kernel guarantees exactly one
//! caller observes success for a given id, so no in-process lock is needed
//! for claim exclusivity.
//!
//! Inference contexts are created on the main thread, one per worker slot,
//! before any worker runs (`init_contexts`). After start each context is
//! only ever locked by its owning worker; the mutex expresses that the slot
//! is single-owner, it is never contended.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use kiln_core::layout::{ERROR_FILE, IMAGES_DIR, PROMPT_FILE, RESULT_FILE, RESULT_TMP_FILE, TYPE_FILE};
use kiln_core::{JobId, JobKind, WorkspaceLayout};

use crate::backend::{Backend, BackendError, Context};

/// Outcome of one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Job finalized into `output/`.
    Success,
    /// Job finalized into `failed/`.
    Failed,
    /// The id was not in `ready/`; claimed by another worker or withdrawn.
    /// Not an error.
    NotFound,
    /// Internal failure; the job stays in `processing/` for the next
    /// startup's recovery.
    SystemError,
}

pub struct Processor {
    layout: WorkspaceLayout,
    backend: Box<dyn Backend>,
    contexts: HashMap<usize, Mutex<Box<dyn Context>>>,
}

impl Processor {
    pub fn new(layout: WorkspaceLayout, backend: Box<dyn Backend>) -> Self {
        Self {
            layout,
            backend,
            contexts: HashMap::new(),
        }
    }

    /// Create one inference context per worker slot.
    ///
    /// Must run on the main thread before the pool starts: this serializes
    /// whatever global bring-up the backend performs, and afterwards each
    /// context belongs to exactly one worker.
    pub fn init_contexts(&mut self, workers: usize) -> Result<(), BackendError> {
        for worker_id in 0..workers {
            tracing::debug!(worker_id, "pre-creating inference context");
            let context = self.backend.create_context(worker_id)?;
            self.contexts.insert(worker_id, Mutex::new(context));
        }
        tracing::debug!(count = workers, "all inference contexts initialized");
        Ok(())
    }

    /// Claim and run one job on behalf of `worker_id`.
    pub fn process(&self, id: &JobId, worker_id: usize) -> ProcessOutcome {
        match self.claim(id) {
            Ok(true) => {}
            Ok(false) => return ProcessOutcome::NotFound,
            Err(()) => return ProcessOutcome::SystemError,
        }

        tracing::info!(job = %id, worker_id, "job running");
        let start = Instant::now();

        let prompt = match self.read_prompt(id) {
            Some(prompt) => prompt,
            None => {
                self.finalize_failure(id, "Failed to read prompt file");
                return ProcessOutcome::Failed;
            }
        };

        let Some(context) = self.contexts.get(&worker_id) else {
            tracing::error!(worker_id, "no inference context for worker; was init_contexts called?");
            self.finalize_failure(id, "No inference context available");
            return ProcessOutcome::SystemError;
        };

        let kind = self.job_kind(id);
        let result = {
            let mut context = context
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match kind {
                JobKind::Text => context.run_text(&prompt),
                JobKind::Vision => {
                    let images = self.image_paths(id);
                    context.run_vision(&prompt, &images)
                }
                JobKind::Embed => context.embed(&prompt).map(render_vector),
            }
        };

        let elapsed = start.elapsed();
        match result {
            Ok(output) => {
                if self.finalize_success(id, &output) {
                    tracing::info!(
                        job = %id,
                        worker_id,
                        %kind,
                        bytes = output.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "job completed"
                    );
                    ProcessOutcome::Success
                } else {
                    ProcessOutcome::SystemError
                }
            }
            Err(e) => {
                tracing::warn!(job = %id, worker_id, error = %e, "job failed during inference");
                self.finalize_failure(id, &e.to_string());
                ProcessOutcome::Failed
            }
        }
    }

    /// Attempt the claim rename. Ok(false) means another worker won the
    /// race or the job was withdrawn.
    fn claim(&self, id: &JobId) -> Result<bool, ()> {
        let from = self.layout.ready_job(id);
        let to = self.layout.processing_job(id);
        match fs::rename(&from, &to) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(job = %id, "job already claimed or missing");
                Ok(false)
            }
            Err(e) => {
                tracing::error!(job = %id, error = %e, "claim rename failed");
                Err(())
            }
        }
    }

    fn read_prompt(&self, id: &JobId) -> Option<String> {
        let path = self.layout.processing_job(id).join(PROMPT_FILE);
        match fs::read_to_string(&path) {
            Ok(prompt) if !prompt.is_empty() => Some(prompt),
            Ok(_) => {
                tracing::warn!(job = %id, "empty prompt file");
                None
            }
            Err(e) => {
                tracing::error!(job = %id, error = %e, "failed to read prompt");
                None
            }
        }
    }

    /// Absent or unrecognized `type.txt` means a text job; published jobs
    /// are well-formed by construction, so anything else came from outside
    /// the submitter and gets the default path.
    fn job_kind(&self, id: &JobId) -> JobKind {
        let path = self.layout.processing_job(id).join(TYPE_FILE);
        match fs::read_to_string(path) {
            Ok(text) => JobKind::parse(&text).unwrap_or_default(),
            Err(_) => JobKind::Text,
        }
    }

    /// Attachment paths in staging order (index-prefixed names sort).
    fn image_paths(&self, id: &JobId) -> Vec<PathBuf> {
        let dir = self.layout.processing_job(id).join(IMAGES_DIR);
        let mut paths: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }

    /// Write the result durably, then move the job to `output/`. The tmp
    /// rename keeps a half-written `result.txt` from ever being visible.
    fn finalize_success(&self, id: &JobId, result: &str) -> bool {
        let processing = self.layout.processing_job(id);
        let tmp = processing.join(RESULT_TMP_FILE);

        let finalized = fs::write(&tmp, result)
            .and_then(|()| fs::rename(&tmp, processing.join(RESULT_FILE)))
            .and_then(|()| fs::rename(&processing, self.layout.output_job(id)));

        match finalized {
            Ok(()) => true,
            Err(e) => {
                // Left in processing/ for recovery at next startup.
                tracing::error!(job = %id, error = %e, "failed to finalize successful job");
                false
            }
        }
    }

    /// Record the error and move the job to `failed/`. The error file is
    /// best-effort; the transition is not blocked by its failure.
    fn finalize_failure(&self, id: &JobId, error: &str) {
        let processing = self.layout.processing_job(id);
        if let Err(e) = fs::write(processing.join(ERROR_FILE), error) {
            tracing::warn!(job = %id, error = %e, "failed to write error file");
        }
        if let Err(e) = fs::rename(&processing, self.layout.failed_job(id)) {
            tracing::error!(job = %id, error = %e, "failed to move job to failed");
        }
    }
}

/// On-disk rendering of an embedding vector: one float per line.
fn render_vector(vector: Vec<f32>) -> String {
    let mut out = String::with_capacity(vector.len() * 12);
    for value in vector {
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}
