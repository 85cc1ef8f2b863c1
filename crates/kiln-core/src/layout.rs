//! Workspace directory skeleton.
//!
//! The workspace root contains five state directories; a job lives in
//! exactly one of them at any instant and moves between them by atomic
//! rename. That atomicity only holds when all five directories sit on a
//! single filesystem, which [`WorkspaceLayout::verify_same_device`] checks
//! at daemon startup.
//!
//! ```text
//! <root>/
//!   input/writing/<id>/    staging, visible only to the submitter
//!   input/ready/<id>/      published, eligible for claim
//!   processing/<id>/       claimed by a worker
//!   output/<id>/           finished, result.txt present
//!   failed/<id>/           finished, error.txt present
//! ```

use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;
use crate::job::JobId;

pub const PROMPT_FILE: &str = "prompt.txt";
pub const TYPE_FILE: &str = "type.txt";
pub const RESULT_FILE: &str = "result.txt";
pub const RESULT_TMP_FILE: &str = "result.txt.tmp";
pub const ERROR_FILE: &str = "error.txt";
pub const IMAGES_DIR: &str = "images";

/// Typed access to the state directories under a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn writing(&self) -> PathBuf {
        self.root.join("input").join("writing")
    }

    pub fn ready(&self) -> PathBuf {
        self.root.join("input").join("ready")
    }

    pub fn processing(&self) -> PathBuf {
        self.root.join("processing")
    }

    pub fn output(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn failed(&self) -> PathBuf {
        self.root.join("failed")
    }

    pub fn writing_job(&self, id: &JobId) -> PathBuf {
        self.writing().join(id.as_str())
    }

    pub fn ready_job(&self, id: &JobId) -> PathBuf {
        self.ready().join(id.as_str())
    }

    pub fn processing_job(&self, id: &JobId) -> PathBuf {
        self.processing().join(id.as_str())
    }

    pub fn output_job(&self, id: &JobId) -> PathBuf {
        self.output().join(id.as_str())
    }

    pub fn failed_job(&self, id: &JobId) -> PathBuf {
        self.failed().join(id.as_str())
    }

    /// Materialize the skeleton. Idempotent; both the daemon and the
    /// submitter call this on startup.
    pub fn ensure(&self) -> Result<(), WorkspaceError> {
        for dir in self.state_dirs() {
            std::fs::create_dir_all(&dir)
                .map_err(|source| WorkspaceError::Create { path: dir, source })?;
        }
        Ok(())
    }

    /// Refuse workspaces split across filesystems.
    ///
    /// Every state transition is a directory rename between siblings;
    /// rename is only atomic within one filesystem.
    #[cfg(unix)]
    pub fn verify_same_device(&self) -> Result<(), WorkspaceError> {
        use std::os::unix::fs::MetadataExt;

        let mut reference: Option<(PathBuf, u64)> = None;
        for dir in self.state_dirs() {
            let meta = std::fs::metadata(&dir)
                .map_err(|source| WorkspaceError::Probe { path: dir.clone(), source })?;
            if let Some((first, dev)) = &reference {
                if *dev != meta.dev() {
                    return Err(WorkspaceError::DeviceMismatch {
                        first: first.clone(),
                        second: dir,
                    });
                }
            } else {
                reference = Some((dir, meta.dev()));
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn verify_same_device(&self) -> Result<(), WorkspaceError> {
        // No portable device probe; rename atomicity is the operator's
        // responsibility on these hosts.
        Ok(())
    }

    fn state_dirs(&self) -> [PathBuf; 5] {
        [
            self.writing(),
            self.ready(),
            self.processing(),
            self.output(),
            self.failed(),
        ]
    }
}
