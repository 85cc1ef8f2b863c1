//! Ready-directory scanner.
//!
//! Discovers published jobs by enumerating `input/ready/`. A directory is a
//! schedulable job only if it contains a non-empty regular `prompt.txt`;
//! anything else is skipped silently and left in place (it may be
//! mid-publication by a broken submitter, and deleting it is not the
//! scanner's call). Results are sorted lexicographically, which approximates
//! submission order because generated ids start with a timestamp.

use std::path::{Path, PathBuf};

use kiln_core::layout::PROMPT_FILE;
use kiln_core::{JobId, WorkspaceLayout};

pub struct Scanner {
    ready: PathBuf,
}

impl Scanner {
    pub fn new(layout: &WorkspaceLayout) -> Self {
        Self {
            ready: layout.ready(),
        }
    }

    /// One enumeration pass. Enumeration failure logs and yields an empty
    /// batch; the caller sleeps a full interval either way.
    pub fn scan(&self) -> Vec<JobId> {
        let entries = match std::fs::read_dir(&self.ready) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.ready.display(), error = %e, "ready scan failed");
                return Vec::new();
            }
        };

        let mut jobs: Vec<JobId> = entries
            .flatten()
            .filter(|entry| is_valid_job_dir(&entry.path()))
            .filter_map(|entry| JobId::from_dir_name(&entry.file_name()))
            .collect();
        jobs.sort();

        if !jobs.is_empty() {
            tracing::debug!(count = jobs.len(), "scanner found ready jobs");
        }
        jobs
    }

    /// Number of currently well-formed queued jobs.
    pub fn ready_count(&self) -> usize {
        std::fs::read_dir(&self.ready)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| is_valid_job_dir(&entry.path()))
                    .count()
            })
            .unwrap_or(0)
    }
}

fn is_valid_job_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    match std::fs::metadata(dir.join(PROMPT_FILE)) {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}
