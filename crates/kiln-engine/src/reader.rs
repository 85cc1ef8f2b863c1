//! Read-only queries over workspace state.
//!
//! Safe to run concurrently with the daemon and with other readers: no
//! locking, every answer is a snapshot. Status probes check locations in
//! terminal-first order; since the lifecycle DAG only moves forward, a job
//! found in a later state cannot also be in an earlier one. A job renamed
//! mid-probe is retried once; after that the caller polls.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use kiln_core::layout::{ERROR_FILE, PROMPT_FILE, RESULT_FILE};
use kiln_core::{Job, JobId, JobStatus, WorkspaceLayout};

/// Directory counts for the workspace summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceCounts {
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
}

pub struct Reader {
    layout: WorkspaceLayout,
}

impl Reader {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }

    /// Current state of an id. `Missing` may be a snapshot race for an
    /// in-flight submission; callers that need certainty poll.
    pub fn status(&self, id: &JobId) -> JobStatus {
        if self.layout.output_job(id).exists() {
            JobStatus::Done
        } else if self.layout.failed_job(id).exists() {
            JobStatus::Failed
        } else if self.layout.processing_job(id).exists() {
            JobStatus::Running
        } else if self.layout.ready_job(id).exists() {
            JobStatus::Queued
        } else {
            JobStatus::Missing
        }
    }

    pub fn exists(&self, id: &JobId) -> bool {
        self.status(id) != JobStatus::Missing
    }

    /// Fully populated job, or `None` if the id is unknown.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        // One retry: the job may finalize between the status probe and the
        // content read.
        for _ in 0..2 {
            match self.status(id) {
                JobStatus::Done => {
                    let dir = self.layout.output_job(id);
                    match fs::read_to_string(dir.join(RESULT_FILE)) {
                        Ok(content) => {
                            return Some(Job {
                                id: id.clone(),
                                status: JobStatus::Done,
                                content,
                                timestamp: dir_mtime(&dir),
                            });
                        }
                        Err(_) => continue,
                    }
                }
                JobStatus::Failed => {
                    let dir = self.layout.failed_job(id);
                    let content = fs::read_to_string(dir.join(ERROR_FILE)).unwrap_or_default();
                    return Some(Job {
                        id: id.clone(),
                        status: JobStatus::Failed,
                        content,
                        timestamp: dir_mtime(&dir),
                    });
                }
                JobStatus::Missing => return None,
                status => {
                    return Some(Job {
                        id: id.clone(),
                        status,
                        content: String::new(),
                        timestamp: SystemTime::now(),
                    });
                }
            }
        }
        None
    }

    /// The `max` most recently finished jobs, newest first. Content fields
    /// are left empty; use `get` for content.
    pub fn list(&self, max: usize) -> Vec<Job> {
        let mut jobs = Vec::new();
        collect_terminal(&self.layout.output(), JobStatus::Done, &mut jobs);
        collect_terminal(&self.layout.failed(), JobStatus::Failed, &mut jobs);

        jobs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        jobs.truncate(max);
        jobs
    }

    /// Most recently finished job, if any.
    pub fn latest(&self) -> Option<Job> {
        self.list(1).into_iter().next()
    }

    /// The submitted prompt, wherever the job currently lives.
    pub fn prompt(&self, id: &JobId) -> Option<String> {
        let candidates = [
            self.layout.output_job(id),
            self.layout.failed_job(id),
            self.layout.processing_job(id),
            self.layout.ready_job(id),
            self.layout.writing_job(id),
        ];
        candidates
            .iter()
            .find_map(|dir| fs::read_to_string(dir.join(PROMPT_FILE)).ok())
    }

    /// The failure message of a failed job, if one was recorded.
    pub fn error(&self, id: &JobId) -> Option<String> {
        fs::read_to_string(self.layout.failed_job(id).join(ERROR_FILE)).ok()
    }

    /// Directory counts across the workspace.
    pub fn counts(&self) -> WorkspaceCounts {
        WorkspaceCounts {
            queued: count_dirs(&self.layout.ready()),
            processing: count_dirs(&self.layout.processing()),
            done: count_dirs(&self.layout.output()),
            failed: count_dirs(&self.layout.failed()),
        }
    }
}

/// Directory mtime as wall-clock time. There is a bounded race window as
/// the job may be touched between probe and read; callers treat timestamps
/// as ordering hints, not truth.
fn dir_mtime(dir: &Path) -> SystemTime {
    fs::metadata(dir)
        .and_then(|meta| meta.modified())
        .unwrap_or_else(|_| SystemTime::now())
}

fn collect_terminal(dir: &PathBuf, status: JobStatus, jobs: &mut Vec<Job>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(id) = JobId::from_dir_name(&entry.file_name()) else {
            continue;
        };
        jobs.push(Job {
            id,
            status,
            content: String::new(),
            timestamp: dir_mtime(&path),
        });
    }
}

fn count_dirs(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| entries.flatten().filter(|e| e.path().is_dir()).count())
        .unwrap_or(0)
}
