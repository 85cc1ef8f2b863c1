//! Job identity and lifecycle types.
//!
//! A job's state is never stored anywhere; it is derived from which workspace
//! directory currently contains the job. The id string is the only piece of
//! identity that travels between processes.

use std::ffi::OsStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The five externally observable job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Missing,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Missing => "missing",
        }
    }

    /// Terminal states are never left once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of inference a job requests.
///
/// Encoded on disk as the lowercase name in `type.txt`; an absent file
/// means [`JobKind::Text`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[default]
    Text,
    Embed,
    Vision,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Text => "text",
            JobKind::Embed => "embed",
            JobKind::Vision => "vision",
        }
    }

    /// Parse the on-disk spelling. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "text" => Some(JobKind::Text),
            "embed" => Some(JobKind::Embed),
            "vision" => Some(JobKind::Vision),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque job identifier.
///
/// Generated ids have the shape `<micros>_<pid>_<counter>`: wall-clock
/// microseconds, process id, and a process-local counter. Time alone
/// collides across processes and a counter alone collides across restarts;
/// the concatenation is unique under concurrent submitters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

static SUBMIT_COUNTER: AtomicU64 = AtomicU64::new(0);

impl JobId {
    /// Generate a fresh id for this process.
    pub fn generate() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let counter = SUBMIT_COUNTER.fetch_add(1, Ordering::Relaxed);
        JobId(format!("{}_{}_{}", micros, std::process::id(), counter))
    }

    /// Wrap a directory name as an id.
    ///
    /// Accepts any valid UTF-8 name: jobs placed by hand carry whatever name
    /// the operator chose, and the scheduler runs them all the same.
    pub fn from_dir_name(name: &OsStr) -> Option<Self> {
        name.to_str().map(|s| JobId(s.to_string()))
    }

    /// Whether the id has the canonical `<micros>_<pid>_<counter>` shape.
    pub fn is_canonical(&self) -> bool {
        let mut fields = 0;
        for part in self.0.split('_') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            fields += 1;
        }
        fields == 3
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// A job as seen through the reader facade.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Result text (done), error text (failed), empty otherwise.
    pub content: String,
    /// Last modification of the state directory, terminal states only;
    /// in-flight states carry the probe time.
    pub timestamp: SystemTime,
}
