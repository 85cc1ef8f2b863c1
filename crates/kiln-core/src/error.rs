//! Error kinds shared across the submit and daemon surfaces.

use std::path::PathBuf;

/// Failure to materialize or validate the workspace skeleton.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to probe {}: {source}", .path.display())]
    Probe {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(
        "workspace spans filesystems ({} and {} differ); directory rename would not be atomic",
        .first.display(),
        .second.display()
    )]
    DeviceMismatch { first: PathBuf, second: PathBuf },
}

/// Submit-time rejection.
///
/// Validation variants never touch the filesystem; `Io` means staging
/// started and was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    InvalidContent(String),
    #[error("{0}")]
    InvalidSize(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl SubmitError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SubmitError::Io {
            context: context.into(),
            source,
        }
    }
}
