//! Startup recovery of orphaned jobs.
//!
//! A job left under `processing/` means a previous daemon died mid-run.
//! Before the scanner starts, every such directory is renamed back into
//! `input/ready/` so the job gets claimed again. A rename that cannot go
//! back (a name collision in ready/) moves the job to `failed/` instead,
//! with a note in `error.txt`. Runs once per start, single-threaded.

use std::fs;

use kiln_core::layout::ERROR_FILE;
use kiln_core::WorkspaceLayout;

/// Re-queue orphans. Returns how many jobs went back to ready.
pub fn recover(layout: &WorkspaceLayout) -> usize {
    let processing = layout.processing();
    let entries = match fs::read_dir(&processing) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %processing.display(), error = %e, "cannot enumerate processing directory");
            return 0;
        }
    };

    let mut recovered = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        tracing::warn!(job = %name, "recovering orphaned job");

        let ready = layout.ready().join(name.as_ref());
        match fs::rename(&path, &ready) {
            Ok(()) => recovered += 1,
            Err(e) => {
                tracing::error!(job = %name, error = %e, "failed to re-queue orphan, moving to failed");
                let note = format!("orphan recovery failed: {e}");
                if let Err(e) = fs::write(path.join(ERROR_FILE), note) {
                    tracing::warn!(job = %name, error = %e, "failed to write recovery error file");
                }
                if let Err(e) = fs::rename(&path, layout.failed().join(name.as_ref())) {
                    tracing::error!(job = %name, error = %e, "failed to move orphan to failed");
                }
            }
        }
    }

    if recovered > 0 {
        tracing::info!(count = recovered, "recovered orphaned jobs");
    }
    recovered
}
