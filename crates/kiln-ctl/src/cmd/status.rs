//! Status command: one job's state, or workspace counters.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use kiln_core::{JobId, JobStatus, WorkspaceLayout};
use kiln_engine::Reader;

#[derive(Args)]
pub struct StatusArgs {
    /// Workspace directory.
    workspace: PathBuf,

    /// Job id; omit for workspace counters.
    id: Option<String>,

    /// Machine-readable output.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct JobStatusJson<'a> {
    id: &'a str,
    status: JobStatus,
}

#[derive(Serialize)]
struct CountsJson {
    queued: usize,
    processing: usize,
    done: usize,
    failed: usize,
}

pub fn run(args: StatusArgs) -> Result<ExitCode> {
    let reader = Reader::new(WorkspaceLayout::new(&args.workspace));

    if let Some(id) = &args.id {
        let id = JobId::from(id.as_str());
        let status = reader.status(&id);
        if args.json {
            let line = serde_json::to_string(&JobStatusJson {
                id: id.as_str(),
                status,
            })?;
            println!("{line}");
        } else {
            println!("{status}");
        }
        return Ok(if status == JobStatus::Missing {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let counts = reader.counts();
    if args.json {
        let line = serde_json::to_string(&CountsJson {
            queued: counts.queued,
            processing: counts.processing,
            done: counts.done,
            failed: counts.failed,
        })?;
        println!("{line}");
    } else {
        println!("═══════════════════════════════════════");
        println!("  Workspace: {}", args.workspace.display());
        println!("═══════════════════════════════════════");
        println!("  Queued     : {}", counts.queued);
        println!("  Processing : {}", counts.processing);
        println!("  Done       : {}", counts.done);
        println!("  Failed     : {}", counts.failed);
    }
    Ok(ExitCode::SUCCESS)
}
