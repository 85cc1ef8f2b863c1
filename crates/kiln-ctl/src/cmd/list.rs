//! Listing of recently finished jobs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use kiln_core::{Job, JobStatus, WorkspaceLayout};
use kiln_engine::Reader;

#[derive(Args)]
pub struct ListArgs {
    /// Workspace directory.
    workspace: PathBuf,

    /// Maximum number of jobs to show.
    #[arg(long, default_value_t = 10)]
    max: usize,

    /// Machine-readable output.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct JobJson<'a> {
    id: &'a str,
    status: JobStatus,
    finished_unix_ms: u64,
}

pub fn run(args: ListArgs) -> Result<ExitCode> {
    let reader = Reader::new(WorkspaceLayout::new(&args.workspace));
    let jobs = reader.list(args.max);

    if args.json {
        let rows: Vec<JobJson> = jobs
            .iter()
            .map(|job| JobJson {
                id: job.id.as_str(),
                status: job.status,
                finished_unix_ms: unix_ms(job.timestamp),
            })
            .collect();
        println!("{}", serde_json::to_string(&rows)?);
        return Ok(ExitCode::SUCCESS);
    }

    if jobs.is_empty() {
        println!("No finished jobs.");
        return Ok(ExitCode::SUCCESS);
    }

    for job in &jobs {
        println!("  {}  {:7}  {}", job.id, job.status.as_str(), age(job));
    }
    Ok(ExitCode::SUCCESS)
}

fn unix_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn age(job: &Job) -> String {
    let elapsed = match job.timestamp.elapsed() {
        Ok(elapsed) => elapsed,
        Err(_) => return "just now".to_string(),
    };
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
