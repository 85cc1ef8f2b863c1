//! Result retrieval command.
//!
//! Exit codes: 0 result printed, 1 failed or not found, 2 not ready yet
//! (suppressed by `--wait`, which polls until the job is terminal).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use kiln_core::{JobId, JobStatus, WorkspaceLayout};
use kiln_engine::Reader;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Args)]
pub struct GetArgs {
    /// Workspace directory.
    workspace: PathBuf,

    /// Job id; omit for the most recently finished job.
    id: Option<String>,

    /// Poll until the job reaches a terminal state.
    #[arg(short = 'w', long)]
    wait: bool,
}

pub fn run(args: GetArgs) -> Result<ExitCode> {
    let reader = Reader::new(WorkspaceLayout::new(&args.workspace));

    match &args.id {
        Some(id) => get_job(&reader, &JobId::from(id.as_str()), args.wait),
        None => get_latest(&reader, args.wait),
    }
}

fn get_job(reader: &Reader, id: &JobId, wait: bool) -> Result<ExitCode> {
    loop {
        match reader.status(id) {
            JobStatus::Done => match reader.get(id) {
                Some(job) => {
                    println!("{}", job.content);
                    return Ok(ExitCode::SUCCESS);
                }
                // A done directory without a readable result means the
                // operator removed it; retrying cannot help.
                None if !wait => {
                    eprintln!("Job not found: {id}");
                    return Ok(ExitCode::FAILURE);
                }
                None => {}
            },
            JobStatus::Failed => {
                eprintln!("Job failed: {id}");
                if let Some(error) = reader.error(id) {
                    if !error.is_empty() {
                        eprintln!("Error: {error}");
                    }
                }
                return Ok(ExitCode::FAILURE);
            }
            JobStatus::Missing if !wait => {
                eprintln!("Job not found: {id}");
                return Ok(ExitCode::FAILURE);
            }
            status if !wait => {
                eprintln!("Job not ready: {id} (status: {status})");
                return Ok(ExitCode::from(2));
            }
            _ => {}
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn get_latest(reader: &Reader, wait: bool) -> Result<ExitCode> {
    loop {
        // list() leaves content empty; fetch the full job for its content.
        match reader.latest().and_then(|job| reader.get(&job.id)) {
            Some(job) if job.status == JobStatus::Done => {
                println!("{}", job.content);
                return Ok(ExitCode::SUCCESS);
            }
            Some(job) => {
                eprintln!("Latest job failed: {}", job.id);
                if !job.content.is_empty() {
                    eprintln!("Error: {}", job.content);
                }
                return Ok(ExitCode::FAILURE);
            }
            None if !wait => {
                eprintln!("No jobs found");
                return Ok(ExitCode::FAILURE);
            }
            None => {}
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
