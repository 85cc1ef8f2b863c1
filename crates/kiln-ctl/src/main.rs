//! kiln-ctl — command-line client for a kiln workspace.
//!
//! Talks to the daemon only through the workspace directory: `submit`
//! publishes a job, `get` / `status` / `list` read state. Exit codes are
//! stable for scripting: 0 success, 1 error, 2 job-not-ready (`get` only).

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod cmd;

#[derive(Parser)]
#[command(name = "kiln-ctl", version, about = "kiln workspace client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a prompt as a new job; prints the job id.
    Submit(cmd::submit::SubmitArgs),
    /// Print a job's result (or the latest result).
    Get(cmd::get::GetArgs),
    /// Show a job's status, or workspace counters.
    Status(cmd::status::StatusArgs),
    /// List recently finished jobs.
    List(cmd::list::ListArgs),
}

fn main() -> ExitCode {
    // Quiet by default so stdout stays clean for piping; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Submit(args) => cmd::submit::run(args),
        Command::Get(args) => cmd::get::run(args),
        Command::Status(args) => cmd::status::run(args),
        Command::List(args) => cmd::list::run(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
