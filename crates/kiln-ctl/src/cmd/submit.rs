//! Job submission command.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Args;

use kiln_core::config::KilnConfig;
use kiln_core::{JobKind, WorkspaceLayout};
use kiln_engine::Submitter;

#[derive(Args)]
pub struct SubmitArgs {
    /// Workspace directory (created if missing).
    workspace: PathBuf,

    /// Prompt text; multiple words are joined. Use `-` (or pipe stdin) to
    /// read the prompt from stdin.
    #[arg(value_name = "PROMPT")]
    prompt: Vec<String>,

    /// Attach an image (repeatable; implies a vision job).
    #[arg(short = 'i', long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Submit as an embedding job.
    #[arg(long)]
    embed: bool,
}

pub fn run(args: SubmitArgs) -> Result<ExitCode> {
    let prompt = read_prompt(&args.prompt)?;
    if prompt.is_empty() {
        bail!("empty prompt");
    }

    let kind = if args.embed {
        JobKind::Embed
    } else if !args.images.is_empty() {
        JobKind::Vision
    } else {
        JobKind::Text
    };

    let config = KilnConfig::load().context("failed to load configuration")?;
    let submitter = Submitter::new(WorkspaceLayout::new(&args.workspace), config.limits)
        .context("failed to open workspace")?;
    let id = submitter.submit(&prompt, kind, &args.images)?;

    // Just the id, clean for piping.
    println!("{id}");
    Ok(ExitCode::SUCCESS)
}

fn read_prompt(words: &[String]) -> Result<String> {
    let from_stdin = match words {
        [] => !std::io::stdin().is_terminal(),
        [only] => only == "-",
        _ => false,
    };

    if from_stdin {
        let mut prompt = String::new();
        std::io::stdin()
            .read_to_string(&mut prompt)
            .context("failed to read prompt from stdin")?;
        // A single trailing newline is shell noise, not prompt content.
        if prompt.ends_with('\n') {
            prompt.pop();
        }
        Ok(prompt)
    } else {
        Ok(words.join(" "))
    }
}
