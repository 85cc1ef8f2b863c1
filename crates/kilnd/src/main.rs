//! kilnd — the kiln inference daemon.
//!
//! Watches a workspace directory for published jobs and runs them against a
//! local model with a fixed pool of workers. Submissions and results travel
//! entirely through the workspace; see `kiln-ctl` for the client side.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use kiln_core::config::KilnConfig;
use kiln_core::WorkspaceLayout;
use kiln_engine::{LlamaBackend, Server};

#[derive(Parser)]
#[command(name = "kilnd", version, about = "kiln inference daemon")]
struct Args {
    /// Path to the GGUF model file.
    model: PathBuf,

    /// Workspace directory (created if missing).
    workspace: PathBuf,

    /// Worker threads.
    #[arg(value_parser = clap::value_parser!(u8).range(1..=64))]
    workers: Option<u8>,

    /// Multimodal projector file; enables the vision path.
    #[arg(long)]
    mmproj: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kilnd=info,kiln_engine=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = KilnConfig::load().context("failed to load configuration")?;
    if let Some(workers) = args.workers {
        config.scheduler.workers = workers as usize;
    }

    tracing::info!(
        model = %args.model.display(),
        workspace = %args.workspace.display(),
        workers = config.scheduler.workers,
        vision = args.mmproj.is_some(),
        "kilnd starting"
    );

    let backend = LlamaBackend::new(&args.model, args.mmproj.clone(), config.engine.clone())
        .context("failed to initialize inference backend")?;

    let layout = WorkspaceLayout::new(&args.workspace);
    let mut server = Server::new(layout, config, Box::new(backend));
    server.start().context("failed to start server")?;

    // SIGINT/SIGTERM set a flag; the loop below notices within 100 ms.
    let term = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, term.clone())
            .context("failed to register signal handler")?;
    }

    tracing::info!(workspace = %args.workspace.display(), "listening for jobs");

    while !term.load(Ordering::Relaxed) && server.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("shutdown requested");
    server.shutdown();
    tracing::info!("kilnd stopped");
    Ok(())
}
