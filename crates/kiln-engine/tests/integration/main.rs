//! kiln integration test harness.
//!
//! Tests here run a real server (scanner thread + worker pool) against a
//! temporary workspace, with a deterministic in-process backend standing in
//! for the model. The backend echoes prompts, so result contents are
//! checkable, and fails on the magic prompt "BAD" so the failure path is
//! reachable on demand.
//!
//! Timing: the scan interval is 1 s in tests; anything asserted as
//! "eventually" polls with a generous deadline rather than sleeping a fixed
//! amount.

mod reader;
mod recovery;
mod scheduler;
mod submit;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use kiln_core::config::KilnConfig;
use kiln_core::WorkspaceLayout;
use kiln_engine::backend::{Backend, BackendError, Context};
use kiln_engine::Server;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct TestWorkspace {
    // Held for its Drop; the path lives as long as the workspace.
    _dir: tempfile::TempDir,
    pub layout: WorkspaceLayout,
}

pub fn workspace() -> TestWorkspace {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = WorkspaceLayout::new(dir.path());
    layout.ensure().expect("workspace skeleton");
    TestWorkspace { _dir: dir, layout }
}

pub fn test_config() -> KilnConfig {
    let mut config = KilnConfig::default();
    config.scheduler.workers = 2;
    config.scheduler.scan_interval_secs = 1;
    config
}

/// Start a server over the workspace with the deterministic echo backend.
pub fn start_server(ws: &TestWorkspace) -> Server {
    let mut server = Server::new(ws.layout.clone(), test_config(), Box::new(EchoBackend));
    server.start().expect("server start");
    server
}

/// Poll until `cond` holds or the deadline passes. Returns the final value.
pub fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    cond()
}

/// Generous deadline for one job to travel submit -> terminal.
pub const JOB_DEADLINE: Duration = Duration::from_secs(30);

// ── Deterministic backend ─────────────────────────────────────────────────────

/// Echoes its input. The prompt "BAD" fails with a fixed model error.
pub struct EchoBackend;

struct EchoContext;

impl Backend for EchoBackend {
    fn create_context(&self, _worker_id: usize) -> Result<Box<dyn Context>, BackendError> {
        Ok(Box::new(EchoContext))
    }
}

impl Context for EchoContext {
    fn run_text(&mut self, prompt: &str) -> Result<String, BackendError> {
        if prompt == "BAD" {
            return Err(BackendError::Model("model ran out of context".to_string()));
        }
        Ok(prompt.to_string())
    }

    fn run_vision(&mut self, prompt: &str, images: &[PathBuf]) -> Result<String, BackendError> {
        Ok(format!("{prompt}+{}", images.len()))
    }

    fn embed(&mut self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(vec![0.5, -0.25])
    }
}

// ── Harness smoke test ────────────────────────────────────────────────────────

#[test]
fn harness_workspace_has_full_skeleton() {
    let ws = workspace();
    assert!(ws.layout.writing().is_dir());
    assert!(ws.layout.ready().is_dir());
    assert!(ws.layout.processing().is_dir());
    assert!(ws.layout.output().is_dir());
    assert!(ws.layout.failed().is_dir());
}
