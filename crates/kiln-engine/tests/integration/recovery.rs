//! Daemon-restart recovery: jobs stranded in processing/ get re-queued and
//! then run normally.

use std::fs;

use kiln_core::layout::PROMPT_FILE;
use kiln_core::{JobId, JobStatus};
use kiln_engine::Reader;

use crate::{start_server, wait_until, workspace, JOB_DEADLINE};

#[test]
fn stale_processing_job_is_requeued_and_completes() {
    let ws = workspace();

    // A previous daemon died mid-inference: the job sits in processing/.
    let stale = ws.layout.processing().join("stale");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join(PROMPT_FILE), "resurrect me").unwrap();

    let mut server = start_server(&ws);
    let reader = Reader::new(ws.layout.clone());
    let id = JobId::from("stale");

    assert!(wait_until(JOB_DEADLINE, || reader.status(&id) == JobStatus::Done));
    assert_eq!(reader.get(&id).unwrap().content, "resurrect me");
    assert_eq!(fs::read_dir(ws.layout.processing()).unwrap().count(), 0);

    server.shutdown();
}

#[test]
fn restart_after_shutdown_recovers_interrupted_work() {
    let ws = workspace();

    // First daemon run: nothing to do.
    let mut server = start_server(&ws);
    server.shutdown();

    // Simulate a crash between claim and finalization.
    let orphan = ws.layout.processing().join("1_1_0");
    fs::create_dir_all(&orphan).unwrap();
    fs::write(orphan.join(PROMPT_FILE), "second life").unwrap();

    // Second daemon run picks it up.
    let mut server = start_server(&ws);
    let reader = Reader::new(ws.layout.clone());
    let id = JobId::from("1_1_0");

    assert!(wait_until(JOB_DEADLINE, || reader.status(&id) == JobStatus::Done));
    assert_eq!(reader.get(&id).unwrap().content, "second life");

    server.shutdown();
}
