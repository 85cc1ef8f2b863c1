//! Reader behavior against a live daemon: status progression, prompt
//! retrieval across states, and listing order.

use kiln_core::config::LimitsConfig;
use kiln_core::{JobKind, JobStatus};
use kiln_engine::{Reader, Submitter};

use crate::{start_server, wait_until, workspace, JOB_DEADLINE};

#[test]
fn status_progresses_monotonically_to_done() {
    let ws = workspace();
    let mut server = start_server(&ws);

    let submitter = Submitter::new(ws.layout.clone(), LimitsConfig::default()).unwrap();
    let reader = Reader::new(ws.layout.clone());
    let id = submitter.submit("watch me", JobKind::Text, &[]).unwrap();

    // Sample the status until terminal and check the DAG order:
    // queued and running may repeat or be skipped, but never recur after
    // a later state was seen.
    let mut observed = Vec::new();
    assert!(wait_until(JOB_DEADLINE, || {
        let status = reader.status(&id);
        if observed.last() != Some(&status) {
            observed.push(status);
        }
        status == JobStatus::Done
    }));

    fn rank(status: &JobStatus) -> u8 {
        match status {
            JobStatus::Missing => 0,
            JobStatus::Queued => 1,
            JobStatus::Running => 2,
            JobStatus::Done | JobStatus::Failed => 3,
        }
    }
    let ranks: Vec<u8> = observed.iter().map(rank).collect();
    let mut sorted = ranks.clone();
    sorted.sort();
    assert_eq!(ranks, sorted, "status regressed: {observed:?}");

    // Terminal state is stable.
    assert_eq!(reader.status(&id), JobStatus::Done);
    assert_eq!(reader.status(&id), JobStatus::Done);

    server.shutdown();
}

#[test]
fn prompt_is_retrievable_through_the_whole_lifecycle() {
    let ws = workspace();
    let mut server = start_server(&ws);

    let submitter = Submitter::new(ws.layout.clone(), LimitsConfig::default()).unwrap();
    let reader = Reader::new(ws.layout.clone());
    let id = submitter.submit("the original prompt", JobKind::Text, &[]).unwrap();

    // Whatever state the job is in right now, the prompt is reachable.
    assert_eq!(reader.prompt(&id).unwrap(), "the original prompt");
    assert!(wait_until(JOB_DEADLINE, || reader.status(&id) == JobStatus::Done));
    assert_eq!(reader.prompt(&id).unwrap(), "the original prompt");

    server.shutdown();
}

#[test]
fn list_and_latest_track_finished_jobs() {
    let ws = workspace();
    let mut server = start_server(&ws);

    let submitter = Submitter::new(ws.layout.clone(), LimitsConfig::default()).unwrap();
    let reader = Reader::new(ws.layout.clone());

    let first = submitter.submit("first", JobKind::Text, &[]).unwrap();
    assert!(wait_until(JOB_DEADLINE, || reader.status(&first) == JobStatus::Done));
    std::thread::sleep(std::time::Duration::from_millis(20));
    let second = submitter.submit("BAD", JobKind::Text, &[]).unwrap();
    assert!(wait_until(JOB_DEADLINE, || reader.status(&second) == JobStatus::Failed));

    let jobs = reader.list(10);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, second);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[1].id, first);

    let latest = reader.latest().unwrap();
    assert_eq!(latest.id, second);

    server.shutdown();
}
