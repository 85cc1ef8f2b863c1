//! Concurrent submission properties: distinct ids, atomic publication,
//! nothing left behind in staging.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use kiln_core::config::LimitsConfig;
use kiln_core::layout::PROMPT_FILE;
use kiln_core::JobKind;
use kiln_engine::Submitter;

use crate::workspace;

#[test]
fn concurrent_submitters_produce_distinct_complete_jobs() {
    let ws = workspace();
    let submitter = Arc::new(
        Submitter::new(ws.layout.clone(), LimitsConfig::default()).expect("submitter"),
    );

    let handles: Vec<_> = (0..3)
        .map(|t| {
            let submitter = submitter.clone();
            std::thread::spawn(move || {
                (0..100)
                    .map(|i| {
                        submitter
                            .submit(&format!("prompt {t}-{i}"), JobKind::Text, &[])
                            .expect("submit")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("submitter thread") {
            assert!(ids.insert(id), "duplicate id issued");
        }
    }
    assert_eq!(ids.len(), 300);

    // Every job is published and well-formed; staging is empty.
    let ready: Vec<_> = fs::read_dir(ws.layout.ready()).unwrap().flatten().collect();
    assert_eq!(ready.len(), 300);
    for entry in ready {
        let prompt = entry.path().join(PROMPT_FILE);
        let meta = fs::metadata(&prompt).expect("published job must carry prompt.txt");
        assert!(meta.len() > 0, "published prompt.txt must be non-empty");
    }
    assert_eq!(fs::read_dir(ws.layout.writing()).unwrap().count(), 0);
}

#[test]
fn failed_validation_leaves_no_trace() {
    let ws = workspace();
    let submitter = Submitter::new(ws.layout.clone(), LimitsConfig::default()).expect("submitter");

    assert!(submitter.submit("", JobKind::Text, &[]).is_err());
    let missing = ws.layout.root().join("nope.png");
    assert!(submitter.submit("look", JobKind::Vision, &[missing]).is_err());

    assert_eq!(fs::read_dir(ws.layout.writing()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(ws.layout.ready()).unwrap().count(), 0);
}
