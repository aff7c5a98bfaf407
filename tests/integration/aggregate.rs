//! What the dashboard reads back for each slot.

use std::io::Write;

use hive::aggregate::{LogTail, DEFAULT_TAIL_LINES};
use hive::lifecycle::WorkerOp;
use hive::render::WorkerView;
use hive::status::{StatusStore, StatusUpdate, WorkerState};

use crate::fixtures::TestHive;

#[test]
fn test_idle_slot_without_status() {
    let hive = TestHive::new(4);
    let info = hive.aggregator().poll_slot(hive.slot(3));

    assert_eq!(info.session, "hive-proj-worker-3");
    assert!(!info.running);
    assert!(info.status.is_none());
    // No worktree yet, so the slot would share the project root.
    assert_eq!(info.worktree, hive.repo.path);
}

#[test]
fn test_running_slot_with_lenient_status() {
    let hive = TestHive::new(2);
    let slot = hive.slot(1);
    hive.manager().start(slot);
    hive.write_raw_status(
        slot,
        r#"{"status":"coding","branch":"feature/x","percent":150,"extra":1}"#,
    );

    let infos = hive.aggregator().poll();
    assert_eq!(infos.len(), 2);
    let info = &infos[0];
    assert!(info.running);
    assert!(info.worktree.ends_with("worker-1"));

    let view = WorkerView::from_info(info, false);
    assert_eq!(view.state, Some(WorkerState::Coding));
    assert_eq!(view.branch.as_deref(), Some("feature/x"));
    assert_eq!(view.percent, Some(100));
    assert!(!infos[1].running);
}

#[test]
fn test_status_is_hidden_once_worker_dies() {
    let hive = TestHive::new(2);
    let slot = hive.slot(2);
    let manager = hive.manager();
    manager.start(slot);

    let store = StatusStore::for_project(&hive.paths);
    store
        .report(
            slot,
            StatusUpdate {
                status: Some(WorkerState::Testing),
                percent: Some(40.0),
                ..StatusUpdate::default()
            },
        )
        .unwrap();

    let mut aggregator = hive.aggregator();
    assert!(aggregator.poll_slot(slot).live_status().is_some());

    assert_eq!(manager.apply(WorkerOp::Kill, slot).to_string(), "killed");
    let info = aggregator.poll_slot(slot);
    assert!(!info.running);
    assert!(info.status.is_some(), "document is left on disk");
    assert!(info.live_status().is_none());
    let view = WorkerView::from_info(&info, false);
    assert_eq!(view.state, None);
    assert_eq!(view.percent, None);
}

#[test]
fn test_start_resets_previous_status_and_log() {
    let hive = TestHive::new(1);
    let slot = hive.slot(1);
    hive.write_raw_status(slot, r#"{"status":"approved"}"#);
    std::fs::create_dir_all(hive.paths.logs_dir()).unwrap();
    std::fs::write(hive.paths.log_file(slot), "old run\n").unwrap();

    hive.manager().start(slot);

    assert!(hive.aggregator().poll_slot(slot).status.is_none());
    let mut tail = LogTail::new(hive.paths.log_file(slot), DEFAULT_TAIL_LINES);
    tail.poll();
    assert!(tail.is_empty());
}

#[test]
fn test_log_tail_follows_appends() {
    let hive = TestHive::new(1);
    let slot = hive.slot(1);
    hive.manager().start(slot);

    let log = hive.paths.log_file(slot);
    let mut tail = LogTail::new(log.clone(), 3);
    assert!(!tail.poll());

    let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
    write!(file, "one\ntwo\nthree\nfour\nfi").unwrap();
    assert!(tail.poll());
    assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["two", "three", "four"]);

    write!(file, "ve\n").unwrap();
    assert!(tail.poll());
    assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["three", "four", "five"]);
}
