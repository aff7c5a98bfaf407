//! Worker lifecycle against real git worktrees.

use hive::lifecycle::{Outcome, WorkerOp};
use hive::worktree::WorktreeKind;

use crate::fixtures::TestHive;

/// Given a fresh project
/// When every slot is started twice
/// Then each slot gets its own worktree once and the second round is a no-op
#[test]
fn test_up_all_is_idempotent_with_isolated_worktrees() {
    let hive = TestHive::new(4);
    let manager = hive.manager();

    let first = manager.apply_all(WorkerOp::Start);
    assert_eq!(first.to_string(), "4/4");
    for (slot, outcome) in &first.outcomes {
        match outcome {
            Outcome::Started { worktree, degraded } => {
                assert_eq!(worktree.kind, WorktreeKind::Created, "slot {}", slot);
                assert!(degraded.is_empty(), "slot {}: {:?}", slot, degraded);
                assert!(worktree.path.join("README.md").exists());
                assert!(worktree.path.ends_with(format!("worker-{}", slot)));
            }
            other => panic!("slot {}: expected Started, got {}", slot, other),
        }
        assert!(hive.repo.branch_exists(&format!("worker-{}-workspace", slot)));
        assert!(manager.registry().exists(*slot));
    }

    let second = manager.apply_all(WorkerOp::Start);
    assert!(second
        .outcomes
        .iter()
        .all(|(_, o)| *o == Outcome::AlreadyRunning));
    assert_eq!(hive.host.count("create_session"), 4);
}

/// Given a task document naming a branch
/// When the slot starts
/// Then its worktree is on that branch and the agent is pointed at the task
#[test]
fn test_task_document_drives_branch_and_prompt() {
    let hive = TestHive::new(2);
    let slot = hive.slot(1);
    std::fs::create_dir_all(hive.paths.tasks_dir()).unwrap();
    std::fs::write(
        hive.paths.task_file(slot),
        "---\nbranch: feature/login\non_complete: review\n---\nAdd a login form.\n",
    )
    .unwrap();

    let outcome = hive.manager().start(slot);
    assert!(matches!(outcome, Outcome::Started { .. }));
    assert!(hive.repo.branch_exists("feature/login"));
    assert!(!hive.repo.branch_exists("worker-1-workspace"));

    let launch = hive
        .host
        .sent_keys()
        .into_iter()
        .find(|(target, _)| target == "=hive-proj-worker-1:")
        .map(|(_, keys)| keys)
        .expect("launch line sent");
    assert!(launch.contains("HIVE_SLOT=1"));
    assert!(launch.contains("Read your task in"));
    assert!(launch.contains("worker-1.md"));
}

/// Given every slot running
/// When all are killed and one restarted
/// Then kill is idempotent and restart of a stopped slot behaves like start
#[test]
fn test_kill_all_then_restart_one() {
    let hive = TestHive::new(3);
    let manager = hive.manager();
    manager.apply_all(WorkerOp::Start);

    let killed = manager.apply_all(WorkerOp::Kill);
    assert!(killed.all_succeeded());
    assert!(killed.outcomes.iter().all(|(_, o)| *o == Outcome::Killed));
    assert!(hive.host.sessions().is_empty());

    let again = manager.apply_all(WorkerOp::Kill);
    assert!(again.outcomes.iter().all(|(_, o)| *o == Outcome::AlreadyGone));

    let slot = hive.slot(2);
    match manager.restart(slot) {
        Outcome::Started { worktree, .. } => assert_eq!(worktree.kind, WorktreeKind::Existing),
        other => panic!("expected Started, got {}", other),
    }
    assert_eq!(hive.host.sessions(), vec!["hive-proj-worker-2".to_string()]);
}

/// Given a running slot whose name lingers after kill
/// When it is restarted
/// Then restart waits for the name to clear before starting again
#[test]
fn test_restart_running_worker() {
    let hive = TestHive::new(2);
    let manager = hive.manager();
    let slot = hive.slot(1);
    manager.start(slot);
    hive.host.linger_after_kill(5);

    assert!(matches!(manager.restart(slot), Outcome::Started { .. }));
    assert_eq!(hive.host.count("kill_session hive-proj-worker-1"), 1);
    assert_eq!(hive.host.count("create_session hive-proj-worker-1"), 2);
}

/// Given a slot with a worktree
/// When it is cleaned up
/// Then its session and worktree are gone, its branch is kept, and start recreates it
#[test]
fn test_cleanup_then_start_recreates_worktree() {
    let hive = TestHive::new(2);
    let manager = hive.manager();
    let slot = hive.slot(2);
    manager.start(slot);

    assert_eq!(manager.cleanup(slot), Outcome::Cleaned);
    assert!(!manager.registry().exists(slot));
    assert!(!hive
        .paths
        .worktree_base()
        .join("worker-2")
        .exists());
    assert!(hive.repo.branch_exists("worker-2-workspace"));
    assert_eq!(manager.cleanup(slot), Outcome::NothingToClean);

    match manager.start(slot) {
        Outcome::Started { worktree, .. } => assert_eq!(worktree.kind, WorktreeKind::Created),
        other => panic!("expected Started, got {}", other),
    }
}
