//! Worker Lifecycle Manager: start, stop, kill and restart per slot.
//!
//! Every operation runs to completion on the calling thread and folds host
//! failures into an [`Outcome`]. Nothing here returns `Err` for a host call;
//! the caller decides what to print.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::agent::Agent;
use crate::paths::HivePaths;
use crate::session::{SessionRegistry, SlotId};
use crate::status::StatusStore;
use crate::task::TaskDoc;
use crate::tmux::{exact, pane_target, Geometry};
use crate::worktree::{Worktree, WorktreeKind, WorktreeProvisioner};
use crate::{hlog, hlog_debug, hlog_error, hlog_warn};

/// Size given to detached worker sessions until a client attaches.
pub const WORKER_GEOMETRY: Geometry = Geometry {
    width: 200,
    height: 50,
};

/// Per-session options applied after creation. Failures are ignored.
const BASELINE_OPTIONS: [(&str, &str); 3] = [
    ("mouse", "on"),
    ("history-limit", "50000"),
    ("remain-on-exit", "off"),
];

/// Where a slot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Starting,
    Running,
    /// Exit requested; the session has not gone away yet.
    Stopping,
    /// Killed by a restart that has not started the new session yet.
    KilledPendingRestart,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotState::Absent => "absent",
            SlotState::Starting => "starting",
            SlotState::Running => "running",
            SlotState::Stopping => "stopping",
            SlotState::KilledPendingRestart => "killed-pending-restart",
        };
        f.write_str(s)
    }
}

/// Result of one lifecycle operation on one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The session exists. `degraded` lists steps after creation that failed.
    Started {
        worktree: Worktree,
        degraded: Vec<String>,
    },
    AlreadyRunning,
    StopRequested,
    NotRunning,
    Killed,
    AlreadyGone,
    /// The host kept the session name after a kill.
    TimedOut(Duration),
    Cleaned,
    NothingToClean,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_) | Outcome::TimedOut(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Started { worktree, degraded } => {
                write!(f, "started in {}", worktree.path.display())?;
                if !degraded.is_empty() {
                    write!(f, " (degraded: {})", degraded.join("; "))?;
                }
                Ok(())
            }
            Outcome::AlreadyRunning => f.write_str("already running"),
            Outcome::StopRequested => f.write_str("stop requested"),
            Outcome::NotRunning => f.write_str("not running"),
            Outcome::Killed => f.write_str("killed"),
            Outcome::AlreadyGone => f.write_str("already gone"),
            Outcome::TimedOut(d) => write!(
                f,
                "session still present {:.1}s after kill; not restarted",
                d.as_secs_f64()
            ),
            Outcome::Cleaned => f.write_str("worktree removed"),
            Outcome::NothingToClean => f.write_str("no worktree"),
            Outcome::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// A lifecycle operation that can be requested from the CLI or dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOp {
    Start,
    Stop,
    Kill,
    Restart,
    Cleanup,
}

impl fmt::Display for WorkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerOp::Start => "start",
            WorkerOp::Stop => "stop",
            WorkerOp::Kill => "kill",
            WorkerOp::Restart => "restart",
            WorkerOp::Cleanup => "cleanup",
        })
    }
}

/// Outcomes of one operation applied to every slot.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub outcomes: Vec<(SlotId, Outcome)>,
}

impl BulkReport {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.successes() == self.total()
    }
}

impl fmt::Display for BulkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.successes(), self.total())
    }
}

/// How long a restart waits for the host to release a killed session name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct WorkerManager {
    registry: SessionRegistry,
    provisioner: WorktreeProvisioner,
    store: StatusStore,
    paths: HivePaths,
    agent: Agent,
    workers: u8,
    policy: RestartPolicy,
    transient: Mutex<HashMap<SlotId, SlotState>>,
}

impl WorkerManager {
    pub fn new(
        registry: SessionRegistry,
        provisioner: WorktreeProvisioner,
        paths: HivePaths,
        agent: Agent,
        workers: u8,
    ) -> Self {
        Self {
            store: StatusStore::for_project(&paths),
            registry,
            provisioner,
            paths,
            agent,
            workers,
            policy: RestartPolicy::default(),
            transient: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn paths(&self) -> &HivePaths {
        &self.paths
    }

    pub fn workers(&self) -> u8 {
        self.workers
    }

    pub fn slots(&self) -> impl Iterator<Item = SlotId> {
        SlotId::all(self.workers)
    }

    pub fn slot(&self, n: u8) -> crate::Result<SlotId> {
        SlotId::new(n, self.workers)
    }

    /// Current state, derived from the host plus any operation in flight.
    pub fn state(&self, slot: SlotId) -> SlotState {
        let live = self.registry.exists(slot);
        let mut transient = self.lock_transient();
        match (transient.get(&slot).copied(), live) {
            (Some(SlotState::Stopping), true) => SlotState::Stopping,
            (Some(SlotState::Stopping), false) => {
                transient.remove(&slot);
                SlotState::Absent
            }
            (Some(state), _) => state,
            (None, true) => SlotState::Running,
            (None, false) => SlotState::Absent,
        }
    }

    pub fn start(&self, slot: SlotId) -> Outcome {
        if self.registry.exists(slot) {
            hlog_debug!("start slot {}: already running", slot);
            return Outcome::AlreadyRunning;
        }
        self.set_transient(slot, SlotState::Starting);
        let outcome = self.launch(slot);
        self.clear_transient(slot);
        match &outcome {
            Outcome::Started { degraded, .. } if degraded.is_empty() => {
                hlog!("Worker {} started", slot)
            }
            Outcome::Started { degraded, .. } => {
                hlog_warn!("Worker {} started degraded: {}", slot, degraded.join("; "))
            }
            Outcome::Failed(msg) => hlog_error!("Worker {} failed to start: {}", slot, msg),
            _ => {}
        }
        outcome
    }

    fn launch(&self, slot: SlotId) -> Outcome {
        let name = self.registry.name(slot);
        let host = self.registry.host();
        let task_path = self.paths.task_file(slot);
        let task = TaskDoc::load(&task_path);
        let branch_hint = task.as_ref().and_then(|t| t.branch.as_deref());

        let worktree = self.provisioner.ensure(
            self.paths.root(),
            self.paths.worktree_base(),
            slot,
            branch_hint,
        );
        let mut degraded = Vec::new();
        if worktree.kind == WorktreeKind::SharedRoot {
            degraded.push("sharing project root".to_string());
        }

        let log_path = self.paths.log_file(slot);
        if let Err(e) = fresh_log(&log_path) {
            return Outcome::Failed(format!("log {}: {}", log_path.display(), e));
        }
        if let Err(e) = self.store.reset(slot) {
            hlog_warn!("Could not reset status for slot {}: {}", slot, e);
            degraded.push(format!("status reset: {}", e));
        }

        if let Err(e) = host.create_session(&name, &worktree.path, Some(WORKER_GEOMETRY)) {
            return Outcome::Failed(e.to_string());
        }

        // The session exists from here on; later failures only degrade it.
        let pane = pane_target(&name);
        if let Err(e) = host.pipe_output(&pane, &log_path) {
            degraded.push(format!("output capture: {}", e));
        }
        for (option, value) in BASELINE_OPTIONS {
            if let Err(e) = host.set_option(Some(&exact(&name)), option, value) {
                hlog_debug!("Ignoring unsupported option {}: {}", option, e);
            }
        }

        let env = [
            ("HIVE_SLOT", slot.to_string()),
            (
                "HIVE_STATUS_FILE",
                self.store.path(slot).display().to_string(),
            ),
            ("HIVE_TASK_FILE", task_path.display().to_string()),
        ];
        let prompt = task.as_ref().map(|_| {
            format!(
                "Read your task in {} and report progress with `hive report`.",
                task_path.display()
            )
        });
        let line = self.agent.launch_line(&env, prompt.as_deref());
        if let Err(e) = host.send_keys(&pane, &line, true) {
            degraded.push(format!("agent launch: {}", e));
        }

        Outcome::Started { worktree, degraded }
    }

    /// Ask the agent to exit. Does not wait.
    pub fn stop(&self, slot: SlotId) -> Outcome {
        if !self.registry.exists(slot) {
            return Outcome::NotRunning;
        }
        let pane = pane_target(&self.registry.name(slot));
        match self
            .registry
            .host()
            .send_keys(&pane, self.agent.exit_sequence(), true)
        {
            Ok(()) => {
                self.set_transient(slot, SlotState::Stopping);
                hlog!("Worker {} asked to exit", slot);
                Outcome::StopRequested
            }
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn kill(&self, slot: SlotId) -> Outcome {
        if !self.registry.exists(slot) {
            self.clear_transient(slot);
            return Outcome::AlreadyGone;
        }
        match self.registry.host().kill_session(&self.registry.name(slot)) {
            Ok(()) => {
                self.clear_transient(slot);
                hlog!("Worker {} killed", slot);
                Outcome::Killed
            }
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    /// Kill, wait for the host to release the name, then start.
    pub fn restart(&self, slot: SlotId) -> Outcome {
        match self.kill(slot) {
            Outcome::Failed(msg) => return Outcome::Failed(msg),
            Outcome::AlreadyGone => return self.start(slot),
            _ => {}
        }
        self.set_transient(slot, SlotState::KilledPendingRestart);
        let started = Instant::now();
        while self.registry.exists(slot) {
            if started.elapsed() >= self.policy.timeout {
                self.clear_transient(slot);
                hlog_warn!(
                    "Worker {} session still present after {:?}",
                    slot,
                    self.policy.timeout
                );
                return Outcome::TimedOut(self.policy.timeout);
            }
            std::thread::sleep(self.policy.poll_interval);
        }
        self.clear_transient(slot);
        self.start(slot)
    }

    /// Kill the slot if running and remove its worktree.
    pub fn cleanup(&self, slot: SlotId) -> Outcome {
        if let Outcome::Failed(msg) = self.kill(slot) {
            return Outcome::Failed(msg);
        }
        match self
            .provisioner
            .cleanup(self.paths.root(), self.paths.worktree_base(), slot)
        {
            Ok(true) => Outcome::Cleaned,
            Ok(false) => Outcome::NothingToClean,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn apply(&self, op: WorkerOp, slot: SlotId) -> Outcome {
        match op {
            WorkerOp::Start => self.start(slot),
            WorkerOp::Stop => self.stop(slot),
            WorkerOp::Kill => self.kill(slot),
            WorkerOp::Restart => self.restart(slot),
            WorkerOp::Cleanup => self.cleanup(slot),
        }
    }

    /// Apply `op` to every slot in order.
    pub fn apply_all(&self, op: WorkerOp) -> BulkReport {
        BulkReport {
            outcomes: self
                .slots()
                .map(|slot| (slot, self.apply(op, slot)))
                .collect(),
        }
    }

    /// Hand the terminal to a worker session until the operator detaches.
    pub fn attach(&self, slot: SlotId) -> crate::Result<()> {
        if !self.registry.exists(slot) {
            return Err(crate::Error::Tmux(format!(
                "worker {} is not running",
                slot
            )));
        }
        self.registry.host().attach(&self.registry.name(slot))
    }

    fn lock_transient(&self) -> std::sync::MutexGuard<'_, HashMap<SlotId, SlotState>> {
        self.transient.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_transient(&self, slot: SlotId, state: SlotState) {
        self.lock_transient().insert(slot, state);
    }

    fn clear_transient(&self, slot: SlotId) {
        self.lock_transient().remove(&slot);
    }
}

/// Truncate or create the slot log so each run starts a fresh stream.
fn fresh_log(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProjectIdentity;
    use crate::status::{WorkerState, WorkerStatus};
    use crate::testing::{CountingWorktrees, FakeHost};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        host: Arc<FakeHost>,
        worktrees: Arc<CountingWorktrees>,
        manager: WorkerManager,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        let paths = HivePaths::new(&root).with_worktree_base(dir.path().join("wt"));
        let host = Arc::new(FakeHost::new());
        let worktrees = Arc::new(CountingWorktrees::new());
        let registry = SessionRegistry::new(host.clone(), ProjectIdentity::new("proj"));
        let manager = WorkerManager::new(
            registry,
            WorktreeProvisioner::new(worktrees.clone()),
            paths,
            Agent::default(),
            4,
        )
        .with_restart_policy(RestartPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        });
        Harness {
            _dir: dir,
            host,
            worktrees,
            manager,
        }
    }

    fn slot(n: u8) -> SlotId {
        SlotId::new(n, 4).unwrap()
    }

    #[test]
    fn test_start_then_exists_and_second_start_is_noop() {
        let h = harness();
        let outcome = h.manager.start(slot(1));
        assert!(matches!(outcome, Outcome::Started { ref degraded, .. } if degraded.is_empty()));
        assert!(h.manager.registry().exists(slot(1)));
        assert_eq!(h.manager.state(slot(1)), SlotState::Running);

        assert_eq!(h.manager.start(slot(1)), Outcome::AlreadyRunning);
        assert!(h.manager.registry().exists(slot(1)));
        assert_eq!(h.host.count("create_session"), 1);
        assert_eq!(h.worktrees.creates(), 1);
    }

    #[test]
    fn test_start_wires_session() {
        let h = harness();
        let Outcome::Started { worktree, .. } = h.manager.start(slot(2)) else {
            panic!("expected start");
        };
        let name = "hive-proj-worker-2";
        assert!(h
            .host
            .calls()
            .contains(&format!("create_session {} {}", name, worktree.path.display())));

        let pipes = h.host.pipes();
        assert_eq!(pipes.len(), 1);
        assert_eq!(pipes[0].1, h.manager.paths().log_file(slot(2)));
        assert!(h.manager.paths().log_file(slot(2)).exists());

        let keys = h.host.sent_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].1.starts_with("HIVE_SLOT=2 "));
        assert!(keys[0].1.ends_with("claude<Enter>"));
    }

    #[test]
    fn test_start_truncates_log_and_resets_status() {
        let h = harness();
        let paths = h.manager.paths().clone();
        let log = paths.log_file(slot(1));
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "old run output\n").unwrap();
        let store = StatusStore::for_project(&paths);
        store
            .write(slot(1), &WorkerStatus::new(WorkerState::Approved))
            .unwrap();

        h.manager.start(slot(1));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
        assert!(store.read(slot(1)).is_none());
    }

    #[test]
    fn test_task_branch_and_prompt() {
        let h = harness();
        let task = h.manager.paths().task_file(slot(1));
        std::fs::create_dir_all(task.parent().unwrap()).unwrap();
        std::fs::write(&task, "---\nbranch: feature/x\n---\nDo it").unwrap();

        h.manager.start(slot(1));
        let keys = h.host.sent_keys();
        assert!(keys[0].1.contains("'Read your task in "));
    }

    #[test]
    fn test_create_failure_is_reported() {
        let h = harness();
        h.host.fail_create(true);
        let outcome = h.manager.start(slot(1));
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(!outcome.is_success());
        assert!(!h.manager.registry().exists(slot(1)));
        assert_eq!(h.host.count("send_keys"), 0);
    }

    #[test]
    fn test_unsupported_options_do_not_degrade() {
        let h = harness();
        h.host.fail_options(true);
        let outcome = h.manager.start(slot(1));
        assert!(matches!(outcome, Outcome::Started { ref degraded, .. } if degraded.is_empty()));
    }

    #[test]
    fn test_worktree_fallback_is_degraded_start() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        let host = Arc::new(FakeHost::new());
        let manager = WorkerManager::new(
            SessionRegistry::new(host.clone(), ProjectIdentity::new("proj")),
            WorktreeProvisioner::new(Arc::new(CountingWorktrees::failing())),
            HivePaths::new(&root),
            Agent::default(),
            4,
        );
        let Outcome::Started { worktree, degraded } = manager.start(slot(1)) else {
            panic!("expected start");
        };
        assert_eq!(worktree.kind, WorktreeKind::SharedRoot);
        assert_eq!(degraded, vec!["sharing project root".to_string()]);
        assert!(manager.registry().exists(slot(1)));
    }

    #[test]
    fn test_stop_is_advisory() {
        let h = harness();
        assert_eq!(h.manager.stop(slot(1)), Outcome::NotRunning);

        h.manager.start(slot(1));
        assert_eq!(h.manager.stop(slot(1)), Outcome::StopRequested);
        assert!(h.manager.registry().exists(slot(1)));
        assert_eq!(h.manager.state(slot(1)), SlotState::Stopping);
        assert!(h
            .host
            .sent_keys()
            .iter()
            .any(|(_, k)| k == "/exit<Enter>"));

        // The agent exits on its own.
        h.host.remove_session("hive-proj-worker-1");
        assert_eq!(h.manager.state(slot(1)), SlotState::Absent);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let h = harness();
        h.manager.start(slot(1));
        assert_eq!(h.manager.kill(slot(1)), Outcome::Killed);
        assert!(!h.manager.registry().exists(slot(1)));
        assert_eq!(h.manager.kill(slot(1)), Outcome::AlreadyGone);
        assert!(h.manager.kill(slot(1)).is_success());
    }

    #[test]
    fn test_restart_when_not_running_is_start() {
        let h = harness();
        let outcome = h.manager.restart(slot(2));
        assert!(matches!(outcome, Outcome::Started { .. }));
        assert_eq!(h.host.count("kill_session"), 0);
        assert!(h.manager.registry().exists(slot(2)));
    }

    #[test]
    fn test_restart_waits_for_name_release() {
        let h = harness();
        h.manager.start(slot(1));
        h.host.linger_after_kill(3);
        let outcome = h.manager.restart(slot(1));
        assert!(matches!(outcome, Outcome::Started { .. }), "{:?}", outcome);
        assert_eq!(h.host.count("create_session"), 2);
    }

    #[test]
    fn test_restart_times_out_when_name_is_held() {
        let h = harness();
        h.manager.start(slot(1));
        h.host.linger_after_kill(usize::MAX);
        let outcome = h.manager.restart(slot(1));
        assert!(matches!(outcome, Outcome::TimedOut(_)));
        assert!(!outcome.is_success());
        assert_eq!(h.host.count("create_session"), 1);
    }

    #[test]
    fn test_bulk_report_counts() {
        let h = harness();
        let report = h.manager.apply_all(WorkerOp::Start);
        assert_eq!(report.to_string(), "4/4");
        assert_eq!(h.host.sessions().len(), 4);

        h.host.fail_create(true);
        h.host.remove_session("hive-proj-worker-3");
        let report = h.manager.apply_all(WorkerOp::Start);
        assert_eq!(report.to_string(), "3/4");
        assert!(!report.all_succeeded());

        let report = h.manager.apply_all(WorkerOp::Kill);
        assert_eq!(report.to_string(), "4/4");
        assert!(h.host.sessions().is_empty());
    }

    #[test]
    fn test_cleanup_kills_and_detaches_worktree() {
        let h = harness();
        h.manager.start(slot(1));
        assert_eq!(h.manager.cleanup(slot(1)), Outcome::Cleaned);
        assert!(!h.manager.registry().exists(slot(1)));
        assert_eq!(h.manager.cleanup(slot(1)), Outcome::NothingToClean);

        h.manager.start(slot(1));
        assert_eq!(h.worktrees.creates(), 2);
    }

    #[test]
    fn test_attach_requires_running_session() {
        let h = harness();
        assert!(h.manager.attach(slot(1)).is_err());
        h.manager.start(slot(1));
        h.manager.attach(slot(1)).unwrap();
        assert_eq!(h.host.count("attach"), 1);
    }
}
