//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Creating temporary git repositories
//! - Wiring a project to the in-memory session host

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use hive::agent::Agent;
use hive::aggregate::Aggregator;
use hive::layout::LayoutComposer;
use hive::lifecycle::{RestartPolicy, WorkerManager};
use hive::paths::HivePaths;
use hive::session::{ProjectIdentity, SessionRegistry, SlotId};
use hive::testing::FakeHost;
use hive::worktree::WorktreeProvisioner;

/// A test repository with a temporary directory and initialized git.
pub struct TestRepo {
    /// The temporary directory containing the repo (and its worktree base).
    pub temp_dir: TempDir,
    /// Path to the repository root.
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a new test repository with an initial commit.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("proj");
        std::fs::create_dir_all(&path).expect("Failed to create repo dir");

        let git = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(&path)
                .output()
                .expect("Failed to run git")
        };
        git(&["init"]);
        git(&["config", "user.email", "test@test.com"]);
        git(&["config", "user.name", "Test User"]);
        std::fs::write(path.join("README.md"), "# Test Repository\n")
            .expect("Failed to write README");
        git(&["add", "."]);
        git(&["commit", "-m", "Initial commit"]);

        Self { temp_dir, path }
    }

    /// Check if a branch exists.
    pub fn branch_exists(&self, name: &str) -> bool {
        let output = Command::new("git")
            .args(["branch", "--list", name])
            .current_dir(&self.path)
            .output()
            .expect("Failed to list branches");

        !String::from_utf8_lossy(&output.stdout).trim().is_empty()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// A project backed by a real git repo and a fake session host.
pub struct TestHive {
    pub repo: TestRepo,
    pub host: Arc<FakeHost>,
    pub paths: HivePaths,
    pub registry: SessionRegistry,
    pub workers: u8,
}

impl TestHive {
    pub fn new(workers: u8) -> Self {
        let repo = TestRepo::new();
        let host = Arc::new(FakeHost::new());
        let paths = HivePaths::new(&repo.path)
            .with_worktree_base(repo.temp_dir.path().join("proj-worktrees"));
        let registry = SessionRegistry::new(host.clone(), ProjectIdentity::from_root(&repo.path));
        Self {
            repo,
            host,
            paths,
            registry,
            workers,
        }
    }

    pub fn slot(&self, n: u8) -> SlotId {
        SlotId::new(n, self.workers).expect("slot in range")
    }

    pub fn manager(&self) -> WorkerManager {
        WorkerManager::new(
            self.registry.clone(),
            WorktreeProvisioner::git(),
            self.paths.clone(),
            Agent::default(),
            self.workers,
        )
        .with_restart_policy(RestartPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(100),
        })
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.registry.clone(), self.paths.clone(), self.workers)
    }

    pub fn composer(&self) -> LayoutComposer {
        LayoutComposer::new(
            self.registry.clone(),
            self.paths.clone(),
            PathBuf::from("/usr/local/bin/hive"),
            Agent::default(),
            self.workers,
        )
    }

    /// Write a status document the way a worker would, bypassing validation.
    pub fn write_raw_status(&self, slot: SlotId, json: &str) {
        std::fs::create_dir_all(self.paths.status_dir()).expect("status dir");
        std::fs::write(self.paths.status_file(slot), json).expect("status file");
    }
}
