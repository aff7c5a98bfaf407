//! Worktree Provisioner: one isolated workspace per worker slot.
//!
//! Creation failures never stop a worker from starting; the worker runs out
//! of the shared project root instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{BranchType, ErrorCode, Repository, WorktreeAddOptions, WorktreePruneOptions};

use crate::session::SlotId;
use crate::{hlog, hlog_debug, hlog_warn, Result};

/// Creates and removes isolated workspaces.
pub trait WorktreeBackend: Send + Sync {
    fn create(&self, repo: &Path, path: &Path, branch: &str) -> Result<()>;
    fn remove(&self, repo: &Path, path: &Path) -> Result<()>;
}

/// Git worktrees via libgit2.
pub struct GitWorktrees;

impl WorktreeBackend for GitWorktrees {
    fn create(&self, repo_path: &Path, path: &Path, branch: &str) -> Result<()> {
        hlog_debug!(
            "GitWorktrees::create branch={} path={}",
            branch,
            path.display()
        );
        let repo = Repository::discover(repo_path)?;
        let branch_obj = match repo.find_branch(branch, BranchType::Local) {
            Ok(existing) => {
                hlog_debug!("Reusing existing branch {}", branch);
                existing
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                let commit = repo.head()?.peel_to_commit()?;
                hlog_debug!("Creating branch {} from commit {}", branch, commit.id());
                repo.branch(branch, &commit, false)?
            }
            Err(e) => return Err(e.into()),
        };
        let reference = branch_obj.into_reference();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        // Branch names may contain slashes, the folder name never does.
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(branch);
        repo.worktree(name, path, Some(&opts))?;
        hlog_debug!("Worktree created successfully");
        Ok(())
    }

    fn remove(&self, repo_path: &Path, path: &Path) -> Result<()> {
        hlog_debug!("GitWorktrees::remove path={}", path.display());
        let repo = Repository::discover(repo_path)?;
        let folder = path.file_name().and_then(|n| n.to_str());
        let names = repo.worktrees()?;
        let name = names.iter().flatten().find(|name| {
            Some(*name) == folder
                || repo
                    .find_worktree(name)
                    .map(|wt| wt.path() == path)
                    .unwrap_or(false)
        });

        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }

        // Admin data must go too, or git keeps the branch "checked out".
        if let Some(name) = name {
            if let Ok(wt) = repo.find_worktree(name) {
                let _ = wt.unlock();
                if let Err(e) = wt.prune(Some(
                    WorktreePruneOptions::new()
                        .valid(true)
                        .working_tree(true)
                        .locked(true),
                )) {
                    hlog_warn!("Worktree prune failed for '{}': {}", name, e);
                }
            }
            let admin_dir = repo.path().join("worktrees").join(name);
            if admin_dir.exists() {
                let _ = std::fs::remove_dir_all(&admin_dir);
            }
        }
        Ok(())
    }
}

/// How a slot got its workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeKind {
    /// Already present from an earlier start.
    Existing,
    /// Created by this call.
    Created,
    /// Creation failed; the worker shares the project root.
    SharedRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub path: PathBuf,
    pub kind: WorktreeKind,
}

impl Worktree {
    pub fn is_isolated(&self) -> bool {
        self.kind != WorktreeKind::SharedRoot
    }
}

/// The main checkout that owns `start`, even when `start` is inside one of
/// its linked worktrees. Outside git, `start` itself.
pub fn project_root(start: &Path) -> PathBuf {
    match Repository::discover(start) {
        Ok(repo) if !repo.is_bare() => repo
            .commondir()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.to_path_buf()),
        Ok(_) => start.to_path_buf(),
        Err(e) => {
            hlog_debug!("No git repository at {}: {}", start.display(), e);
            start.to_path_buf()
        }
    }
}

/// Deterministic workspace location for a slot.
pub fn slot_path(base: &Path, slot: SlotId) -> PathBuf {
    base.join(format!("worker-{}", slot))
}

/// Branch a slot's workspace is bound to unless a task names one.
pub fn default_branch(slot: SlotId) -> String {
    format!("worker-{}-workspace", slot)
}

#[derive(Clone)]
pub struct WorktreeProvisioner {
    backend: Arc<dyn WorktreeBackend>,
}

impl WorktreeProvisioner {
    pub fn new(backend: Arc<dyn WorktreeBackend>) -> Self {
        Self { backend }
    }

    pub fn git() -> Self {
        Self::new(Arc::new(GitWorktrees))
    }

    /// Return the slot's workspace, creating it on first use.
    pub fn ensure(
        &self,
        root: &Path,
        base: &Path,
        slot: SlotId,
        branch_hint: Option<&str>,
    ) -> Worktree {
        let path = slot_path(base, slot);
        if path.exists() {
            hlog_debug!("Worktree for slot {} exists at {}", slot, path.display());
            return Worktree {
                path,
                kind: WorktreeKind::Existing,
            };
        }

        let branch = branch_hint
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .unwrap_or_else(|| default_branch(slot));

        match self.backend.create(root, &path, &branch) {
            Ok(()) => {
                hlog!(
                    "Worktree created for slot {}: {} (branch {})",
                    slot,
                    path.display(),
                    branch
                );
                Worktree {
                    path,
                    kind: WorktreeKind::Created,
                }
            }
            Err(e) => {
                hlog_warn!(
                    "Worktree creation failed for slot {} ({}); falling back to {}",
                    slot,
                    e,
                    root.display()
                );
                // A half-created directory would be mistaken for a worktree next time.
                let empty = std::fs::read_dir(&path)
                    .map(|mut d| d.next().is_none())
                    .unwrap_or(false);
                if empty {
                    let _ = std::fs::remove_dir(&path);
                }
                Worktree {
                    path: root.to_path_buf(),
                    kind: WorktreeKind::SharedRoot,
                }
            }
        }
    }

    /// Remove the slot's workspace. Returns false when there was none.
    pub fn cleanup(&self, root: &Path, base: &Path, slot: SlotId) -> Result<bool> {
        let path = slot_path(base, slot);
        if !path.exists() {
            return Ok(false);
        }
        self.backend.remove(root, &path)?;
        hlog!("Worktree removed for slot {}: {}", slot, path.display());
        Ok(true)
    }
}
