//! Well-known file locations for a project.

use std::path::{Path, PathBuf};

use crate::session::SlotId;

/// Every path hive reads or writes for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HivePaths {
    root: PathBuf,
    worktree_base: PathBuf,
}

impl HivePaths {
    pub fn new(root: &Path) -> Self {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let worktree_base = default_worktree_base(&root);
        Self {
            root,
            worktree_base,
        }
    }

    pub fn with_worktree_base(mut self, base: PathBuf) -> Self {
        self.worktree_base = base;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hive_dir(&self) -> PathBuf {
        self.root.join(".hive")
    }

    pub fn status_dir(&self) -> PathBuf {
        self.hive_dir().join("status")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.hive_dir().join("logs")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.hive_dir().join("tasks")
    }

    pub fn worktree_base(&self) -> &Path {
        &self.worktree_base
    }

    pub fn status_file(&self, slot: SlotId) -> PathBuf {
        self.status_dir().join(format!("worker-{}.json", slot))
    }

    pub fn log_file(&self, slot: SlotId) -> PathBuf {
        self.logs_dir().join(format!("worker-{}.log", slot))
    }

    pub fn task_file(&self, slot: SlotId) -> PathBuf {
        self.tasks_dir().join(format!("worker-{}.md", slot))
    }

    pub fn local_config(&self) -> PathBuf {
        self.hive_dir().join("config.json")
    }
}

/// `$XDG_CONFIG_HOME/hive/config.json`, else `~/.config/hive/config.json` on
/// every platform.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_in(
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        dirs::home_dir(),
    )
}

fn global_config_in(xdg: Option<PathBuf>, home: Option<PathBuf>) -> Option<PathBuf> {
    let base = match xdg.filter(|p| p.is_absolute()) {
        Some(dir) => dir,
        None => home?.join(".config"),
    };
    Some(base.join("hive").join("config.json"))
}

/// Sibling of the project root: `<parent>/<name>-worktrees`.
fn default_worktree_base(root: &Path) -> PathBuf {
    let name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project");
    match root.parent() {
        Some(parent) => parent.join(format!("{}-worktrees", name)),
        None => root.join(".hive").join("worktrees"),
    }
}
