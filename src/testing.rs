//! In-memory stand-ins for the session host and worktree backend.
//!
//! Used by unit tests and the integration suite so nothing needs a live
//! tmux server or network access.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::tmux::{Geometry, Orientation, PaneInfo, SessionHost};
use crate::worktree::WorktreeBackend;
use crate::{Error, Result};

#[derive(Default)]
struct FakeState {
    sessions: HashSet<String>,
    panes: BTreeMap<String, Vec<PaneInfo>>,
    next_pane: usize,
    calls: Vec<String>,
    sent_keys: Vec<(String, String)>,
    pipes: Vec<(String, PathBuf)>,
    options: Vec<(Option<String>, String, String)>,
    bindings: Vec<(String, String, Vec<String>)>,
    fail_create: bool,
    fail_options: bool,
    rejected_keys: HashSet<String>,
    current: Option<String>,
    linger_polls: usize,
    lingering: BTreeMap<String, usize>,
}

/// A session host that keeps sessions in memory and records every call.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<FakeState>,
    unavailable: bool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose binary is missing.
    pub fn unavailable() -> Self {
        Self {
            state: Mutex::default(),
            unavailable: true,
        }
    }

    /// Make `create_session` fail.
    pub fn fail_create(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    /// Make `set_option` fail, as an old host rejecting unknown options would.
    pub fn fail_options(&self, fail: bool) {
        self.lock().fail_options = fail;
    }

    /// Pretend this process runs inside `session`.
    pub fn set_current_session(&self, session: &str) {
        self.lock().current = Some(session.to_string());
    }

    /// Make `bind_key` fail for `key` in any table.
    pub fn reject_binding(&self, key: &str) {
        self.lock().rejected_keys.insert(key.to_string());
    }

    /// Killed sessions keep existing for `polls` further `has_session` calls.
    pub fn linger_after_kill(&self, polls: usize) {
        self.lock().linger_polls = polls;
    }

    pub fn insert_session(&self, name: &str) {
        let mut state = self.lock();
        state.sessions.insert(name.to_string());
        let id = format!("%{}", state.next_pane);
        state.next_pane += 1;
        state.panes.insert(
            name.to_string(),
            vec![PaneInfo {
                id,
                title: String::new(),
            }],
        );
    }

    /// Simulate a session ending behind hive's back.
    pub fn remove_session(&self, name: &str) {
        let mut state = self.lock();
        state.sessions.remove(name);
        state.panes.remove(name);
    }

    pub fn sessions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().sessions.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn sent_keys(&self) -> Vec<(String, String)> {
        self.lock().sent_keys.clone()
    }

    pub fn pipes(&self) -> Vec<(String, PathBuf)> {
        self.lock().pipes.clone()
    }

    pub fn options(&self) -> Vec<(Option<String>, String, String)> {
        self.lock().options.clone()
    }

    pub fn bindings(&self) -> Vec<(String, String, Vec<String>)> {
        self.lock().bindings.clone()
    }

    pub fn panes(&self, session: &str) -> Vec<PaneInfo> {
        self.lock().panes.get(session).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

/// Session owning a pane id like `%3`, or the session named by a target
/// like `hive-p-lead` or `=hive-p-lead:`.
fn owning_session(state: &FakeState, target: &str) -> Option<String> {
    if target.starts_with('%') {
        return state
            .panes
            .iter()
            .find(|(_, panes)| panes.iter().any(|p| p.id == target))
            .map(|(name, _)| name.clone());
    }
    let name = target.trim_start_matches('=');
    let name = name.split(':').next().unwrap_or(name);
    state.sessions.contains(name).then(|| name.to_string())
}

impl SessionHost for FakeHost {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn has_session(&self, name: &str) -> bool {
        let mut state = self.lock();
        state.calls.push(format!("has_session {}", name));
        if let Some(left) = state.lingering.get_mut(name) {
            if *left == 0 {
                state.lingering.remove(name);
                return false;
            }
            *left -= 1;
            return true;
        }
        state.sessions.contains(name)
    }

    fn create_session(&self, name: &str, cwd: &Path, _geometry: Option<Geometry>) -> Result<()> {
        self.record(format!("create_session {} {}", name, cwd.display()));
        {
            let state = self.lock();
            if state.fail_create {
                return Err(Error::Tmux(format!("Failed to create session '{}'", name)));
            }
            if state.sessions.contains(name) || state.lingering.contains_key(name) {
                return Err(Error::Tmux(format!("duplicate session: {}", name)));
            }
        }
        self.insert_session(name);
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("kill_session {}", name));
        if state.sessions.remove(name) {
            state.panes.remove(name);
            let linger = state.linger_polls;
            if linger > 0 {
                state.lingering.insert(name.to_string(), linger);
            }
        }
        Ok(())
    }

    fn split_window(
        &self,
        target: &str,
        orientation: Orientation,
        percent: u8,
        _cwd: &Path,
    ) -> Result<String> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("split_window {} {:?} {}", target, orientation, percent));
        let session = owning_session(&state, target)
            .ok_or_else(|| Error::Tmux(format!("can't find pane: {}", target)))?;
        let id = format!("%{}", state.next_pane);
        state.next_pane += 1;
        if let Some(panes) = state.panes.get_mut(&session) {
            panes.push(PaneInfo {
                id: id.clone(),
                title: String::new(),
            });
        }
        Ok(id)
    }

    fn kill_pane(&self, pane: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("kill_pane {}", pane));
        for panes in state.panes.values_mut() {
            panes.retain(|p| p.id != pane);
        }
        Ok(())
    }

    fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>> {
        let state = self.lock();
        let name = owning_session(&state, session)
            .ok_or_else(|| Error::Tmux(format!("can't find session: {}", session)))?;
        Ok(state.panes.get(&name).cloned().unwrap_or_default())
    }

    fn send_keys(&self, target: &str, keys: &str, enter: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("send_keys {}", target));
        if owning_session(&state, target).is_none() {
            return Err(Error::Tmux(format!("can't find pane: {}", target)));
        }
        let keys = if enter {
            format!("{}<Enter>", keys)
        } else {
            keys.to_string()
        };
        state.sent_keys.push((target.to_string(), keys));
        Ok(())
    }

    fn pipe_output(&self, target: &str, path: &Path) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("pipe_output {}", target));
        state.pipes.push((target.to_string(), path.to_path_buf()));
        Ok(())
    }

    fn set_option(&self, target: Option<&str>, option: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("set_option {}", option));
        if state.fail_options {
            return Err(Error::Tmux(format!("invalid option: {}", option)));
        }
        state.options.push((
            target.map(String::from),
            option.to_string(),
            value.to_string(),
        ));
        Ok(())
    }

    fn bind_key(&self, table: &str, key: &str, command: &[String]) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("bind_key {} {}", table, key));
        if state.rejected_keys.contains(key) {
            return Err(Error::Tmux(format!("unknown key: {}", key)));
        }
        state
            .bindings
            .push((table.to_string(), key.to_string(), command.to_vec()));
        Ok(())
    }

    fn set_pane_title(&self, pane: &str, title: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("set_pane_title {} {}", pane, title));
        for panes in state.panes.values_mut() {
            if let Some(p) = panes.iter_mut().find(|p| p.id == pane) {
                p.title = title.to_string();
            }
        }
        Ok(())
    }

    fn select_pane(&self, pane: &str) -> Result<()> {
        self.record(format!("select_pane {}", pane));
        Ok(())
    }

    fn attach(&self, name: &str) -> Result<()> {
        self.record(format!("attach {}", name));
        if self.lock().sessions.contains(name) {
            Ok(())
        } else {
            Err(Error::Tmux(format!("can't find session: {}", name)))
        }
    }

    fn switch_client(&self, name: &str) -> Result<()> {
        self.record(format!("switch_client {}", name));
        if self.lock().sessions.contains(name) {
            Ok(())
        } else {
            Err(Error::Tmux(format!("can't find session: {}", name)))
        }
    }

    fn current_session(&self) -> Option<String> {
        self.lock().current.clone()
    }
}

/// Worktree backend that creates plain directories and counts attempts.
#[derive(Default)]
pub struct CountingWorktrees {
    creates: AtomicUsize,
    removes: AtomicUsize,
    fail: bool,
}

impl CountingWorktrees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every creation attempt fails, like a missing git binary would.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl WorktreeBackend for CountingWorktrees {
    fn create(&self, _repo: &Path, path: &Path, _branch: &str) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Validation("worktree creation disabled".to_string()));
        }
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove(&self, _repo: &Path, path: &Path) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}
