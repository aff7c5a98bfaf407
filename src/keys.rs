//! Modal Key Dispatcher.
//!
//! Two tables: `root`, where keys reach the focused process, and `hive`, a
//! one-shot overlay entered with [`PREFIX_KEY`]. Any key in `hive` runs at
//! most one action and always lands back in `root`.
//!
//! The same table drives the tmux bindings installed by [`install_bindings`]
//! and the in-process [`KeyDispatcher`] the dashboard uses.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::session::{SessionRegistry, SlotId};
use crate::tmux::{exact, SessionHost};
use crate::util::shell_escape;
use crate::{hlog_debug, hlog_warn};

/// Global chord that enters the hive table.
pub const PREFIX_KEY: &str = "M-h";

pub const ROOT_TABLE: &str = "root";
pub const HIVE_TABLE: &str = "hive";

/// Idle time after which the in-process overlay gives up.
pub const HIVE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Root,
    Hive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Enter,
    /// Anything without a character: arrows, function keys.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiveAction {
    AttachWorker(SlotId),
    FocusLead,
    ToggleStatusPane,
    ToggleTheme,
}

/// Every mapped key in the hive table for a worker count.
pub fn hive_table(workers: u8) -> Vec<(char, HiveAction)> {
    let mut table: Vec<(char, HiveAction)> = SlotId::all(workers)
        .filter_map(|slot| {
            let key = char::from_digit(u32::from(slot.get()), 10)?;
            Some((key, HiveAction::AttachWorker(slot)))
        })
        .collect();
    table.extend([
        ('0', HiveAction::FocusLead),
        ('l', HiveAction::FocusLead),
        ('d', HiveAction::ToggleStatusPane),
        ('t', HiveAction::ToggleTheme),
    ]);
    table
}

/// The action bound to `key` in the hive table, if any.
pub fn hive_action(key: Key, workers: u8) -> Option<HiveAction> {
    let Key::Char(c) = key else {
        return None;
    };
    hive_table(workers)
        .into_iter()
        .find(|(k, _)| *k == c)
        .map(|(_, action)| action)
}

/// In-process two-state dispatcher.
#[derive(Debug, Clone)]
pub struct KeyDispatcher {
    state: ModalState,
    workers: u8,
    entered_at: Option<Instant>,
    timeout: Duration,
}

impl KeyDispatcher {
    pub fn new(workers: u8) -> Self {
        Self {
            state: ModalState::Root,
            workers,
            entered_at: None,
            timeout: HIVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> ModalState {
        self.state
    }

    /// The prefix chord was pressed.
    pub fn enter(&mut self, now: Instant) {
        self.state = ModalState::Hive;
        self.entered_at = Some(now);
    }

    /// Consume one key. In `root` nothing is consumed and `None` is returned;
    /// the caller handles the key itself. In `hive` the key is consumed and
    /// the state is `root` again on return.
    pub fn dispatch(&mut self, key: Key) -> Option<HiveAction> {
        match self.state {
            ModalState::Root => None,
            ModalState::Hive => {
                self.state = ModalState::Root;
                self.entered_at = None;
                let action = hive_action(key, self.workers);
                hlog_debug!("hive key {:?} -> {:?}", key, action);
                action
            }
        }
    }

    /// Drop back to `root` once the overlay has been idle too long.
    pub fn expire(&mut self, now: Instant) -> bool {
        match (self.state, self.entered_at) {
            (ModalState::Hive, Some(at)) if now.duration_since(at) >= self.timeout => {
                self.state = ModalState::Root;
                self.entered_at = None;
                true
            }
            _ => false,
        }
    }

    /// Time left before the overlay expires.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.state, self.entered_at) {
            (ModalState::Hive, Some(at)) => {
                Some(self.timeout.saturating_sub(now.duration_since(at)))
            }
            _ => None,
        }
    }
}

/// One `bind-key -T table key command...` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub table: String,
    pub key: String,
    pub command: Vec<String>,
}

impl Binding {
    fn new(table: &str, key: &str, command: Vec<String>) -> Self {
        Self {
            table: table.to_string(),
            key: key.to_string(),
            command,
        }
    }
}

/// What the bindings need to know to reach hive and its sessions.
pub struct BindingContext<'a> {
    /// The running `hive` executable.
    pub exe: &'a Path,
    pub root: &'a Path,
    pub registry: &'a SessionRegistry,
    pub workers: u8,
    pub lead_pane: Option<&'a str>,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl BindingContext<'_> {
    fn hive_command(&self, sub: &str) -> String {
        format!(
            "{} --project {} --workers {} {}",
            shell_escape(&self.exe.display().to_string()),
            shell_escape(&self.root.display().to_string()),
            self.workers,
            sub
        )
    }

    fn command_for(&self, action: HiveAction) -> Vec<String> {
        match action {
            HiveAction::AttachWorker(slot) => {
                let inner = format!(
                    "TMUX= tmux attach-session -t {}",
                    shell_escape(&exact(&self.registry.name(slot)))
                );
                args(&["display-popup", "-E", "-w", "95%", "-h", "95%", &inner])
            }
            HiveAction::FocusLead => {
                let lead = exact(&self.registry.lead_name());
                let mut cmd = args(&["switch-client", "-t", &lead]);
                if let Some(pane) = self.lead_pane {
                    cmd.extend(args(&[";", "select-pane", "-t", pane]));
                }
                cmd
            }
            HiveAction::ToggleStatusPane => {
                args(&["run-shell", &self.hive_command("pane toggle")])
            }
            HiveAction::ToggleTheme => args(&["run-shell", &self.hive_command("theme-toggle")]),
        }
    }
}

/// The full binding set: the prefix chord plus the hive table, with escape
/// and every unmapped key returning to root.
pub fn hive_bindings(ctx: &BindingContext<'_>) -> Vec<Binding> {
    let back_to_root = args(&["switch-client", "-T", ROOT_TABLE]);
    let mut bindings = vec![Binding::new(
        ROOT_TABLE,
        PREFIX_KEY,
        args(&["switch-client", "-T", HIVE_TABLE]),
    )];
    for (key, action) in hive_table(ctx.workers) {
        bindings.push(Binding::new(
            HIVE_TABLE,
            &key.to_string(),
            ctx.command_for(action),
        ));
    }
    bindings.push(Binding::new(HIVE_TABLE, "Escape", back_to_root.clone()));
    bindings.push(Binding::new(HIVE_TABLE, "Any", back_to_root));
    bindings
}

/// Install bindings on the host. Returns how many were accepted; rejected
/// ones are logged and skipped.
pub fn install_bindings(host: &dyn SessionHost, bindings: &[Binding]) -> usize {
    bindings
        .iter()
        .filter(|b| match host.bind_key(&b.table, &b.key, &b.command) {
            Ok(()) => true,
            Err(e) => {
                hlog_warn!("bind-key -T {} {} rejected: {}", b.table, b.key, e);
                false
            }
        })
        .count()
}
